//! External device injection.
//!
//! Devices are resolved by an external registry (CDI-style): this generator
//! only refreshes the registry and asks it to inject the named devices.
//! Injection may add mounts, environment variables, and lifecycle hooks to
//! the spec, which is why it runs last: no later mutator may wholesale-
//! replace those collections, or injected device resources are silently
//! lost.

use std::sync::Arc;

use tracing::warn;

use crate::assembly::SpecMutator;
use crate::error::SpecError;
use crate::spec::RuntimeSpec;

/// An opaque device reference, resolved by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdiDevice {
    pub name: String,
}

impl CdiDevice {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The external device registry seam.
///
/// Owned by a collaborator; this crate only drives the refresh-then-inject
/// sequence and error policy around it.
pub trait DeviceRegistry: Send + Sync {
    /// Refreshes the registry's view of available devices.
    fn refresh(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Injects the named devices' mounts, env, and hooks into the spec.
    fn inject_devices(
        &self,
        spec: &mut RuntimeSpec,
        devices: &[CdiDevice],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Mutators injecting the requested devices, if any.
///
/// Registry refresh always runs first but never aborts injection: a stale
/// registry may still resolve the request. Injection failure is fatal.
pub fn cdi_mutators(registry: Arc<dyn DeviceRegistry>, devices: &[CdiDevice]) -> Vec<SpecMutator> {
    if devices.is_empty() {
        return Vec::new();
    }
    let devices = devices.to_vec();
    vec![Box::new(move |spec| {
        if let Err(err) = registry.refresh() {
            warn!(error = %err, "device registry refresh failed");
        }
        registry
            .inject_devices(spec, &devices)
            .map_err(|source| SpecError::DeviceInjection { source })
    })]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the call sequence and simulates failures.
    #[derive(Default)]
    struct FakeRegistry {
        calls: Mutex<Vec<&'static str>>,
        fail_refresh: bool,
        fail_inject: bool,
    }

    impl DeviceRegistry for FakeRegistry {
        fn refresh(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.calls.lock().expect("calls lock").push("refresh");
            if self.fail_refresh {
                return Err("registry endpoint unreachable".into());
            }
            Ok(())
        }

        fn inject_devices(
            &self,
            spec: &mut RuntimeSpec,
            devices: &[CdiDevice],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.calls.lock().expect("calls lock").push("inject");
            if self.fail_inject {
                return Err("unknown device".into());
            }
            for device in devices {
                spec.process.env.push(format!("DEVICE_{}=1", device.name));
            }
            Ok(())
        }
    }

    #[test]
    fn test_empty_device_list_yields_no_mutators() {
        let registry = Arc::new(FakeRegistry::default());
        assert!(cdi_mutators(registry.clone(), &[]).is_empty());
        assert!(registry.calls.lock().expect("calls lock").is_empty());
    }

    #[test]
    fn test_refresh_runs_before_injection() {
        let registry = Arc::new(FakeRegistry::default());
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);

        for mutate in cdi_mutators(registry.clone(), &[CdiDevice::new("vendor.com/gpu=0")]) {
            mutate(&mut spec).expect("device mutator");
        }

        assert_eq!(
            *registry.calls.lock().expect("calls lock"),
            vec!["refresh", "inject"]
        );
        assert!(spec.process.env.iter().any(|e| e == "DEVICE_vendor.com/gpu=0=1"));
    }

    #[test]
    fn test_refresh_failure_does_not_abort_injection() {
        let registry = Arc::new(FakeRegistry {
            fail_refresh: true,
            ..FakeRegistry::default()
        });
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);

        for mutate in cdi_mutators(registry.clone(), &[CdiDevice::new("vendor.com/gpu=0")]) {
            mutate(&mut spec).expect("device mutator");
        }

        assert_eq!(
            *registry.calls.lock().expect("calls lock"),
            vec!["refresh", "inject"]
        );
    }

    #[test]
    fn test_injection_failure_is_fatal() {
        let registry = Arc::new(FakeRegistry {
            fail_inject: true,
            ..FakeRegistry::default()
        });
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);

        let mut result = Ok(());
        for mutate in cdi_mutators(registry, &[CdiDevice::new("vendor.com/gpu=0")]) {
            result = mutate(&mut spec);
        }

        assert!(matches!(result, Err(SpecError::DeviceInjection { .. })));
    }
}

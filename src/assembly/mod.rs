//! The ordered spec-assembly pipeline.
//!
//! Each concern that shapes a step's runtime spec (mounts, security mode,
//! process mode, identity mapping, resource limits, device injection) is a
//! generator producing [`SpecMutator`] closures. The pipeline applies them
//! in a fixed, documented order against one spec:
//!
//! 1. Mount generators: drop the default /run, bind host files, mount
//!    cgroupfs; everything later may rewrite these mounts.
//! 2. Cgroup namespace, added only when the host supports it.
//! 3. Security mode: may rewrite mounts (writable cgroupfs/sysfs), so it
//!    must follow the mount generators.
//! 4. Process mode: rebinds /proc over the mounts produced so far.
//! 5. Identity mapping.
//! 6. Resource limits.
//! 7. Device injection, always last: it may append mounts, env, and hooks,
//!    and nothing afterwards may wholesale-replace those collections.
//!
//! The pipeline is strictly sequential and aborts on the first failing
//! mutator; a partially assembled spec is never used.

pub mod config;
pub mod devices;
pub mod idmap;
pub mod mounts;
pub mod process;
pub mod rlimit;
pub mod security;

pub use config::StepConfig;
pub use devices::{CdiDevice, DeviceRegistry};
pub use idmap::{IdMap, IdentityMapping};
pub use process::ProcessMode;
pub use rlimit::Ulimit;
pub use security::SecurityMode;

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::spec::{LinuxNamespace, NamespaceType, RuntimeSpec};
use crate::system::HostFeatures;

/// A unit of change: applies one mutation to the spec, signalling failure
/// distinctly from success. Pure with respect to everything but the spec.
pub type SpecMutator = Box<dyn FnOnce(&mut RuntimeSpec) -> Result<()> + Send>;

/// Assembles the spec for one step by applying every generator's mutators
/// in pipeline order.
///
/// # Errors
///
/// Fails on the first host-capability mismatch, label failure, or device
/// injection failure; the spec must then be discarded.
pub fn assemble(
    spec: &mut RuntimeSpec,
    config: &StepConfig,
    host: &dyn HostFeatures,
    registry: Option<Arc<dyn DeviceRegistry>>,
) -> Result<()> {
    let mut mutators = mounts::mount_mutators(&config.resolv_conf, &config.hosts_file);

    if host.cgroup_namespace_supported() {
        mutators.push(with_cgroup_namespace());
    } else {
        debug!("cgroup-v2 namespaces unsupported, step shares the host cgroup namespace");
    }

    mutators.extend(security::security_mutators(
        config.security_mode,
        config.apparmor_profile.as_deref(),
        config.selinux,
        host,
    )?);
    mutators.extend(process::process_mode_mutators(config.process_mode));
    mutators.extend(idmap::idmap_mutators(config.id_mapping.as_ref()));
    mutators.extend(rlimit::rlimit_mutators(&config.ulimits));
    if let Some(registry) = registry {
        mutators.extend(devices::cdi_mutators(registry, &config.cdi_devices));
    }

    for mutate in mutators {
        mutate(spec)?;
    }
    Ok(())
}

/// Requests a private cgroup namespace.
fn with_cgroup_namespace() -> SpecMutator {
    Box::new(|spec| {
        if !spec.has_namespace(NamespaceType::Cgroup) {
            spec.linux
                .namespaces
                .push(LinuxNamespace::new(NamespaceType::Cgroup));
        }
        Ok(())
    })
}

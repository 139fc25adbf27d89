//! Configuration for one sandboxed step's spec assembly.

use std::path::PathBuf;

use crate::assembly::devices::CdiDevice;
use crate::assembly::idmap::IdentityMapping;
use crate::assembly::process::ProcessMode;
use crate::assembly::rlimit::Ulimit;
use crate::assembly::security::SecurityMode;

/// Everything the assembly pipeline needs to know about one step.
///
/// Use the builder methods to customize the step.
///
/// # Example
///
/// ```
/// use step_sandbox::assembly::{SecurityMode, StepConfig};
///
/// let config = StepConfig::default()
///     .with_security_mode(SecurityMode::Sandboxed)
///     .with_apparmor_profile("buildstep-default")
///     .with_selinux(true);
/// ```
#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Host resolver configuration bound read-only into the step.
    pub resolv_conf: PathBuf,

    /// Host hosts file bound read-only into the step.
    pub hosts_file: PathBuf,

    /// Security tier for the step. Immutable once assembly starts.
    pub security_mode: SecurityMode,

    /// AppArmor profile to enforce, if any.
    pub apparmor_profile: Option<String>,

    /// Whether to manage SELinux labels.
    pub selinux: bool,

    /// PID-namespace mode.
    pub process_mode: ProcessMode,

    /// Optional user-namespace identity mapping.
    pub id_mapping: Option<IdentityMapping>,

    /// Resource limit requests; nil placeholders are tolerated and skipped.
    pub ulimits: Vec<Option<Ulimit>>,

    /// Devices to inject via the external registry.
    pub cdi_devices: Vec<CdiDevice>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            hosts_file: PathBuf::from("/etc/hosts"),
            security_mode: SecurityMode::default(),
            apparmor_profile: None,
            selinux: false,
            process_mode: ProcessMode::default(),
            id_mapping: None,
            ulimits: Vec::new(),
            cdi_devices: Vec::new(),
        }
    }
}

impl StepConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host resolv.conf to bind into the step.
    #[must_use]
    pub fn with_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolv_conf = path.into();
        self
    }

    /// Sets the host hosts file to bind into the step.
    #[must_use]
    pub fn with_hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.hosts_file = path.into();
        self
    }

    /// Sets the security tier.
    #[must_use]
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    /// Names an AppArmor profile to enforce.
    #[must_use]
    pub fn with_apparmor_profile(mut self, profile: impl Into<String>) -> Self {
        self.apparmor_profile = Some(profile.into());
        self
    }

    /// Enables or disables SELinux label management.
    #[must_use]
    pub fn with_selinux(mut self, selinux: bool) -> Self {
        self.selinux = selinux;
        self
    }

    /// Sets the PID-namespace mode.
    #[must_use]
    pub fn with_process_mode(mut self, mode: ProcessMode) -> Self {
        self.process_mode = mode;
        self
    }

    /// Sets the user-namespace identity mapping.
    #[must_use]
    pub fn with_id_mapping(mut self, idmap: IdentityMapping) -> Self {
        self.id_mapping = Some(idmap);
        self
    }

    /// Sets the resource limit requests.
    #[must_use]
    pub fn with_ulimits(mut self, ulimits: Vec<Option<Ulimit>>) -> Self {
        self.ulimits = ulimits;
        self
    }

    /// Sets the devices to inject.
    #[must_use]
    pub fn with_cdi_devices(mut self, devices: Vec<CdiDevice>) -> Self {
        self.cdi_devices = devices;
        self
    }
}

//! Host security-feature detection.
//!
//! Each probe answers "can the host enforce this?" by inspecting the kernel's
//! filesystem interfaces, the same way the cgroup probe does. The probes are
//! grouped behind [`HostFeatures`] so the security-mode generator can be
//! exercised against fake hosts in tests.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::system::labels::{self, Labels};

/// The isolation features of the host, as seen by the security-mode
/// generator.
pub trait HostFeatures: Send + Sync {
    /// Whether cgroup-v2 namespaces can be created.
    fn cgroup_namespace_supported(&self) -> bool;

    /// Whether seccomp filtering is available.
    fn seccomp_supported(&self) -> bool;

    /// Whether AppArmor profiles can be enforced.
    fn apparmor_supported(&self) -> bool;

    /// Whether SELinux is enabled on the host.
    fn selinux_enabled(&self) -> bool;

    /// Computes a fresh process/mount label pair.
    ///
    /// With `disabled` set (or SELinux absent) the labels are empty, which
    /// tells the runtime to skip labeling entirely.
    fn init_labels(&self, disabled: bool) -> Result<Labels>;
}

/// The real host, probed through /proc and /sys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Host;

impl HostFeatures for Host {
    fn cgroup_namespace_supported(&self) -> bool {
        super::cgroup_v2_namespace_supported()
    }

    fn seccomp_supported(&self) -> bool {
        // actions_avail exists on every kernel with CONFIG_SECCOMP_FILTER.
        Path::new("/proc/sys/kernel/seccomp/actions_avail").exists()
    }

    fn apparmor_supported(&self) -> bool {
        if !Path::new("/sys/kernel/security/apparmor").exists() {
            return false;
        }
        fs::read_to_string("/sys/module/apparmor/parameters/enabled")
            .map(|state| state.starts_with('Y'))
            .unwrap_or(false)
    }

    fn selinux_enabled(&self) -> bool {
        Path::new("/sys/fs/selinux/enforce").exists()
    }

    fn init_labels(&self, disabled: bool) -> Result<Labels> {
        if disabled || !self.selinux_enabled() {
            return Ok(Labels::default());
        }
        labels::init_labels()
    }
}

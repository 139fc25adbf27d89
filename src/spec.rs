//! The runtime-spec descriptor mutated by the assembly pipeline.
//!
//! A [`RuntimeSpec`] describes the execution environment of one sandboxed
//! build-step process: its mounts, namespaces, security profile, and resource
//! limits. The descriptor is created once per step, mutated in place by the
//! ordered generator pipeline, then consumed read-only by the container
//! runtime that actually creates the namespaces and starts the process.
//!
//! The types serialize to the camelCase wire format container runtimes
//! consume, so an assembled spec can be written out as `config.json` directly.

use serde::{Deserialize, Serialize};

/// Default masked paths hiding host kernel interfaces from the step.
pub const DEFAULT_MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/proc/scsi",
    "/sys/firmware",
];

/// Default read-only paths under /proc.
pub const DEFAULT_READONLY_PATHS: &[&str] = &[
    "/proc/asound",
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
];

/// A single mount entry.
///
/// Mount lists are ordered. Entries destined for the same path may coexist;
/// the runtime resolves overlaps last-applicable-wins unless a generator
/// removes the conflict explicitly. Generators that must guarantee precedence
/// (the bound /proc in host-PID mode) prepend rather than append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub fstype: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    /// Creates a mount entry from string-ish parts.
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        fstype: impl Into<String>,
        source: impl Into<String>,
        options: &[&str],
    ) -> Self {
        Self {
            destination: destination.into(),
            fstype: fstype.into(),
            source: source.into(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
        }
    }
}

/// The process definition of the spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<LinuxCapabilities>,
    /// `None` means no resource limits were ever configured; the runtime
    /// launcher treats that differently from an explicit empty list, so the
    /// rlimit generator never assigns an empty vector here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rlimits: Option<Vec<PosixRlimit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selinux_label: Option<String>,
    #[serde(default)]
    pub no_new_privileges: bool,
}

/// Capability sets granted to the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxCapabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effective: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inheritable: Vec<String>,
}

/// One process resource limit, named per the host convention (`RLIMIT_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosixRlimit {
    #[serde(rename = "type")]
    pub rlim_type: String,
    pub hard: u64,
    pub soft: u64,
}

/// Namespace kinds the spec can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceType {
    Pid,
    Network,
    Mount,
    Ipc,
    Uts,
    User,
    Cgroup,
}

/// A namespace entry. Removing an entry from the list means the process
/// shares the host's namespace of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub ns_type: NamespaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl LinuxNamespace {
    /// A private namespace of the given kind.
    #[must_use]
    pub fn new(ns_type: NamespaceType) -> Self {
        Self {
            ns_type,
            path: None,
        }
    }
}

/// A user-namespace ID mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxIdMapping {
    #[serde(rename = "hostID")]
    pub host_id: u32,
    #[serde(rename = "containerID")]
    pub container_id: u32,
    pub size: u32,
}

/// A seccomp profile attached to the spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxSeccomp {
    pub default_action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syscalls: Vec<LinuxSyscall>,
}

/// One seccomp rule: a set of syscall names sharing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxSyscall {
    pub names: Vec<String>,
    pub action: String,
}

/// Device-cgroup access rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxDeviceCgroup {
    pub allow: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub dev_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

/// Resource controls. Only the device-cgroup rules are populated by this
/// crate (the insecure security mode allows all devices); limit values are
/// an external concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<LinuxDeviceCgroup>,
}

/// The Linux-specific block of the spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<LinuxNamespace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<LinuxIdMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<LinuxIdMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readonly_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<LinuxSeccomp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<LinuxResources>,
}

/// A lifecycle hook the runtime invokes around the step process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

/// Hook collections. Device injection may append entries here; mutators
/// scheduled after injection must only append or filter, never reassign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create_runtime: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create_container: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poststop: Vec<Hook>,
}

impl Hooks {
    /// True when no hook of any phase is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_runtime.is_empty() && self.create_container.is_empty() && self.poststop.is_empty()
    }
}

/// The full runtime-spec descriptor for one sandboxed step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub process: Process,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub linux: Linux,
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,
}

impl RuntimeSpec {
    /// Builds the conventional base spec for a build step.
    ///
    /// The base carries the usual pseudo-filesystem mounts (including a
    /// default `/run` tmpfs, which the mount generators replace), private
    /// mount/pid/ipc/uts/network namespaces, and the default masked and
    /// read-only paths. Generators then specialize it.
    #[must_use]
    pub fn for_step(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            process: Process {
                args: args.into_iter().map(Into::into).collect(),
                env: vec![
                    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
                ],
                cwd: "/".to_string(),
                ..Process::default()
            },
            mounts: default_mounts(),
            hostname: None,
            linux: Linux {
                namespaces: vec![
                    LinuxNamespace::new(NamespaceType::Mount),
                    LinuxNamespace::new(NamespaceType::Pid),
                    LinuxNamespace::new(NamespaceType::Ipc),
                    LinuxNamespace::new(NamespaceType::Uts),
                    LinuxNamespace::new(NamespaceType::Network),
                ],
                masked_paths: DEFAULT_MASKED_PATHS.iter().map(|p| (*p).to_string()).collect(),
                readonly_paths: DEFAULT_READONLY_PATHS.iter().map(|p| (*p).to_string()).collect(),
                ..Linux::default()
            },
            hooks: Hooks::default(),
        }
    }

    /// True when a namespace of the given kind is requested.
    #[must_use]
    pub fn has_namespace(&self, ns_type: NamespaceType) -> bool {
        self.linux.namespaces.iter().any(|ns| ns.ns_type == ns_type)
    }
}

/// The pseudo-filesystem mounts every step starts from.
#[must_use]
pub fn default_mounts() -> Vec<Mount> {
    vec![
        Mount::new("/proc", "proc", "proc", &[]),
        Mount::new("/dev", "tmpfs", "tmpfs", &["nosuid", "strictatime", "mode=755", "size=65536k"]),
        Mount::new("/dev/pts", "devpts", "devpts", &[
            "nosuid",
            "noexec",
            "newinstance",
            "ptmxmode=0666",
            "mode=0620",
        ]),
        Mount::new("/dev/shm", "tmpfs", "shm", &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"]),
        Mount::new("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        Mount::new("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
        Mount::new("/run", "tmpfs", "tmpfs", &["nosuid", "strictatime", "mode=755", "size=65536k"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_spec_shape() {
        let spec = RuntimeSpec::for_step(["/bin/sh", "-c", "true"]);
        assert_eq!(spec.process.args.len(), 3);
        assert_eq!(spec.process.cwd, "/");
        assert!(spec.has_namespace(NamespaceType::Pid));
        assert!(spec.has_namespace(NamespaceType::Network));
        assert!(!spec.has_namespace(NamespaceType::User));
        assert!(spec.mounts.iter().any(|m| m.destination == "/run"));
        assert!(spec.linux.masked_paths.iter().any(|p| p == "/proc/kcore"));
        assert!(spec.process.rlimits.is_none());
    }

    #[test]
    fn test_spec_serializes_camel_case() {
        let spec = RuntimeSpec::for_step(["/bin/true"]);
        let json = serde_json::to_value(&spec).expect("serialize");
        assert!(json["linux"]["maskedPaths"].is_array());
        let mount = &json["mounts"][0];
        assert_eq!(mount["type"], "proc");
        assert_eq!(mount["destination"], "/proc");
        // Absent optional blocks stay absent, not null
        assert!(json["linux"].get("seccomp").is_none());
        assert!(json["process"].get("rlimits").is_none());
    }

    #[test]
    fn test_namespace_type_serializes_lowercase() {
        let ns = LinuxNamespace::new(NamespaceType::Pid);
        let json = serde_json::to_value(&ns).expect("serialize");
        assert_eq!(json["type"], "pid");
    }
}

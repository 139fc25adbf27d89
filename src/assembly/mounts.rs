//! Mount-shaping spec mutators.
//!
//! These generators run first in the pipeline: the security-mode generator
//! rewrites mounts they create (writable cgroupfs/sysfs overrides), so the
//! cgroup mount must already exist when it runs.

use std::path::{Path, PathBuf};

use crate::assembly::SpecMutator;
use crate::spec::Mount;

/// In-container destination of the tracing socket bind mount.
pub const TRACING_SOCKET_PATH: &str = "/dev/otel-grpc.sock";

/// The ordered mount mutations every step receives: drop the default `/run`
/// mount, bind the host's resolver and hosts files read-only, and mount the
/// cgroup pseudo-filesystem.
pub fn mount_mutators(resolv_conf: &Path, hosts_file: &Path) -> Vec<SpecMutator> {
    vec![
        with_removed_mount("/run"),
        with_ro_bind(resolv_conf, "/etc/resolv.conf"),
        with_ro_bind(hosts_file, "/etc/hosts"),
        with_cgroup(),
    ]
}

/// Strips every mount whose destination is the prefix or lies under it.
pub fn with_removed_mount(prefix: impl Into<String>) -> SpecMutator {
    let prefix = prefix.into();
    Box::new(move |spec| {
        spec.mounts = remove_mounts_with_prefix(std::mem::take(&mut spec.mounts), &prefix);
        Ok(())
    })
}

/// Appends a hardened read-only bind mount of a host file.
pub fn with_ro_bind(src: &Path, dest: impl Into<String>) -> SpecMutator {
    let src: PathBuf = src.to_path_buf();
    let dest = dest.into();
    Box::new(move |spec| {
        spec.mounts.push(Mount::new(
            dest,
            "bind",
            src.to_string_lossy().into_owned(),
            &["nosuid", "noexec", "nodev", "rbind", "ro"],
        ));
        Ok(())
    })
}

/// Appends the read-only cgroup pseudo-filesystem mount.
pub fn with_cgroup() -> SpecMutator {
    Box::new(|spec| {
        spec.mounts.push(Mount::new(
            "/sys/fs/cgroup",
            "cgroup",
            "cgroup",
            &["ro", "nosuid", "noexec", "nodev"],
        ));
        Ok(())
    })
}

/// The read-only rbind mount exposing a host tracing socket inside the step.
///
/// This is a descriptor-producing helper for the caller, not an in-place
/// mutator: the orchestrator decides whether to attach the mount.
#[must_use]
pub fn tracing_socket_mount(host_socket: &Path) -> Mount {
    Mount::new(
        TRACING_SOCKET_PATH,
        "bind",
        host_socket.to_string_lossy().into_owned(),
        &["ro", "rbind"],
    )
}

/// The tracing endpoint URI matching [`tracing_socket_mount`].
#[must_use]
pub fn tracing_socket_uri() -> String {
    format!("unix://{TRACING_SOCKET_PATH}")
}

pub(crate) fn remove_mounts_with_prefix(mounts: Vec<Mount>, prefix: &str) -> Vec<Mount> {
    mounts
        .into_iter()
        .filter(|m| !has_path_prefix(&m.destination, prefix))
        .collect()
}

/// Component-wise path prefix check: `/proc` covers `/proc` and `/proc/sys`
/// but not `/process`.
pub(crate) fn has_path_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RuntimeSpec;

    #[test]
    fn test_path_prefix_is_component_wise() {
        assert!(has_path_prefix("/proc", "/proc"));
        assert!(has_path_prefix("/proc/sys/kernel", "/proc"));
        assert!(!has_path_prefix("/process", "/proc"));
        assert!(!has_path_prefix("/run", "/proc"));
    }

    #[test]
    fn test_removed_mount_strips_prefix_only() {
        let mut spec = RuntimeSpec::default();
        spec.mounts = vec![
            Mount::new("/run", "tmpfs", "tmpfs", &[]),
            Mount::new("/run/lock", "tmpfs", "tmpfs", &[]),
            Mount::new("/runner", "bind", "/srv/runner", &[]),
        ];

        with_removed_mount("/run")(&mut spec).expect("removed-mount mutator");

        assert_eq!(spec.mounts.len(), 1);
        assert_eq!(spec.mounts[0].destination, "/runner");
    }

    #[test]
    fn test_ro_bind_options_are_hardened() {
        let mut spec = RuntimeSpec::default();
        with_ro_bind(Path::new("/etc/resolv.conf"), "/etc/resolv.conf")(&mut spec)
            .expect("ro-bind mutator");

        let mount = &spec.mounts[0];
        assert_eq!(mount.fstype, "bind");
        assert_eq!(mount.source, "/etc/resolv.conf");
        assert_eq!(mount.options, ["nosuid", "noexec", "nodev", "rbind", "ro"]);
    }

    #[test]
    fn test_cgroup_mount_is_read_only() {
        let mut spec = RuntimeSpec::default();
        with_cgroup()(&mut spec).expect("cgroup mutator");

        let mount = &spec.mounts[0];
        assert_eq!(mount.destination, "/sys/fs/cgroup");
        assert_eq!(mount.fstype, "cgroup");
        assert_eq!(mount.options, ["ro", "nosuid", "noexec", "nodev"]);
    }

    #[test]
    fn test_mount_mutators_replace_run_and_bind_host_files() {
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        assert!(spec.mounts.iter().any(|m| m.destination == "/run"));

        for mutate in mount_mutators(Path::new("/tmp/resolv.conf"), Path::new("/tmp/hosts")) {
            mutate(&mut spec).expect("mount mutator");
        }

        assert!(!spec.mounts.iter().any(|m| m.destination == "/run"));
        assert!(spec
            .mounts
            .iter()
            .any(|m| m.destination == "/etc/resolv.conf" && m.source == "/tmp/resolv.conf"));
        assert!(spec
            .mounts
            .iter()
            .any(|m| m.destination == "/etc/hosts" && m.source == "/tmp/hosts"));
        assert!(spec.mounts.iter().any(|m| m.fstype == "cgroup"));
    }

    #[test]
    fn test_tracing_socket_descriptor() {
        let mount = tracing_socket_mount(Path::new("/run/otel/agent.sock"));
        assert_eq!(mount.destination, TRACING_SOCKET_PATH);
        assert_eq!(mount.source, "/run/otel/agent.sock");
        assert_eq!(mount.options, ["ro", "rbind"]);
        assert_eq!(tracing_socket_uri(), "unix:///dev/otel-grpc.sock");
    }
}

//! Process-namespace mode.
//!
//! The default gives the step its own PID namespace and needs no mutation.
//! Host mode shares the host's PID namespace, which forces a rebind of
//! /proc: the masked default procfs mount would otherwise hide the very
//! processes the mode exists to expose.
//!
//! Runs after the mount and security generators: it rewrites the mount list
//! they produced.

use crate::assembly::mounts::{has_path_prefix, remove_mounts_with_prefix};
use crate::assembly::SpecMutator;
use crate::spec::{Mount, NamespaceType};

/// Whether the step shares the host's PID namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessMode {
    /// Share the host PID namespace and bind the host's real /proc.
    HostProcessNamespace,
    /// Private PID namespace (the default).
    #[default]
    SandboxedProcessNamespace,
}

/// Mutators implementing the chosen process mode.
pub fn process_mode_mutators(mode: ProcessMode) -> Vec<SpecMutator> {
    match mode {
        ProcessMode::SandboxedProcessNamespace => Vec::new(),
        ProcessMode::HostProcessNamespace => {
            vec![with_host_pid_namespace(), with_bound_proc()]
        }
    }
}

/// Shares the host PID namespace by removing the pid namespace entry.
fn with_host_pid_namespace() -> SpecMutator {
    Box::new(|spec| {
        spec.linux
            .namespaces
            .retain(|ns| ns.ns_type != NamespaceType::Pid);
        Ok(())
    })
}

/// Replaces every /proc mount with a single rbind of the host's real /proc,
/// prepended so it supersedes any default masked procfs mount.
fn with_bound_proc() -> SpecMutator {
    Box::new(|spec| {
        spec.mounts = remove_mounts_with_prefix(std::mem::take(&mut spec.mounts), "/proc");
        // rbind only: rbind+ro is not recursively effective, so a read-only
        // flag here would be a false promise.
        let proc_mount = Mount::new("/proc", "bind", "/proc", &["rbind"]);
        spec.mounts.insert(0, proc_mount);

        // The bound host /proc now governs visibility; stale /proc entries in
        // the path lists would mask paths that no longer exist in this view.
        spec.linux
            .masked_paths
            .retain(|p| !has_path_prefix(p, "/proc"));
        spec.linux
            .readonly_paths
            .retain(|p| !has_path_prefix(p, "/proc"));

        Ok(())
    })
}

//! The security-mode state machine.
//!
//! Two tiers: `Insecure` relaxes isolation (full capability set, writable
//! pseudo-filesystems, labeling disabled) for steps that are trusted to
//! administer the host; `Sandboxed` attaches the default seccomp profile,
//! an optional AppArmor profile, and SELinux labels. `Unspecified` is a
//! pass-through.
//!
//! Host-capability mismatches surface here, before any mutator is built:
//! a requested SELinux or AppArmor feature the host cannot enforce aborts
//! spec construction. The single deliberate exception is seccomp, whose
//! absence silently skips the profile.
//!
//! These mutators rewrite mounts created by the mount generators (writable
//! cgroupfs/sysfs), so they must run after them.

use tracing::debug;

use crate::assembly::SpecMutator;
use crate::error::{Result, SpecError};
use crate::spec::{
    LinuxCapabilities, LinuxDeviceCgroup, LinuxResources, LinuxSeccomp, LinuxSyscall, RuntimeSpec,
};
use crate::system::HostFeatures;

/// Policy tier governing capability, label, and profile strictness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityMode {
    /// Relaxed isolation: the step may administer the host.
    Insecure,
    /// Full confinement: seccomp, AppArmor, SELinux as available/requested.
    #[default]
    Sandboxed,
    /// No security mutations at all.
    Unspecified,
}

/// The capability set granted in insecure mode.
const INSECURE_CAPABILITIES: &[&str] = &[
    "CAP_AUDIT_CONTROL",
    "CAP_AUDIT_READ",
    "CAP_AUDIT_WRITE",
    "CAP_BLOCK_SUSPEND",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_KILL",
    "CAP_LEASE",
    "CAP_LINUX_IMMUTABLE",
    "CAP_MAC_ADMIN",
    "CAP_MAC_OVERRIDE",
    "CAP_MKNOD",
    "CAP_NET_ADMIN",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_RAW",
    "CAP_PERFMON",
    "CAP_SETFCAP",
    "CAP_SETGID",
    "CAP_SETPCAP",
    "CAP_SETUID",
    "CAP_SYSLOG",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_CHROOT",
    "CAP_SYS_MODULE",
    "CAP_SYS_NICE",
    "CAP_SYS_PACCT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_WAKE_ALARM",
];

/// Builds the security mutators for one step.
///
/// # Errors
///
/// Returns [`SpecError::SelinuxUnavailable`] when label management is
/// requested without SELinux on the host, and
/// [`SpecError::ApparmorUnsupported`] when a profile is named but AppArmor
/// cannot enforce it. Both are reported before any mutation is constructed.
pub fn security_mutators(
    mode: SecurityMode,
    apparmor_profile: Option<&str>,
    selinux: bool,
    host: &dyn HostFeatures,
) -> Result<Vec<SpecMutator>> {
    if selinux && !host.selinux_enabled() {
        return Err(SpecError::SelinuxUnavailable);
    }

    match mode {
        SecurityMode::Insecure => {
            let mut mutators = vec![
                with_insecure_spec(),
                with_writable_fs("cgroup"),
                with_writable_fs("sysfs"),
            ];
            if selinux {
                // Labels computed with labeling disabled: both end up empty.
                let labels = host.init_labels(true)?;
                mutators.push(with_labels(labels));
            }
            Ok(mutators)
        }
        SecurityMode::Sandboxed => {
            let mut mutators = Vec::new();
            if host.seccomp_supported() {
                mutators.push(with_default_seccomp_profile());
            } else {
                debug!("seccomp not supported on this host, skipping default profile");
            }
            if let Some(profile) = apparmor_profile {
                if !host.apparmor_supported() {
                    return Err(SpecError::ApparmorUnsupported {
                        profile: profile.to_string(),
                    });
                }
                mutators.push(with_apparmor_profile(profile));
            }
            if selinux {
                let labels = host.init_labels(false)?;
                mutators.push(with_labels(labels));
            }
            Ok(mutators)
        }
        SecurityMode::Unspecified => Ok(Vec::new()),
    }
}

/// Grants the insecure capability set, allows all devices, and clears the
/// masked/read-only path lists.
fn with_insecure_spec() -> SpecMutator {
    Box::new(|spec| {
        let caps: Vec<String> = INSECURE_CAPABILITIES.iter().map(|c| (*c).to_string()).collect();
        spec.process.capabilities = Some(LinuxCapabilities {
            bounding: caps.clone(),
            effective: caps.clone(),
            permitted: caps.clone(),
            inheritable: caps,
        });
        spec.linux
            .resources
            .get_or_insert_with(LinuxResources::default)
            .devices = vec![LinuxDeviceCgroup {
            allow: true,
            access: Some("rwm".to_string()),
            ..LinuxDeviceCgroup::default()
        }];
        spec.linux.masked_paths.clear();
        spec.linux.readonly_paths.clear();
        Ok(())
    })
}

/// Drops the `ro` option from every mount of the given filesystem type.
fn with_writable_fs(fstype: &str) -> SpecMutator {
    let fstype = fstype.to_string();
    Box::new(move |spec| {
        for mount in spec.mounts.iter_mut().filter(|m| m.fstype == fstype) {
            mount.options.retain(|o| o != "ro");
        }
        Ok(())
    })
}

/// Attaches the default seccomp profile.
///
/// Must follow any mutator that sets process capabilities: the profile
/// widens with the granted capability set.
fn with_default_seccomp_profile() -> SpecMutator {
    Box::new(|spec| {
        let profile = default_seccomp_profile(spec);
        spec.linux.seccomp = Some(profile);
        Ok(())
    })
}

fn with_apparmor_profile(profile: &str) -> SpecMutator {
    let profile = profile.to_string();
    Box::new(move |spec| {
        spec.process.apparmor_profile = Some(profile);
        Ok(())
    })
}

fn with_labels(labels: crate::system::Labels) -> SpecMutator {
    Box::new(move |spec| {
        spec.process.selinux_label = if labels.process.is_empty() {
            None
        } else {
            Some(labels.process)
        };
        spec.linux.mount_label = if labels.mount.is_empty() {
            None
        } else {
            Some(labels.mount)
        };
        Ok(())
    })
}

/// The default profile: deny by default, allow the syscall families a build
/// step needs, and widen for capability-gated syscalls actually granted.
#[must_use]
pub fn default_seccomp_profile(spec: &RuntimeSpec) -> LinuxSeccomp {
    let mut syscalls = vec![LinuxSyscall {
        names: base_allowlist(),
        action: "SCMP_ACT_ALLOW".to_string(),
    }];

    let granted = |cap: &str| {
        spec.process
            .capabilities
            .as_ref()
            .is_some_and(|c| c.bounding.iter().any(|b| b == cap))
    };

    if granted("CAP_SYS_PTRACE") {
        syscalls.push(LinuxSyscall {
            names: vec![
                "kcmp".to_string(),
                "process_vm_readv".to_string(),
                "process_vm_writev".to_string(),
                "ptrace".to_string(),
            ],
            action: "SCMP_ACT_ALLOW".to_string(),
        });
    }
    if granted("CAP_SYS_ADMIN") {
        syscalls.push(LinuxSyscall {
            names: vec![
                "mount".to_string(),
                "umount2".to_string(),
                "pivot_root".to_string(),
                "setns".to_string(),
                "unshare".to_string(),
            ],
            action: "SCMP_ACT_ALLOW".to_string(),
        });
    }

    LinuxSeccomp {
        default_action: "SCMP_ACT_ERRNO".to_string(),
        architectures: vec![
            "SCMP_ARCH_X86_64".to_string(),
            "SCMP_ARCH_X86".to_string(),
            "SCMP_ARCH_AARCH64".to_string(),
        ],
        syscalls,
    }
}

/// Syscall families every confined step may use: bootstrap, file I/O,
/// signals, process control, timers, and plain sockets.
fn base_allowlist() -> Vec<String> {
    [
        // bootstrap (linker, libc init, exit)
        "arch_prctl", "brk", "execve", "execveat", "exit", "exit_group", "futex", "getrandom",
        "mmap", "mprotect", "munmap", "prctl", "prlimit64", "rseq", "set_robust_list",
        "set_tid_address",
        // file I/O
        "access", "chdir", "chmod", "chown", "close", "close_range", "dup", "dup2", "dup3",
        "faccessat", "faccessat2", "fallocate", "fchdir", "fchmod", "fchmodat", "fchown",
        "fchownat", "fcntl", "fdatasync", "flock", "fstat", "fstatfs", "fsync", "ftruncate",
        "getcwd", "getdents", "getdents64", "ioctl", "lseek", "lstat", "linkat", "link", "mkdir",
        "mkdirat", "newfstatat", "open", "openat", "pread64", "pwrite64", "read", "readlink",
        "readlinkat", "readv", "rename", "renameat", "renameat2", "rmdir", "sendfile", "splice",
        "stat", "statfs", "statx", "symlink", "symlinkat", "truncate", "umask", "unlink",
        "unlinkat", "utimensat", "write", "writev",
        // signals and process control
        "clone", "clone3", "fork", "getpgid", "getpgrp", "getpid", "getppid", "getsid", "gettid",
        "getuid", "geteuid", "getgid", "getegid", "getgroups", "getresuid", "getresgid", "kill",
        "rt_sigaction", "rt_sigpending", "rt_sigprocmask", "rt_sigqueueinfo", "rt_sigreturn",
        "rt_sigsuspend", "rt_sigtimedwait", "setpgid", "setsid", "sigaltstack", "tgkill", "tkill",
        "vfork", "wait4", "waitid",
        // memory and scheduling
        "madvise", "membarrier", "memfd_create", "mlock", "mremap", "munlock",
        "sched_getaffinity", "sched_yield",
        // time and polling
        "clock_getres", "clock_gettime", "clock_nanosleep", "epoll_create1", "epoll_ctl",
        "epoll_pwait", "epoll_wait", "eventfd2", "gettimeofday", "nanosleep", "pipe", "pipe2",
        "poll", "ppoll", "pselect6", "select", "timer_create", "timer_delete", "timer_gettime",
        "timer_settime",
        // sockets (network namespace still confines reach)
        "accept", "accept4", "bind", "connect", "getpeername", "getsockname", "getsockopt",
        "listen", "recvfrom", "recvmmsg", "recvmsg", "sendmmsg", "sendmsg", "sendto",
        "setsockopt", "shutdown", "socket", "socketpair",
        // misc
        "capget", "capset", "getrlimit", "getrusage", "setrlimit", "sysinfo", "uname",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

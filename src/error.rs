//! Error types for spec assembly and subpath resolution.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.
//!
//! The taxonomy distinguishes host-capability mismatches (a requested security
//! feature the host cannot enforce), race detection during subpath resolution
//! (security-relevant, named distinctly from ordinary I/O failure), wrapped
//! syscall failures, and device-injection failures.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while assembling a runtime spec or resolving a subpath mount.
#[derive(Error, Debug, Diagnostic)]
pub enum SpecError {
    /// SELinux label management was requested but the host has no SELinux.
    #[error("selinux is not available")]
    #[diagnostic(
        code(step_sandbox::security::selinux),
        help("SELinux labeling requires selinuxfs mounted at /sys/fs/selinux")
    )]
    SelinuxUnavailable,

    /// An AppArmor profile was named but the host cannot enforce it.
    ///
    /// A requested profile that cannot be enforced is a security defect,
    /// not a degraded mode, so this is fatal.
    #[error("AppArmor is not supported on this host, but the profile '{profile}' was specified")]
    #[diagnostic(code(step_sandbox::security::apparmor))]
    ApparmorUnsupported { profile: String },

    /// A subpath lexically escapes the mount source it is resolved against.
    #[error("subpath {subpath} escapes the mount source")]
    #[diagnostic(code(step_sandbox::subpath::escape))]
    SubpathEscape { subpath: String },

    /// Subpath resolution observed a concurrent symlink swap on every attempt
    /// and exhausted its retry budget.
    #[error("unable to safely resolve subpath {subpath}")]
    #[diagnostic(
        code(step_sandbox::subpath::race),
        help("a path component was replaced concurrently during resolution")
    )]
    SubpathRace { subpath: String },

    /// Opening a path-only descriptor failed.
    #[error("failed to open {path}")]
    #[diagnostic(code(step_sandbox::subpath::open))]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the resolved path back through the descriptor failed.
    #[error("failed to read back descriptor path {path}")]
    #[diagnostic(code(step_sandbox::subpath::readlink))]
    ReadBack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bind mount or remount syscall failed.
    #[error("mount at {target} failed")]
    #[diagnostic(code(step_sandbox::subpath::mount))]
    Mount {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Releasing a previously created bind mount failed.
    #[error("unmount of {target} failed")]
    #[diagnostic(code(step_sandbox::subpath::unmount))]
    Unmount {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The SELinux context configuration could not be read.
    #[error("failed to read selinux contexts from {path}")]
    #[diagnostic(code(step_sandbox::security::label_contexts))]
    LabelContexts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The SELinux context configuration is missing required entries.
    #[error("malformed selinux context file {path}")]
    #[diagnostic(
        code(step_sandbox::security::label_contexts_malformed),
        help("the lxc_contexts file must define both `process` and `file` contexts")
    )]
    MalformedLabelContexts { path: PathBuf },

    /// Injecting CDI devices into the spec failed.
    ///
    /// Registry refresh failure is not reported through this variant; refresh
    /// errors are logged and injection is still attempted.
    #[error("CDI device injection failed")]
    #[diagnostic(code(step_sandbox::devices::inject))]
    DeviceInjection {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, SpecError>;

//! Runtime-spec assembly for sandboxed build-step processes.
//!
//! This crate builds the execution environment descriptor (namespaces,
//! mounts, security profile, resource limits, devices) for a single
//! sandboxed build step, immediately before a container runtime launches
//! it. It is the security boundary between untrusted build instructions and
//! the host: every concern that shapes the spec is an explicit mutation
//! applied in a fixed order, and every host feature it relies on is probed
//! rather than assumed.
//!
//! The crate does not create namespaces or start processes; it consumes and
//! produces declarative descriptors for the runtime that does.
//!
//! # Example
//!
//! ```no_run
//! use step_sandbox::assembly::{self, SecurityMode, StepConfig};
//! use step_sandbox::spec::RuntimeSpec;
//! use step_sandbox::system::Host;
//!
//! fn main() -> step_sandbox::Result<()> {
//!     let mut spec = RuntimeSpec::for_step(["/bin/sh", "-c", "make"]);
//!     let config = StepConfig::default().with_security_mode(SecurityMode::Sandboxed);
//!     assembly::assemble(&mut spec, &config, &Host, None)?;
//!     // hand `spec` to the runtime launcher
//!     Ok(())
//! }
//! ```
//!
//! # Subpath mounts
//!
//! When a step needs a restricted view of a larger mount, use
//! [`subpath::resolve_subpath`]: it derives a bind mount of a verified
//! subdirectory, defending against symlink-swap races during resolution.

pub mod assembly;
pub mod error;
pub mod spec;
pub mod subpath;
pub mod system;

// Re-export commonly used types
pub use assembly::{
    assemble, CdiDevice, DeviceRegistry, IdMap, IdentityMapping, ProcessMode, SecurityMode,
    SpecMutator, StepConfig, Ulimit,
};
pub use error::{Result, SpecError};
pub use spec::{Mount, RuntimeSpec};
pub use subpath::{resolve_subpath, BindMounter, ReleaseFn};
pub use system::{cgroup_v2_namespace_supported, Host, HostFeatures};

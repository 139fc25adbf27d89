//! Host capability probing.
//!
//! The assembly pipeline never assumes a kernel feature is present: every
//! isolation feature it relies on is probed here, and everything is exposed
//! through the [`HostFeatures`] trait so tests can substitute a fake host
//! without touching the real filesystem.
//!
//! The cgroup-v2 namespace probe is memoized for the process lifetime:
//! the first caller computes, concurrent callers block on the same
//! computation, and every later caller observes the cached value.

mod features;
mod labels;

pub use features::{Host, HostFeatures};
pub use labels::Labels;

use std::path::Path;
use std::sync::OnceLock;

/// Paths whose joint existence indicates cgroup-v2 namespace support.
///
/// Doing cgroup namespaces on a cgroups-v1 host fails with EINVAL on
/// non-standard hierarchies, so both the namespace file and the unified
/// hierarchy marker must be present.
const CGROUP_NS_PATHS: [&str; 2] = [
    "/proc/self/ns/cgroup",
    "/sys/fs/cgroup/cgroup.subtree_control",
];

static CGROUP_NS_SUPPORTED: OnceLock<bool> = OnceLock::new();

/// Whether the host supports cgroup-v2 namespaces.
///
/// Computed at most once per process regardless of concurrent callers;
/// absence of either probe path yields `false`, never an error.
#[must_use]
pub fn cgroup_v2_namespace_supported() -> bool {
    *CGROUP_NS_SUPPORTED.get_or_init(|| CGROUP_NS_PATHS.iter().all(|p| Path::new(p).exists()))
}

/// Instance form of the cgroup-v2 namespace probe with an injectable
/// existence check.
///
/// The process-wide [`cgroup_v2_namespace_supported`] is the production
/// entry point; this form exists so tests can count filesystem probes and
/// simulate hosts without the feature.
pub struct CgroupNsProbe<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    exists: F,
    cached: OnceLock<bool>,
}

impl<F> CgroupNsProbe<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    /// Creates a probe over the given existence check.
    pub fn new(exists: F) -> Self {
        Self {
            exists,
            cached: OnceLock::new(),
        }
    }

    /// Whether cgroup-v2 namespaces are supported, probing at most once.
    pub fn supported(&self) -> bool {
        *self
            .cached
            .get_or_init(|| CGROUP_NS_PATHS.iter().all(|p| (self.exists)(Path::new(p))))
    }
}

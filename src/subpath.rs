//! Race-safe restriction of a mount to a subdirectory of its source.
//!
//! Deriving a bind mount of `<source>/<subpath>` naively (resolve the path,
//! then mount it) is racy: an attacker who can write under the source can
//! swap a path component for a symlink between resolution and mount and
//! redirect the bind anywhere on the host. This module defends with
//! descriptor re-verification:
//!
//! 1. Join and clean the subpath lexically against the source root,
//!    rejecting escapes.
//! 2. Open the result with a path-only descriptor (`O_PATH | O_CLOEXEC`).
//! 3. Read the descriptor's entry under `/proc/self/fd` and compare it to
//!    the computed path. A mismatch means a symlink was swapped in
//!    concurrently: close, retry, bounded by a budget.
//! 4. On a match, bind-mount *through the descriptor path*, so the kernel
//!    binds the already-verified inode; later filesystem mutation at the
//!    original path cannot affect the mount.
//!
//! The bounded retry loop is itself the concurrency-safety mechanism; no
//! locking is performed against external filesystem mutation. Do not
//! simplify this to stat-then-mount.

use std::fs::{self, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};

use nix::fcntl::OFlag;
use nix::mount::{mount as sys_mount, umount2, MntFlags, MsFlags};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SpecError};
use crate::spec::Mount;

/// Default retry budget for racing symlink swaps.
pub const DEFAULT_RESOLVE_RETRIES: u32 = 10;

/// Releases a mount created during subpath resolution.
pub type ReleaseFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Performs the single forced bind mount that pins the verified inode.
///
/// Split out so tests can resolve subpaths without mount privileges; the
/// production implementation is [`HostBindMounter`].
pub trait BindMounter: Send + Sync {
    /// Mounts `mount` (whose source may be a `/proc/self/fd` path) and
    /// returns the mountpoint plus its release function.
    fn mount(&self, mount: &Mount) -> Result<(PathBuf, ReleaseFn)>;
}

/// Restricts `mount` to `sub_path` under its source, race-safely, with the
/// default retry budget. The caller owns the returned release function and
/// must invoke it on teardown.
pub fn resolve_subpath(mount: &Mount, sub_path: &str) -> Result<(Mount, ReleaseFn)> {
    resolve_subpath_with(&HostBindMounter::new(), mount, sub_path, DEFAULT_RESOLVE_RETRIES)
}

/// [`resolve_subpath`] with an explicit mounter and retry budget.
#[instrument(skip(mounter, mount), fields(source = %mount.source, sub_path = %sub_path))]
pub fn resolve_subpath_with(
    mounter: &dyn BindMounter,
    mount: &Mount,
    sub_path: &str,
    retries: u32,
) -> Result<(Mount, ReleaseFn)> {
    let root = PathBuf::from(&mount.source);
    let mut retries = retries;
    loop {
        let src = rooted_join(&root, sub_path)?;

        // Path-only descriptor: no read/write access is requested and the fd
        // is closed across exec.
        let fh = OpenOptions::new()
            .read(true)
            .custom_flags((OFlag::O_PATH | OFlag::O_CLOEXEC).bits())
            .open(&src)
            .map_err(|source| SpecError::Open {
                path: src.clone(),
                source,
            })?;

        let fd_path = PathBuf::from(format!("/proc/self/fd/{}", fh.as_raw_fd()));
        let resolved = fs::read_link(&fd_path).map_err(|source| SpecError::ReadBack {
            path: fd_path.clone(),
            source,
        })?;

        if resolved != src {
            // A component was swapped for a symlink between the lexical join
            // and the open; the descriptor points somewhere else.
            warn!(
                computed = %src.display(),
                resolved = %resolved.display(),
                "detected concurrent path substitution, retrying"
            );
            retries = retries.saturating_sub(1);
            if retries == 0 {
                return Err(SpecError::SubpathRace {
                    subpath: sub_path.to_string(),
                });
            }
            drop(fh);
            continue;
        }

        // Bind strictly through the verified descriptor, remounting only this
        // single mount rather than the whole stack.
        let mut restricted = mount.clone();
        restricted.source = fd_path.to_string_lossy().into_owned();
        let (mountpoint, release) = mounter.mount(&restricted)?;
        restricted.source = mountpoint.to_string_lossy().into_owned();

        // The mount now holds the target; the descriptor can go.
        drop(fh);

        debug!(mountpoint = %restricted.source, "subpath resolved");
        return Ok((restricted, release));
    }
}

/// Lexically joins `sub_path` onto `root`, rejecting escapes above the root.
/// Absolute subpaths are treated as rooted at the mount source.
fn rooted_join(root: &Path, sub_path: &str) -> Result<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(sub_path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(SpecError::SubpathEscape {
                        subpath: sub_path.to_string(),
                    });
                }
                joined.pop();
                depth -= 1;
            }
            Component::Prefix(_) => {
                return Err(SpecError::SubpathEscape {
                    subpath: sub_path.to_string(),
                });
            }
        }
    }
    Ok(joined)
}

/// The production mounter: binds to a fresh private mountpoint with the
/// flags implied by the mount's options.
pub struct HostBindMounter {
    base: PathBuf,
}

impl HostBindMounter {
    /// Mountpoints are created under the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: std::env::temp_dir(),
        }
    }

    /// Mountpoints are created under `base`.
    #[must_use]
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for HostBindMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BindMounter for HostBindMounter {
    fn mount(&self, mount: &Mount) -> Result<(PathBuf, ReleaseFn)> {
        let target = self.base.join(format!("step-mount-{}", Uuid::new_v4()));
        fs::create_dir_all(&target).map_err(|source| SpecError::Mount {
            target: target.clone(),
            source,
        })?;

        let (flags, read_only) = mount_flags(&mount.options);
        sys_mount(
            Some(mount.source.as_str()),
            &target,
            None::<&str>,
            flags,
            None::<&str>,
        )
        .map_err(|errno| SpecError::Mount {
            target: target.clone(),
            source: std::io::Error::from(errno),
        })?;

        if read_only {
            // Bind mounts ignore MS_RDONLY on creation; a remount pass
            // applies it.
            sys_mount(
                None::<&str>,
                &target,
                None::<&str>,
                flags | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )
            .map_err(|errno| SpecError::Mount {
                target: target.clone(),
                source: std::io::Error::from(errno),
            })?;
        }

        let release_target = target.clone();
        let release: ReleaseFn = Box::new(move || {
            if let Err(errno) = umount2(&release_target, MntFlags::empty()) {
                warn!(target = %release_target.display(), error = %errno, "unmount failed, detaching lazily");
                umount2(&release_target, MntFlags::MNT_DETACH).map_err(|errno| {
                    SpecError::Unmount {
                        target: release_target.clone(),
                        source: std::io::Error::from(errno),
                    }
                })?;
            }
            let _ = fs::remove_dir(&release_target);
            Ok(())
        });

        Ok((target, release))
    }
}

/// Translates mount option strings into syscall flags, separating the
/// read-only request (which needs a remount pass for bind mounts).
fn mount_flags(options: &[String]) -> (MsFlags, bool) {
    let mut flags = MsFlags::MS_BIND;
    let mut read_only = false;
    for option in options {
        match option.as_str() {
            "rbind" => flags |= MsFlags::MS_BIND | MsFlags::MS_REC,
            "bind" => flags |= MsFlags::MS_BIND,
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            "ro" => read_only = true,
            _ => {}
        }
    }
    (flags, read_only)
}

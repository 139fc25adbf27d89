//! SELinux process/mount label computation.
//!
//! Labels come from the host policy's `lxc_contexts` file, with a fresh MCS
//! category pair appended so concurrently running steps cannot read each
//! other's files even under the same base context.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Result, SpecError};

/// Number of MCS categories available per sensitivity level.
const MCS_CATEGORIES: u16 = 1024;

/// A computed SELinux label pair: one for the process, one for its mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    pub process: String,
    pub mount: String,
}

impl Labels {
    /// True when labeling is disabled (both labels empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.process.is_empty() && self.mount.is_empty()
    }
}

/// Computes a fresh label pair from the host policy.
pub(crate) fn init_labels() -> Result<Labels> {
    let path = lxc_contexts_path();
    let contexts = fs::read_to_string(&path).map_err(|source| SpecError::LabelContexts {
        path: path.clone(),
        source,
    })?;
    init_labels_from(&path, &contexts)
}

/// Parses context definitions and appends one MCS pair to both.
pub(crate) fn init_labels_from(path: &Path, contexts: &str) -> Result<Labels> {
    let mut process = None;
    let mut file = None;

    for line in contexts.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "process" => process = Some(value),
            "file" => file = Some(value),
            _ => {}
        }
    }

    let (Some(process), Some(file)) = (process, file) else {
        return Err(SpecError::MalformedLabelContexts {
            path: path.to_path_buf(),
        });
    };

    let (c1, c2) = mcs_pair();
    Ok(Labels {
        process: with_level(&process, c1, c2),
        mount: with_level(&file, c1, c2),
    })
}

/// Location of the container context definitions for the configured policy.
fn lxc_contexts_path() -> PathBuf {
    let policy = fs::read_to_string("/etc/selinux/config")
        .ok()
        .and_then(|config| {
            config.lines().find_map(|line| {
                line.trim()
                    .strip_prefix("SELINUXTYPE=")
                    .map(|p| p.trim().to_string())
            })
        })
        .unwrap_or_else(|| "targeted".to_string());
    PathBuf::from(format!("/etc/selinux/{policy}/contexts/lxc_contexts"))
}

/// Two distinct MCS categories, both below the category limit.
fn mcs_pair() -> (u16, u16) {
    let bytes = *Uuid::new_v4().as_bytes();
    let c1 = u16::from_be_bytes([bytes[0], bytes[1]]) % MCS_CATEGORIES;
    let mut c2 = u16::from_be_bytes([bytes[2], bytes[3]]) % MCS_CATEGORIES;
    if c2 == c1 {
        c2 = (c2 + 1) % MCS_CATEGORIES;
    }
    if c1 < c2 {
        (c1, c2)
    } else {
        (c2, c1)
    }
}

/// Replaces the level field of a `user:role:type:level` context with an
/// MCS-categorized one.
fn with_level(context: &str, c1: u16, c2: u16) -> String {
    let mut parts: Vec<&str> = context.split(':').collect();
    let level = format!("s0:c{c1},c{c2}");
    if parts.len() >= 4 {
        parts.truncate(3);
    }
    format!("{}:{}", parts.join(":"), level)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXTS: &str = r#"
process = "system_u:system_r:container_t:s0"
content = "system_u:object_r:virt_var_lib_t:s0"
file = "system_u:object_r:container_file_t:s0"
"#;

    #[test]
    fn test_parses_process_and_file_contexts() {
        let labels =
            init_labels_from(Path::new("/tmp/lxc_contexts"), CONTEXTS).expect("parse contexts");
        assert!(labels.process.starts_with("system_u:system_r:container_t:s0:c"));
        assert!(labels.mount.starts_with("system_u:object_r:container_file_t:s0:c"));
    }

    #[test]
    fn test_process_and_mount_share_category_pair() {
        let labels = init_labels_from(Path::new("/tmp/lxc_contexts"), CONTEXTS).expect("parse");
        let process_level = labels.process.splitn(4, ':').nth(3).map(str::to_string);
        let mount_level = labels.mount.splitn(4, ':').nth(3).map(str::to_string);
        assert_eq!(process_level, mount_level);
    }

    #[test]
    fn test_missing_file_context_is_malformed() {
        let result = init_labels_from(
            Path::new("/tmp/lxc_contexts"),
            "process = \"system_u:system_r:container_t:s0\"\n",
        );
        assert!(matches!(
            result,
            Err(SpecError::MalformedLabelContexts { .. })
        ));
    }

    #[test]
    fn test_mcs_pair_is_distinct_and_bounded() {
        for _ in 0..64 {
            let (c1, c2) = mcs_pair();
            assert_ne!(c1, c2);
            assert!(c1 < MCS_CATEGORIES);
            assert!(c2 < MCS_CATEGORIES);
            assert!(c1 < c2);
        }
    }

    #[test]
    fn test_with_level_replaces_existing_level() {
        let labeled = with_level("system_u:system_r:container_t:s0", 1, 2);
        assert_eq!(labeled, "system_u:system_r:container_t:s0:c1,c2");
    }
}

//! User-namespace identity mapping.

use crate::assembly::SpecMutator;
use crate::spec::{LinuxIdMapping, LinuxNamespace, NamespaceType};

/// One user or group ID range mapped into the step's user namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMap {
    pub host_id: u32,
    pub container_id: u32,
    pub count: u32,
}

/// The UID and GID ranges for a remapped step. Absent mapping means no user
/// namespace at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMapping {
    pub uid_maps: Vec<IdMap>,
    pub gid_maps: Vec<IdMap>,
}

/// Mutators installing the identity mapping, if one was requested.
///
/// Ranges are passed through untouched: overlapping or malformed ranges are
/// a caller contract violation the runtime surfaces at launch, not here.
pub fn idmap_mutators(idmap: Option<&IdentityMapping>) -> Vec<SpecMutator> {
    let Some(idmap) = idmap else {
        return Vec::new();
    };
    let uid_mappings = spec_mappings(&idmap.uid_maps);
    let gid_mappings = spec_mappings(&idmap.gid_maps);
    vec![Box::new(move |spec| {
        if !spec.has_namespace(NamespaceType::User) {
            spec.linux
                .namespaces
                .push(LinuxNamespace::new(NamespaceType::User));
        }
        spec.linux.uid_mappings = uid_mappings;
        spec.linux.gid_mappings = gid_mappings;
        Ok(())
    })]
}

fn spec_mappings(maps: &[IdMap]) -> Vec<LinuxIdMapping> {
    maps.iter()
        .map(|m| LinuxIdMapping {
            host_id: m.host_id,
            container_id: m.container_id,
            size: m.count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RuntimeSpec;

    #[test]
    fn test_absent_mapping_yields_no_mutators() {
        assert!(idmap_mutators(None).is_empty());
    }

    #[test]
    fn test_mapping_installs_user_namespace_and_ranges() {
        let idmap = IdentityMapping {
            uid_maps: vec![IdMap {
                host_id: 100_000,
                container_id: 0,
                count: 65_536,
            }],
            gid_maps: vec![
                IdMap {
                    host_id: 100_000,
                    container_id: 0,
                    count: 1,
                },
                IdMap {
                    host_id: 100_001,
                    container_id: 1,
                    count: 65_535,
                },
            ],
        };

        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        for mutate in idmap_mutators(Some(&idmap)) {
            mutate(&mut spec).expect("idmap mutator");
        }

        assert!(spec.has_namespace(NamespaceType::User));
        assert_eq!(spec.linux.uid_mappings.len(), 1);
        assert_eq!(spec.linux.uid_mappings[0].host_id, 100_000);
        assert_eq!(spec.linux.uid_mappings[0].container_id, 0);
        assert_eq!(spec.linux.uid_mappings[0].size, 65_536);
        assert_eq!(spec.linux.gid_mappings.len(), 2);
    }

    #[test]
    fn test_mapping_does_not_duplicate_user_namespace() {
        let idmap = IdentityMapping::default();
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        spec.linux
            .namespaces
            .push(LinuxNamespace::new(NamespaceType::User));

        for mutate in idmap_mutators(Some(&idmap)) {
            mutate(&mut spec).expect("idmap mutator");
        }

        let user_namespaces = spec
            .linux
            .namespaces
            .iter()
            .filter(|ns| ns.ns_type == NamespaceType::User)
            .count();
        assert_eq!(user_namespaces, 1);
    }
}

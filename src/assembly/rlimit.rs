//! Process resource limits.

use crate::assembly::SpecMutator;
use crate::spec::PosixRlimit;

/// One requested resource limit. The name is the bare limit name
/// ("nofile", "nproc"); translation adds the host's `RLIMIT_` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    pub name: String,
    pub soft: u64,
    pub hard: u64,
}

/// Mutators translating ulimit requests into process resource limits.
///
/// An empty input is an explicit no-op: `process.rlimits` stays `None`
/// rather than becoming an empty-but-present list, because the runtime
/// launcher treats absent and empty differently. Nil placeholders inside a
/// non-empty list are skipped.
pub fn rlimit_mutators(ulimits: &[Option<Ulimit>]) -> Vec<SpecMutator> {
    if ulimits.is_empty() {
        return Vec::new();
    }
    let rlimits: Vec<PosixRlimit> = ulimits
        .iter()
        .flatten()
        .map(|u| PosixRlimit {
            rlim_type: format!("RLIMIT_{}", u.name.to_uppercase()),
            hard: u.hard,
            soft: u.soft,
        })
        .collect();
    vec![Box::new(move |spec| {
        spec.process.rlimits = if rlimits.is_empty() {
            None
        } else {
            Some(rlimits)
        };
        Ok(())
    })]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::RuntimeSpec;

    #[test]
    fn test_empty_input_yields_no_mutators() {
        assert!(rlimit_mutators(&[]).is_empty());
    }

    #[test]
    fn test_empty_input_leaves_rlimits_absent() {
        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        for mutate in rlimit_mutators(&[]) {
            mutate(&mut spec).expect("rlimit mutator");
        }
        assert!(spec.process.rlimits.is_none());
    }

    #[test]
    fn test_nil_entries_are_skipped() {
        let ulimits = vec![
            None,
            Some(Ulimit {
                name: "nofile".to_string(),
                soft: 1024,
                hard: 4096,
            }),
        ];

        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        for mutate in rlimit_mutators(&ulimits) {
            mutate(&mut spec).expect("rlimit mutator");
        }

        let rlimits = spec.process.rlimits.expect("rlimits present");
        assert_eq!(rlimits.len(), 1);
        assert_eq!(
            rlimits[0],
            PosixRlimit {
                rlim_type: "RLIMIT_NOFILE".to_string(),
                hard: 4096,
                soft: 1024,
            }
        );
    }

    #[test]
    fn test_all_nil_entries_leave_rlimits_absent() {
        let ulimits: Vec<Option<Ulimit>> = vec![None, None];

        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        let mutators = rlimit_mutators(&ulimits);
        assert_eq!(mutators.len(), 1);
        for mutate in mutators {
            mutate(&mut spec).expect("rlimit mutator");
        }
        assert!(spec.process.rlimits.is_none());
    }

    #[test]
    fn test_limit_names_are_upper_cased() {
        let ulimits = vec![Some(Ulimit {
            name: "memlock".to_string(),
            soft: 8192,
            hard: 8192,
        })];

        let mut spec = RuntimeSpec::for_step(["/bin/true"]);
        for mutate in rlimit_mutators(&ulimits) {
            mutate(&mut spec).expect("rlimit mutator");
        }

        let rlimits = spec.process.rlimits.expect("rlimits present");
        assert_eq!(rlimits[0].rlim_type, "RLIMIT_MEMLOCK");
    }
}

//! Merge logic for coverage datasets
//!
//! Folds freshly retrieved data into what is already stored. Probe vectors of
//! units present on both sides are OR-ed, new units and sessions are added.
//! OR is idempotent and keys are unique, so merging the same data twice gives
//! the same result as merging it once.

use crate::error::MergeError;
use covfetch_shared::types::coverage::{CoverageDataset, UnitInsert};
use serde::Serialize;

/// What a merge changed in the base dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Units that were not present before
    pub units_added: usize,
    /// Units OR-ed into an existing record
    pub units_merged: usize,
    /// Session ids that were not present before
    pub sessions_added: usize,
}

impl MergeSummary {
    fn absorb(&mut self, other: MergeSummary) {
        self.units_added += other.units_added;
        self.units_merged += other.units_merged;
        self.sessions_added += other.sessions_added;
    }
}

/// Merge `fresh` into `base`.
///
/// Every unit of `fresh` is checked against `base` before anything is
/// changed, so on a conflict `base` is left untouched.
pub fn merge_into(
    base: &mut CoverageDataset,
    fresh: &CoverageDataset,
) -> Result<MergeSummary, MergeError> {
    for unit in fresh.units() {
        if let Some(existing) = base.unit(unit.id) {
            existing.check_compatible(unit)?;
        }
    }

    let mut summary = MergeSummary::default();
    for unit in fresh.units() {
        match base.add_unit(unit.clone())? {
            UnitInsert::Added => summary.units_added += 1,
            UnitInsert::Merged => summary.units_merged += 1,
        }
    }
    for session in fresh.sessions() {
        if base.add_session(session.clone()) {
            summary.sessions_added += 1;
        }
    }
    Ok(summary)
}

/// Merge `fresh` into a copy of `base`
pub fn merge(
    base: &CoverageDataset,
    fresh: &CoverageDataset,
) -> Result<(CoverageDataset, MergeSummary), MergeError> {
    let mut merged = base.clone();
    let summary = merge_into(&mut merged, fresh)?;
    Ok((merged, summary))
}

/// Merge several datasets, in order, into one
pub fn merge_all<'a, I>(datasets: I) -> Result<(CoverageDataset, MergeSummary), MergeError>
where
    I: IntoIterator<Item = &'a CoverageDataset>,
{
    let mut merged = CoverageDataset::new();
    let mut summary = MergeSummary::default();
    for dataset in datasets {
        summary.absorb(merge_into(&mut merged, dataset)?);
    }
    Ok((merged, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use covfetch_shared::types::coverage::{SessionInfo, UnitRecord};

    fn dataset(units: &[(u64, &str, &[bool])], sessions: &[(&str, u64, u64)]) -> CoverageDataset {
        let mut d = CoverageDataset::new();
        for (id, name, probes) in units {
            d.add_unit(UnitRecord::new(*id, *name, probes.to_vec())).unwrap();
        }
        for (id, start, dump) in sessions {
            d.add_session(SessionInfo::new(*id, *start, *dump));
        }
        d
    }

    #[test]
    fn test_merge_into_empty() {
        let fresh = dataset(&[(1, "A", &[true, false])], &[("s1", 10, 20)]);
        let (merged, summary) = merge(&CoverageDataset::new(), &fresh).unwrap();
        assert_eq!(merged, fresh);
        assert_eq!(
            summary,
            MergeSummary {
                units_added: 1,
                units_merged: 0,
                sessions_added: 1
            }
        );
    }

    #[test]
    fn test_merge_ors_shared_units() {
        let base = dataset(&[(1, "A", &[true, false, false]), (2, "B", &[false])], &[]);
        let fresh = dataset(&[(1, "A", &[false, false, true]), (3, "C", &[true])], &[]);
        let (merged, summary) = merge(&base, &fresh).unwrap();

        assert_eq!(merged.unit(1).unwrap().probes, vec![true, false, true]);
        assert_eq!(merged.unit(2).unwrap().probes, vec![false]);
        assert_eq!(merged.unit(3).unwrap().probes, vec![true]);
        assert_eq!(summary.units_added, 1);
        assert_eq!(summary.units_merged, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = dataset(&[(1, "A", &[true, false])], &[("s0", 1, 2)]);
        let fresh = dataset(
            &[(1, "A", &[false, true]), (2, "B", &[true, true, false])],
            &[("s1", 5, 9)],
        );
        let (once, _) = merge(&base, &fresh).unwrap();
        let (twice, summary) = merge(&once, &fresh).unwrap();
        assert_eq!(once, twice);
        assert_eq!(summary.units_added, 0);
        assert_eq!(summary.sessions_added, 0);
    }

    #[test]
    fn test_merge_is_commutative_for_one_build() {
        let d1 = dataset(
            &[(1, "A", &[true, false, false]), (2, "B", &[false, true])],
            &[("s1", 10, 20)],
        );
        let d2 = dataset(
            &[(1, "A", &[false, false, true]), (3, "C", &[true])],
            &[("s2", 15, 30), ("s1", 5, 12)],
        );
        let empty = CoverageDataset::new();

        let (a, _) = merge(&merge(&empty, &d1).unwrap().0, &d2).unwrap();
        let (b, _) = merge(&merge(&empty, &d2).unwrap().0, &d1).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.sessions().find(|s| s.id == "s1").unwrap(),
            &SessionInfo::new("s1", 5, 20)
        );
    }

    #[test]
    fn test_merge_with_self_keeps_probes() {
        let d = dataset(&[(1, "A", &[true, false, true])], &[("s", 1, 2)]);
        let (merged, _) = merge(&d, &d).unwrap();
        assert_eq!(merged, d);
    }

    #[test]
    fn test_probe_count_conflict_leaves_base_untouched() {
        let base = dataset(&[(1, "A", &[true, false]), (2, "B", &[false])], &[]);
        let mut target = base.clone();
        let fresh = dataset(&[(2, "B", &[true]), (1, "A", &[true, false, true])], &[]);

        let err = merge_into(&mut target, &fresh).unwrap_err();
        assert!(matches!(
            err,
            MergeError::ProbeCountConflict {
                id: 1,
                existing: 2,
                incoming: 3
            }
        ));
        assert_eq!(target, base);
    }

    #[test]
    fn test_name_conflict() {
        let base = dataset(&[(1, "A", &[true])], &[]);
        let fresh = dataset(&[(1, "Z", &[true])], &[]);
        assert!(matches!(
            merge(&base, &fresh),
            Err(MergeError::NameConflict { id: 1, .. })
        ));
    }

    #[test]
    fn test_merge_all() {
        let d1 = dataset(&[(1, "A", &[true, false])], &[("h1", 1, 2)]);
        let d2 = dataset(&[(1, "A", &[false, true])], &[("h2", 3, 4)]);
        let d3 = dataset(&[(2, "B", &[true])], &[]);
        let (merged, summary) = merge_all([&d1, &d2, &d3]).unwrap();
        assert_eq!(merged.unit_count(), 2);
        assert_eq!(merged.unit(1).unwrap().probes, vec![true, true]);
        assert_eq!(merged.session_count(), 2);
        assert_eq!(summary.units_added, 2);
        assert_eq!(summary.units_merged, 1);
        assert_eq!(summary.sessions_added, 2);
    }
}

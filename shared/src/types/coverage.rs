//! Coverage data structures
//!
//! These types represent what a coverage agent reports: the recording
//! sessions it observed and one probe vector per instrumented unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agent-assigned unit (class) identifier
pub type UnitId = u64;

/// One recording session of a remote agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier chosen by the agent
    pub id: String,

    /// Session start, milliseconds since UNIX epoch
    pub start_millis: u64,

    /// Time of the dump that closed the session, milliseconds since UNIX epoch
    pub dump_millis: u64,
}

impl SessionInfo {
    /// Create a new session record
    pub fn new(id: impl Into<String>, start_millis: u64, dump_millis: u64) -> Self {
        Self {
            id: id.into(),
            start_millis,
            dump_millis,
        }
    }

    /// Length of the recorded window in milliseconds
    pub fn duration_millis(&self) -> u64 {
        self.dump_millis.saturating_sub(self.start_millis)
    }

    fn widen(&mut self, other: &SessionInfo) {
        self.start_millis = self.start_millis.min(other.start_millis);
        self.dump_millis = self.dump_millis.max(other.dump_millis);
    }
}

/// Probe hits for one measured unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unit identifier
    pub id: UnitId,

    /// Fully-qualified unit name
    pub name: String,

    /// One entry per instrumented execution point
    pub probes: Vec<bool>,
}

impl UnitRecord {
    /// Create a new unit record
    pub fn new(id: UnitId, name: impl Into<String>, probes: Vec<bool>) -> Self {
        Self {
            id,
            name: name.into(),
            probes,
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Number of probes that were hit
    pub fn covered_count(&self) -> usize {
        self.probes.iter().filter(|&&hit| hit).count()
    }

    /// Check if any probe of the unit was hit
    pub fn is_covered(&self) -> bool {
        self.probes.iter().any(|&hit| hit)
    }

    /// OR the probes of `other` into this record.
    ///
    /// Both records must describe the same unit: same name and same probe
    /// count. On conflict the record is left unchanged.
    pub fn merge(&mut self, other: &UnitRecord) -> Result<(), UnitConflict> {
        self.check_compatible(other)?;
        for (hit, other_hit) in self.probes.iter_mut().zip(&other.probes) {
            *hit |= *other_hit;
        }
        Ok(())
    }

    /// Check that `other` can be merged into this record
    pub fn check_compatible(&self, other: &UnitRecord) -> Result<(), UnitConflict> {
        if self.name != other.name {
            return Err(UnitConflict::Name {
                id: self.id,
                existing: self.name.clone(),
                incoming: other.name.clone(),
            });
        }
        if self.probes.len() != other.probes.len() {
            return Err(UnitConflict::ProbeCount {
                id: self.id,
                existing: self.probes.len(),
                incoming: other.probes.len(),
            });
        }
        Ok(())
    }
}

/// Two records with the same identifier that cannot be combined
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitConflict {
    #[error("unit {id:#x} has {existing} probes but {incoming} were reported")]
    ProbeCount {
        id: UnitId,
        existing: usize,
        incoming: usize,
    },

    #[error("unit {id:#x} is named {existing:?} but {incoming:?} was reported")]
    Name {
        id: UnitId,
        existing: String,
        incoming: String,
    },
}

/// How a unit was folded into a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitInsert {
    /// First record with this identifier
    Added,
    /// Combined with an existing record by elementwise OR
    Merged,
}

/// Sessions and unit records gathered from one or more dumps.
///
/// Units are unique by identifier and sessions unique by session id. Both are
/// kept in key order, so two datasets with the same content compare equal
/// whatever order their records arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageDataset {
    sessions: BTreeMap<String, SessionInfo>,
    units: BTreeMap<UnitId, UnitRecord>,
}

impl CoverageDataset {
    /// Create a new empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. A session id seen before widens the existing time
    /// range instead of adding a second record.
    ///
    /// Returns `true` if the session id was new.
    pub fn add_session(&mut self, session: SessionInfo) -> bool {
        match self.sessions.get_mut(&session.id) {
            Some(existing) => {
                existing.widen(&session);
                false
            }
            None => {
                self.sessions.insert(session.id.clone(), session);
                true
            }
        }
    }

    /// Add a unit record, OR-ing it into an existing record with the same id.
    pub fn add_unit(&mut self, unit: UnitRecord) -> Result<UnitInsert, UnitConflict> {
        match self.units.get_mut(&unit.id) {
            Some(existing) => {
                existing.merge(&unit)?;
                Ok(UnitInsert::Merged)
            }
            None => {
                self.units.insert(unit.id, unit);
                Ok(UnitInsert::Added)
            }
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionInfo> {
        self.sessions.values()
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    /// Look up a unit by id
    pub fn unit(&self, id: UnitId) -> Option<&UnitRecord> {
        self.units.get(&id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the dataset holds neither sessions nor units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.sessions.is_empty()
    }

    /// Total number of probes across all units
    pub fn total_probes(&self) -> usize {
        self.units.values().map(UnitRecord::probe_count).sum()
    }

    /// Number of probes hit across all units
    pub fn covered_probes(&self) -> usize {
        self.units.values().map(UnitRecord::covered_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_merge_ors_probes() {
        let mut unit = UnitRecord::new(7, "com/acme/Foo", vec![true, false, false]);
        let other = UnitRecord::new(7, "com/acme/Foo", vec![false, false, true]);
        unit.merge(&other).unwrap();
        assert_eq!(unit.probes, vec![true, false, true]);
        assert_eq!(unit.covered_count(), 2);
    }

    #[test]
    fn test_unit_merge_with_self_is_identity() {
        let mut unit = UnitRecord::new(1, "A", vec![true, false, true, false]);
        let copy = unit.clone();
        unit.merge(&copy).unwrap();
        assert_eq!(unit, copy);
    }

    #[test]
    fn test_unit_merge_probe_count_conflict() {
        let mut unit = UnitRecord::new(3, "A", vec![true, false]);
        let other = UnitRecord::new(3, "A", vec![true, false, true]);
        let err = unit.merge(&other).unwrap_err();
        assert_eq!(
            err,
            UnitConflict::ProbeCount {
                id: 3,
                existing: 2,
                incoming: 3
            }
        );
        assert_eq!(unit.probes, vec![true, false]);
    }

    #[test]
    fn test_unit_merge_name_conflict() {
        let mut unit = UnitRecord::new(3, "A", vec![true]);
        let other = UnitRecord::new(3, "B", vec![true]);
        assert!(matches!(
            unit.merge(&other),
            Err(UnitConflict::Name { id: 3, .. })
        ));
    }

    #[test]
    fn test_dataset_duplicate_units_are_ored() {
        let mut dataset = CoverageDataset::new();
        assert_eq!(
            dataset
                .add_unit(UnitRecord::new(10, "A", vec![true, false]))
                .unwrap(),
            UnitInsert::Added
        );
        assert_eq!(
            dataset
                .add_unit(UnitRecord::new(10, "A", vec![false, true]))
                .unwrap(),
            UnitInsert::Merged
        );
        assert_eq!(dataset.unit_count(), 1);
        assert_eq!(dataset.unit(10).unwrap().probes, vec![true, true]);
    }

    #[test]
    fn test_dataset_sessions_unioned_by_id() {
        let mut dataset = CoverageDataset::new();
        assert!(dataset.add_session(SessionInfo::new("host-1", 100, 200)));
        assert!(dataset.add_session(SessionInfo::new("host-2", 150, 250)));
        assert!(!dataset.add_session(SessionInfo::new("host-1", 50, 180)));

        let sessions: Vec<_> = dataset.sessions().collect();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0], &SessionInfo::new("host-1", 50, 200));
        assert_eq!(sessions[0].duration_millis(), 150);
    }

    #[test]
    fn test_dataset_equality_ignores_arrival_order() {
        let mut a = CoverageDataset::new();
        a.add_unit(UnitRecord::new(1, "A", vec![true])).unwrap();
        a.add_unit(UnitRecord::new(2, "B", vec![false])).unwrap();
        a.add_session(SessionInfo::new("s1", 1, 2));
        a.add_session(SessionInfo::new("s2", 3, 4));

        let mut b = CoverageDataset::new();
        b.add_session(SessionInfo::new("s2", 3, 4));
        b.add_unit(UnitRecord::new(2, "B", vec![false])).unwrap();
        b.add_session(SessionInfo::new("s1", 1, 2));
        b.add_unit(UnitRecord::new(1, "A", vec![true])).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_dataset_probe_totals() {
        let mut dataset = CoverageDataset::new();
        assert!(dataset.is_empty());
        dataset
            .add_unit(UnitRecord::new(1, "A", vec![true, false, true]))
            .unwrap();
        dataset
            .add_unit(UnitRecord::new(2, "B", vec![false, false]))
            .unwrap();
        assert_eq!(dataset.total_probes(), 5);
        assert_eq!(dataset.covered_probes(), 2);
        assert!(dataset.unit(1).unwrap().is_covered());
        assert!(!dataset.unit(2).unwrap().is_covered());
    }

    #[test]
    fn test_session_serializes_to_json() {
        let session = SessionInfo::new("ci-42", 1_000, 2_000);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"id\":\"ci-42\""));
        let back: SessionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}

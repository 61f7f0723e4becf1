//! Test records
//!
//! A [`TestRecord`] is an accepted, persisted test tied to the unit
//! fingerprint it was validated against. Records are flagged stale when
//! their unit's fingerprint moves on; they are never silently deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use testgen_unit::{Fingerprint, UnitId};

/// An accepted, persisted test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Owning unit identity
    pub unit_id: UnitId,
    /// Unit fingerprint at acceptance time
    pub fingerprint: Fingerprint,
    /// Accepted test source text
    pub source: String,
    /// Where the test was written (relative path)
    pub location: String,
    /// Quality score at acceptance, on a 10-point scale
    pub score: f64,
    /// Acceptance timestamp
    pub accepted_at: DateTime<Utc>,
    /// Whether the owning unit's fingerprint has since changed
    pub stale: bool,
}

impl TestRecord {
    /// Create a fresh (non-stale) record accepted now
    #[must_use]
    pub fn new(
        unit_id: UnitId,
        fingerprint: Fingerprint,
        source: impl Into<String>,
        location: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            unit_id,
            fingerprint,
            source: source.into(),
            location: location.into(),
            score,
            accepted_at: Utc::now(),
            stale: false,
        }
    }

    /// Flag the record stale
    #[inline]
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }
}

/// Stored association for one unit: last-known fingerprint plus the test
/// records generated for it.
///
/// Commits replace the whole entry atomically; there is never a stored
/// fingerprint without its record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Unit identity
    pub unit_id: UnitId,
    /// Last committed fingerprint
    pub fingerprint: Fingerprint,
    /// Test records accepted for that fingerprint
    pub records: Vec<TestRecord>,
}

impl StoredEntry {
    /// Create an entry
    #[inline]
    #[must_use]
    pub fn new(unit_id: UnitId, fingerprint: Fingerprint, records: Vec<TestRecord>) -> Self {
        Self {
            unit_id,
            fingerprint,
            records,
        }
    }

    /// Whether every record in the entry is stale
    #[inline]
    #[must_use]
    pub fn all_stale(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.stale)
    }

    /// Active (non-stale) records
    pub fn active_records(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|r| !r.stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stale: bool) -> TestRecord {
        let mut r = TestRecord::new(
            UnitId::new("src/calc.py", "add"),
            Fingerprint::compute(b"def add"),
            "def test_add():\n    assert add(2, 3) == 5\n",
            "tests/test_calc.py",
            8.0,
        );
        if stale {
            r.mark_stale();
        }
        r
    }

    #[test]
    fn new_record_is_fresh() {
        let r = record(false);
        assert!(!r.stale);
        assert_eq!(r.score, 8.0);
    }

    #[test]
    fn mark_stale_flags_without_deleting() {
        let mut r = record(false);
        r.mark_stale();
        assert!(r.stale);
        assert!(!r.source.is_empty());
    }

    #[test]
    fn entry_all_stale() {
        let id = UnitId::new("src/calc.py", "add");
        let fp = Fingerprint::compute(b"x");
        let entry = StoredEntry::new(id.clone(), fp, vec![record(true), record(true)]);
        assert!(entry.all_stale());

        let entry = StoredEntry::new(id.clone(), fp, vec![record(true), record(false)]);
        assert!(!entry.all_stale());
        assert_eq!(entry.active_records().count(), 1);

        let empty = StoredEntry::new(id, fp, vec![]);
        assert!(!empty.all_stale());
    }

    #[test]
    fn record_serde_round_trip() {
        let r = record(false);
        let json = serde_json::to_string(&r).unwrap();
        let decoded: TestRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, decoded);
    }
}

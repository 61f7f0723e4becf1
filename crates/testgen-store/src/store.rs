//! Persistent fingerprint store
//!
//! Maps unit identity to its last-known fingerprint and the test records
//! generated for it. One JSON file per identity under the store
//! directory; commits write a temp file and rename it into place, so a
//! reader never observes a fingerprint without its record set. Commits
//! for the same identity serialize on a per-identity mutex; distinct
//! identities never contend.

use crate::error::StoreError;
use crate::record::{StoredEntry, TestRecord};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testgen_unit::{Fingerprint, UnitId};
use tokio::sync::Mutex;

/// Persistent mapping from unit identity to fingerprint + test records
#[derive(Debug)]
pub struct FingerprintStore {
    dir: PathBuf,
    entries: DashMap<UnitId, StoredEntry>,
    // Per-identity commit locks; the only serialization point in the engine
    locks: DashMap<UnitId, Arc<Mutex<()>>>,
}

impl FingerprintStore {
    /// Open a store at `dir`, creating it if absent and loading all
    /// persisted entries.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or read, or if a
    /// persisted entry fails to decode (a corrupt store is fatal).
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let entries = DashMap::new();
        let listing = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for item in listing {
            let item = item.map_err(|e| StoreError::io(&dir, e))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                // Leftover temp files from an interrupted commit are ignored
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
            let entry: StoredEntry =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            entries.insert(entry.unit_id.clone(), entry);
        }
        tracing::debug!(dir = %dir.display(), entries = entries.len(), "opened fingerprint store");

        Ok(Self {
            dir,
            entries,
            locks: DashMap::new(),
        })
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up the last-known entry for a unit
    #[inline]
    #[must_use]
    pub fn lookup(&self, unit_id: &UnitId) -> Option<StoredEntry> {
        self.entries.get(unit_id).map(|e| e.clone())
    }

    /// All stored unit identities
    #[must_use]
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of stored entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically replace the stored association for one unit
    ///
    /// All-or-nothing per unit: the entry lands on disk via temp file +
    /// rename before the in-memory index is updated. Same-identity
    /// commits serialize; last committer wins.
    ///
    /// # Errors
    /// Returns error on serialization or filesystem failure.
    pub async fn commit(
        &self,
        unit_id: UnitId,
        fingerprint: Fingerprint,
        records: Vec<TestRecord>,
    ) -> Result<(), StoreError> {
        let lock = self.identity_lock(&unit_id);
        let _guard = lock.lock().await;

        let entry = StoredEntry::new(unit_id.clone(), fingerprint, records);
        self.persist(&entry)?;
        self.entries.insert(unit_id, entry);
        Ok(())
    }

    /// Flag every record of a unit stale, keeping the stored fingerprint
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownUnit`] if the unit has no entry.
    pub async fn mark_stale(&self, unit_id: &UnitId) -> Result<(), StoreError> {
        let lock = self.identity_lock(unit_id);
        let _guard = lock.lock().await;

        let mut entry = self
            .entries
            .get(unit_id)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::UnknownUnit(unit_id.canonical()))?;
        for record in &mut entry.records {
            record.mark_stale();
        }
        self.persist(&entry)?;
        self.entries.insert(unit_id.clone(), entry);
        tracing::info!(unit = %unit_id, "marked records stale");
        Ok(())
    }

    /// Remove a unit's entry entirely
    ///
    /// Pruning is explicit and caller-confirmed; the engine never calls
    /// this on its own.
    ///
    /// # Errors
    /// Returns error if the entry file cannot be removed.
    pub async fn prune(&self, unit_id: &UnitId) -> Result<Option<StoredEntry>, StoreError> {
        let lock = self.identity_lock(unit_id);
        let _guard = lock.lock().await;

        let path = self.entry_path(unit_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        let removed = self.entries.remove(unit_id).map(|(_, e)| e);
        if removed.is_some() {
            tracing::info!(unit = %unit_id, "pruned entry");
        }
        Ok(removed)
    }

    fn identity_lock(&self, unit_id: &UnitId) -> Arc<Mutex<()>> {
        self.locks
            .entry(unit_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn entry_path(&self, unit_id: &UnitId) -> PathBuf {
        let name = Fingerprint::compute(unit_id.canonical().as_bytes());
        self.dir.join(format!("{name}.json"))
    }

    fn persist(&self, entry: &StoredEntry) -> Result<(), StoreError> {
        let path = self.entry_path(&entry.unit_id);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(entry)?;
        fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_record(id: &UnitId, fp: Fingerprint) -> TestRecord {
        TestRecord::new(
            id.clone(),
            fp,
            "def test_add():\n    assert add(2, 3) == 5\n",
            "tests/test_calc.py",
            8.0,
        )
    }

    #[tokio::test]
    async fn commit_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();

        let id = UnitId::new("src/calc.py", "add");
        let fp = Fingerprint::compute(b"add body");
        store
            .commit(id.clone(), fp, vec![test_record(&id, fp)])
            .await
            .unwrap();

        let entry = store.lookup(&id).unwrap();
        assert_eq!(entry.fingerprint, fp);
        assert_eq!(entry.records.len(), 1);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = UnitId::new("src/calc.py", "add");
        let fp = Fingerprint::compute(b"add body");

        {
            let store = FingerprintStore::open(dir.path()).unwrap();
            store
                .commit(id.clone(), fp, vec![test_record(&id, fp)])
                .await
                .unwrap();
        }

        let reopened = FingerprintStore::open(dir.path()).unwrap();
        let entry = reopened.lookup(&id).unwrap();
        assert_eq!(entry.fingerprint, fp);
        assert_eq!(entry.records[0].score, 8.0);
    }

    #[tokio::test]
    async fn last_committer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();

        let id = UnitId::new("src/calc.py", "add");
        let fp1 = Fingerprint::compute(b"v1");
        let fp2 = Fingerprint::compute(b"v2");
        store.commit(id.clone(), fp1, vec![]).await.unwrap();
        store.commit(id.clone(), fp2, vec![]).await.unwrap();

        assert_eq!(store.lookup(&id).unwrap().fingerprint, fp2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn mark_stale_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();

        let id = UnitId::new("src/calc.py", "add");
        let fp = Fingerprint::compute(b"add body");
        store
            .commit(id.clone(), fp, vec![test_record(&id, fp)])
            .await
            .unwrap();

        store.mark_stale(&id).await.unwrap();
        let entry = store.lookup(&id).unwrap();
        assert!(entry.all_stale());
        assert_eq!(entry.records.len(), 1);
    }

    #[tokio::test]
    async fn mark_stale_unknown_unit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();

        let id = UnitId::new("src/calc.py", "ghost");
        let result = store.mark_stale(&id).await;
        assert!(matches!(result, Err(StoreError::UnknownUnit(_))));
    }

    #[tokio::test]
    async fn prune_removes_entry_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();

        let id = UnitId::new("src/calc.py", "add");
        let fp = Fingerprint::compute(b"add body");
        store.commit(id.clone(), fp, vec![]).await.unwrap();

        let removed = store.prune(&id).await.unwrap();
        assert!(removed.is_some());
        assert!(store.lookup(&id).is_none());

        // Nothing left on disk for the identity
        let reopened = FingerprintStore::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn concurrent_commits_different_identities() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = UnitId::new("src/calc.py", format!("f{i}"));
                let fp = Fingerprint::compute(format!("body {i}").as_bytes());
                store.commit(id, fp, vec![]).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn concurrent_commits_same_identity_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());
        let id = UnitId::new("src/calc.py", "add");

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let fp = Fingerprint::compute(&i.to_le_bytes());
                store.commit(id, fp, vec![]).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // One winner, and the on-disk copy agrees with the index
        let entry = store.lookup(&id).unwrap();
        let reopened = FingerprintStore::open(dir.path()).unwrap();
        assert_eq!(reopened.lookup(&id).unwrap().fingerprint, entry.fingerprint);
    }

    #[test]
    fn corrupt_entry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), b"not json").unwrap();
        let result = FingerprintStore::open(dir.path());
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn leftover_tmp_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("orphan.tmp"), b"partial write").unwrap();
        let store = FingerprintStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
    }
}

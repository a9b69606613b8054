//! Record storage: mmap-backed vectors, in-memory payloads, WAL + snapshot
//! durability.
//!
//! The store owns records exclusively. The index only ever sees id + vector;
//! payloads never leave this module except through [`VectorStore::get`] and
//! iteration.
//!
//! # Module Organization
//!
//! - `arena`: mmap-backed vector slots with free-list reuse
//! - `wal`: CRC-protected write-ahead log of upserts and deletes
//! - `snapshot`: full-state snapshots keyed to a WAL position
//!
//! # Recovery Path
//!
//! `VectorStore::open` → `snapshot::load_snapshot` (if present) →
//! `RecordWal::replay` from the snapshot's WAL position. Acknowledged writes
//! survive a crash; a torn WAL tail is dropped at the tear.

mod arena;
mod snapshot;
pub(crate) mod wal;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::point::Point;

use arena::{MmapVectorArena, SlotId};
use wal::{RecordWal, WalOp};

/// In-memory view of one record: where its vector lives plus its payload.
struct StoredRecord {
    slot: SlotId,
    payload: Option<serde_json::Value>,
}

/// Thread-safe record store with WAL + snapshot durability.
///
/// Reads run concurrently; writes to the same id are serialized by the
/// records lock and applied in submission order.
pub struct VectorStore {
    dir: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
    records: RwLock<FxHashMap<u64, StoredRecord>>,
    arena: MmapVectorArena,
    wal: RecordWal,
    /// WAL position captured by the last snapshot.
    last_snapshot_wal_pos: AtomicU64,
    snapshot_threshold: u64,
}

impl VectorStore {
    /// Opens the store in `dir`, recovering state from snapshot + WAL.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on corrupted persistent state, or when the
    /// directory was created with a different dimension or metric.
    pub fn open(
        dir: impl AsRef<Path>,
        dimension: usize,
        metric: DistanceMetric,
        snapshot_threshold: u64,
        sync_writes: bool,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let arena = MmapVectorArena::open(&dir, dimension)?;
        let wal = RecordWal::open(&dir, sync_writes)?;

        let mut records: FxHashMap<u64, StoredRecord> = FxHashMap::default();
        let mut insert = |point: Point, records: &mut FxHashMap<u64, StoredRecord>| -> Result<()> {
            let slot = arena.store(&point.vector)?;
            if let Some(old) = records.insert(
                point.id,
                StoredRecord {
                    slot,
                    payload: point.payload,
                },
            ) {
                arena.release(old.slot);
            }
            Ok(())
        };

        let snapshot_wal_pos = match snapshot::load_snapshot(&dir, dimension, metric)? {
            Some(loaded) => {
                for point in loaded.records {
                    insert(point, &mut records)?;
                }
                loaded.wal_pos
            }
            None => 0,
        };

        let mut replay_error = None;
        wal.replay(snapshot_wal_pos, dimension, |op| {
            if replay_error.is_some() {
                return;
            }
            match op {
                WalOp::Upsert(point) => {
                    if let Err(e) = insert(point, &mut records) {
                        replay_error = Some(e);
                    }
                }
                WalOp::Delete(id) => {
                    if let Some(old) = records.remove(&id) {
                        arena.release(old.slot);
                    }
                }
            }
        })?;
        if let Some(e) = replay_error {
            return Err(e);
        }

        tracing::info!(
            records = records.len(),
            dimension,
            %metric,
            "vector store recovered"
        );

        Ok(Self {
            dir,
            dimension,
            metric,
            records: RwLock::new(records),
            arena,
            wal,
            last_snapshot_wal_pos: AtomicU64::new(snapshot_wal_pos),
            snapshot_threshold,
        })
    }

    /// Vector dimension this store was created with.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when no live records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Inserts or replaces a record.
    ///
    /// Re-inserting an existing id replaces it atomically: there is one
    /// logical record per id, never two.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when the vector length differs from the store's
    /// dimension; the store is left untouched.
    pub fn put(&self, point: Point) -> Result<()> {
        if point.vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: point.vector.len(),
            });
        }

        let mut records = self.records.write();
        self.wal.append_upsert(&point)?;
        let slot = self.arena.store(&point.vector)?;
        let old = records.insert(
            point.id,
            StoredRecord {
                slot,
                payload: point.payload,
            },
        );
        drop(records);

        if let Some(old) = old {
            self.arena.release(old.slot);
        }
        Ok(())
    }

    /// Returns the record for `id`, if it exists.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Point> {
        let records = self.records.read();
        let record = records.get(&id)?;
        let vector = self.arena.load(record.slot);
        Some(Point::new(id, vector, record.payload.clone()))
    }

    /// True when a live record with `id` exists.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.records.read().contains_key(&id)
    }

    /// Deletes the record for `id`. Returns whether it existed.
    pub fn delete(&self, id: u64) -> Result<bool> {
        let mut records = self.records.write();
        if !records.contains_key(&id) {
            return Ok(false);
        }
        self.wal.append_delete(id)?;
        let old = records.remove(&id).expect("checked above");
        drop(records);

        self.arena.release(old.slot);
        Ok(true)
    }

    /// Ids of all live records.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.records.read().keys().copied().collect()
    }

    /// Iterates over live records.
    ///
    /// The iteration is finite and restartable: it walks the ids that were
    /// live when it started and resolves each lazily, skipping any deleted
    /// concurrently.
    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        self.ids().into_iter().filter_map(|id| self.get(id))
    }

    /// Writes a snapshot of all live records, keyed to the current WAL
    /// position. Subsequent recovery replays only entries after it.
    pub fn create_snapshot(&self) -> Result<()> {
        let records = self.records.read();
        let wal_pos = self.wal.position();
        let points: Vec<Point> = records
            .iter()
            .map(|(&id, record)| Point::new(id, self.arena.load(record.slot), record.payload.clone()))
            .collect();
        drop(records);

        snapshot::write_snapshot(&self.dir, self.dimension, self.metric, wal_pos, &points)?;
        self.arena.flush()?;
        self.last_snapshot_wal_pos.store(wal_pos, Ordering::Release);
        tracing::debug!(records = points.len(), wal_pos, "snapshot written");
        Ok(())
    }

    /// True once the WAL has grown past the snapshot threshold since the
    /// last snapshot.
    #[must_use]
    pub fn should_snapshot(&self) -> bool {
        let last = self.last_snapshot_wal_pos.load(Ordering::Acquire);
        self.wal.position().saturating_sub(last) >= self.snapshot_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const THRESHOLD: u64 = 10 * 1024 * 1024;

    fn open(dir: &Path) -> VectorStore {
        VectorStore::open(dir, 2, DistanceMetric::Cosine, THRESHOLD, false).unwrap()
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store
            .put(Point::new(1, vec![1.0, 0.0], Some(json!({"k": "v"}))))
            .unwrap();
        assert_eq!(store.len(), 1);

        let point = store.get(1).unwrap();
        assert_eq!(point.vector, vec![1.0, 0.0]);
        assert_eq!(point.payload, Some(json!({"k": "v"})));

        assert!(store.delete(1).unwrap());
        assert!(!store.delete(1).unwrap());
        assert!(store.get(1).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store.put(Point::new(1, vec![1.0, 0.0], None)).unwrap();
        let err = store.put(Point::new(2, vec![1.0, 0.0, 0.5], None));
        assert!(matches!(
            err,
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(store.len(), 1);
        assert!(store.get(2).is_none());
        assert!(store.get(1).is_some());
    }

    #[test]
    fn test_upsert_same_id_is_one_record() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store.put(Point::new(1, vec![1.0, 0.0], None)).unwrap();
        store
            .put(Point::new(1, vec![0.0, 1.0], Some(json!({"v": 2}))))
            .unwrap();

        assert_eq!(store.len(), 1);
        let point = store.get(1).unwrap();
        assert_eq!(point.vector, vec![0.0, 1.0]);
        assert_eq!(point.payload, Some(json!({"v": 2})));
    }

    #[test]
    fn test_recovery_from_wal_only() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            store
                .put(Point::new(1, vec![1.0, 0.0], Some(json!({"n": 1}))))
                .unwrap();
            store.put(Point::new(2, vec![0.0, 1.0], None)).unwrap();
            store.delete(2).unwrap();
        }

        let store = open(dir.path());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().payload, Some(json!({"n": 1})));
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_recovery_from_snapshot_plus_delta() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path());
            store.put(Point::new(1, vec![1.0, 0.0], None)).unwrap();
            store.create_snapshot().unwrap();
            // Delta after the snapshot.
            store.put(Point::new(2, vec![0.5, 0.5], None)).unwrap();
            store.delete(1).unwrap();
        }

        let store = open(dir.path());
        assert_eq!(store.len(), 1);
        assert!(store.get(1).is_none());
        assert_eq!(store.get(2).unwrap().vector, vec![0.5, 0.5]);
    }

    #[test]
    fn test_iter_is_finite_and_restartable() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        for i in 0..10 {
            store
                .put(Point::new(i, vec![i as f32, 0.0], None))
                .unwrap();
        }

        let first: Vec<u64> = store.iter().map(|p| p.id).collect();
        let second: Vec<u64> = store.iter().map(|p| p.id).collect();
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
    }

    #[test]
    fn test_should_snapshot_threshold() {
        let dir = tempdir().unwrap();
        let store =
            VectorStore::open(dir.path(), 2, DistanceMetric::Cosine, 64, false).unwrap();
        assert!(!store.should_snapshot());

        for i in 0..10 {
            store.put(Point::new(i, vec![0.0, 0.0], None)).unwrap();
        }
        assert!(store.should_snapshot());

        store.create_snapshot().unwrap();
        assert!(!store.should_snapshot());
    }
}

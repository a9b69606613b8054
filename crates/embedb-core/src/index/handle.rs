//! Generation handle for atomic index swaps.
//!
//! Readers always dereference a complete generation: the active index sits
//! behind an `ArcSwap`, a rebuild constructs the next generation off to the
//! side, and publication is a single pointer swap. Writes that land while a
//! rebuild is running are buffered and drained into the new generation
//! before the swap, so the zero-operation staleness window holds across
//! rebuilds.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::Result;

use super::hnsw::HnswIndex;
use super::VectorIndex;

/// Observable index lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexState {
    /// Serving queries from a complete generation.
    Active = 0,
    /// A new generation is under construction; the active one keeps serving.
    Rebuilding = 1,
}

impl From<u8> for IndexState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Rebuilding,
            _ => Self::Active,
        }
    }
}

/// A write replicated into the next generation during a rebuild.
#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    /// Insert or replace.
    Upsert(u64, Vec<f32>),
    /// Tombstone.
    Delete(u64),
}

/// Shared handle to the active index generation.
pub struct IndexHandle {
    active: ArcSwap<HnswIndex>,
    state: AtomicU8,
    /// Writes buffered while a rebuild runs; `None` outside rebuilds.
    pending: Mutex<Option<Vec<PendingOp>>>,
}

impl IndexHandle {
    /// Wraps an initial generation.
    #[must_use]
    pub fn new(index: HnswIndex) -> Self {
        Self {
            active: ArcSwap::from_pointee(index),
            state: AtomicU8::new(IndexState::Active as u8),
            pending: Mutex::new(None),
        }
    }

    /// The current generation. The `Arc` stays valid for the caller even if
    /// a swap happens mid-query.
    #[must_use]
    pub fn load(&self) -> Arc<HnswIndex> {
        self.active.load_full()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IndexState {
        IndexState::from(self.state.load(Ordering::Acquire))
    }

    /// Records a write into the pending buffer when a rebuild is running.
    ///
    /// Called with the engine's writer lock held, after the op was applied
    /// to the active generation.
    pub(crate) fn log_pending(&self, op: PendingOp) {
        if let Some(buffer) = self.pending.lock().as_mut() {
            buffer.push(op);
        }
    }

    /// Enters the REBUILDING state and starts buffering writes.
    ///
    /// Returns false when a rebuild is already running.
    pub(crate) fn begin_rebuild(&self) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return false;
        }
        *pending = Some(Vec::new());
        self.state
            .store(IndexState::Rebuilding as u8, Ordering::Release);
        true
    }

    /// Drains buffered writes into `next` and publishes it atomically.
    ///
    /// Called with the engine's writer lock held, so no new writes can race
    /// the drain; this is the only moment a rebuild blocks writers. On a
    /// drain failure the previous generation stays active.
    pub(crate) fn finish_rebuild(&self, next: HnswIndex) -> Result<()> {
        let drained = self.pending.lock().take().unwrap_or_default();
        let result = drained.into_iter().try_for_each(|op| match op {
            PendingOp::Upsert(id, vector) => next.insert(id, &vector),
            PendingOp::Delete(id) => {
                next.remove(id);
                Ok(())
            }
        });
        if result.is_ok() {
            self.active.store(Arc::new(next));
        }
        self.state.store(IndexState::Active as u8, Ordering::Release);
        result
    }

    /// Abandons an in-progress rebuild, dropping the pending buffer.
    pub(crate) fn abort_rebuild(&self) {
        *self.pending.lock() = None;
        self.state.store(IndexState::Active as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::index::{HnswParams, SearchEffort};

    fn empty_index() -> HnswIndex {
        HnswIndex::new(2, DistanceMetric::Cosine, HnswParams::auto(2), 1000)
    }

    #[test]
    fn test_swap_is_visible_to_new_loads() {
        let handle = IndexHandle::new(empty_index());
        let before = handle.load();
        assert_eq!(before.len(), 0);

        assert!(handle.begin_rebuild());
        assert_eq!(handle.state(), IndexState::Rebuilding);

        let next = empty_index();
        next.insert(1, &[1.0, 0.0]).unwrap();
        handle.finish_rebuild(next).unwrap();

        assert_eq!(handle.state(), IndexState::Active);
        assert_eq!(handle.load().len(), 1);
        // The old generation the reader held is unchanged.
        assert_eq!(before.len(), 0);
    }

    #[test]
    fn test_pending_ops_drain_into_next_generation() {
        let handle = IndexHandle::new(empty_index());
        assert!(handle.begin_rebuild());

        // Writes arriving mid-rebuild are buffered.
        handle.log_pending(PendingOp::Upsert(7, vec![0.0, 1.0]));
        handle.log_pending(PendingOp::Upsert(8, vec![1.0, 0.0]));
        handle.log_pending(PendingOp::Delete(8));

        handle.finish_rebuild(empty_index()).unwrap();

        let index = handle.load();
        assert_eq!(index.len(), 1);
        let hits = index
            .search(&[0.0, 1.0], 1, SearchEffort::Balanced, None)
            .unwrap();
        assert_eq!(hits.candidates[0].0, 7);
    }

    #[test]
    fn test_concurrent_rebuild_rejected() {
        let handle = IndexHandle::new(empty_index());
        assert!(handle.begin_rebuild());
        assert!(!handle.begin_rebuild());
        handle.abort_rebuild();
        assert!(handle.begin_rebuild());
    }
}

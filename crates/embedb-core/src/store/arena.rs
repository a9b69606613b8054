//! Memory-mapped arena for vector data.
//!
//! Vectors live in fixed-size slots inside a single mmap-backed file, so a
//! large corpus does not have to fit in resident memory and slot access is
//! O(1). The arena is runtime storage only: durability comes from the WAL
//! and snapshots, and the arena is repopulated from them on open.
//!
//! All slot offsets are f32-aligned: a slot occupies `dimension * 4` bytes
//! and the first slot starts at offset 0. The file grows exponentially to
//! keep remaps (which take the write lock) rare.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use parking_lot::{Mutex, RwLock};

/// Slot identifier inside the arena.
pub(crate) type SlotId = u32;

/// Memory-mapped storage of fixed-dimension vector slots with free-list
/// reuse.
pub(crate) struct MmapVectorArena {
    dimension: usize,
    data_file: File,
    mmap: RwLock<MmapMut>,
    /// Next never-used slot.
    next_slot: AtomicU32,
    /// Slots released by deletes and overwrites, reused before `next_slot`
    /// advances.
    free: Mutex<Vec<SlotId>>,
}

impl MmapVectorArena {
    pub(crate) const FILE_NAME: &'static str = "vectors.dat";

    /// Initial file size. Handles small and medium datasets without a
    /// single resize.
    const INITIAL_SIZE: u64 = 16 * 1024 * 1024;

    /// Minimum growth per resize; fewer resizes means fewer blocking write
    /// locks.
    const MIN_GROWTH: u64 = 64 * 1024 * 1024;

    /// Creates or opens the arena file in `dir`.
    pub(crate) fn open(dir: &Path, dimension: usize) -> io::Result<Self> {
        let data_path = dir.join(Self::FILE_NAME);
        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)?;

        let file_len = data_file.metadata()?.len();
        if file_len < Self::INITIAL_SIZE {
            data_file.set_len(Self::INITIAL_SIZE)?;
        }

        // SAFETY: the file is open read/write and set_len above guarantees
        // the mapped range is allocated.
        let mmap = unsafe { MmapMut::map_mut(&data_file)? };

        Ok(Self {
            dimension,
            data_file,
            mmap: RwLock::new(mmap),
            next_slot: AtomicU32::new(0),
            free: Mutex::new(Vec::new()),
        })
    }

    /// Bytes occupied by one slot.
    #[inline]
    fn stride(&self) -> usize {
        self.dimension * 4
    }

    /// Stores a vector, reusing a freed slot when one is available.
    ///
    /// The caller guarantees `vector.len() == dimension`; the store
    /// validates dimensions before reaching the arena.
    pub(crate) fn store(&self, vector: &[f32]) -> io::Result<SlotId> {
        debug_assert_eq!(vector.len(), self.dimension);

        let slot = match self.free.lock().pop() {
            Some(slot) => slot,
            None => self.next_slot.fetch_add(1, Ordering::Relaxed),
        };

        let offset = slot as usize * self.stride();
        self.ensure_capacity(offset + self.stride())?;

        let mut mmap = self.mmap.write();
        let dest = &mut mmap[offset..offset + self.stride()];
        for (chunk, value) in dest.chunks_exact_mut(4).zip(vector.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(slot)
    }

    /// Loads the vector stored in `slot`.
    pub(crate) fn load(&self, slot: SlotId) -> Vec<f32> {
        let offset = slot as usize * self.stride();
        let mmap = self.mmap.read();
        mmap[offset..offset + self.stride()]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect()
    }

    /// Releases a slot for reuse.
    pub(crate) fn release(&self, slot: SlotId) {
        self.free.lock().push(slot);
    }

    /// Flushes dirty pages to disk.
    pub(crate) fn flush(&self) -> io::Result<()> {
        self.mmap.read().flush()
    }

    /// Grows the file and remaps when `required` bytes exceed the mapping.
    fn ensure_capacity(&self, required: usize) -> io::Result<()> {
        {
            let mmap = self.mmap.read();
            if required <= mmap.len() {
                return Ok(());
            }
        }

        let mut mmap = self.mmap.write();
        // Re-check: another writer may have grown the file while we waited.
        if required <= mmap.len() {
            return Ok(());
        }

        let current = mmap.len() as u64;
        let new_size = (current * 2)
            .max(required as u64)
            .max(current + Self::MIN_GROWTH);

        mmap.flush()?;
        self.data_file.set_len(new_size)?;
        // SAFETY: same file handle, freshly extended to new_size; the old
        // mapping is replaced under the write lock so no reader holds a
        // stale view.
        *mmap = unsafe { MmapMut::map_mut(&self.data_file)? };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let arena = MmapVectorArena::open(dir.path(), 3).unwrap();

        let a = arena.store(&[1.0, 2.0, 3.0]).unwrap();
        let b = arena.store(&[4.0, 5.0, 6.0]).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.load(a), vec![1.0, 2.0, 3.0]);
        assert_eq!(arena.load(b), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_released_slot_is_reused() {
        let dir = tempdir().unwrap();
        let arena = MmapVectorArena::open(dir.path(), 2).unwrap();

        let a = arena.store(&[1.0, 1.0]).unwrap();
        arena.release(a);
        let b = arena.store(&[2.0, 2.0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.load(b), vec![2.0, 2.0]);
    }

    #[test]
    fn test_growth_past_initial_size() {
        let dir = tempdir().unwrap();
        // 1024 floats = 4KiB per slot; 16MB initial = 4096 slots.
        let dimension = 1024;
        let arena = MmapVectorArena::open(dir.path(), dimension).unwrap();
        let vector = vec![0.5f32; dimension];

        let mut last = 0;
        for _ in 0..4100 {
            last = arena.store(&vector).unwrap();
        }
        assert_eq!(arena.load(last), vector);
    }
}

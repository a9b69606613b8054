//! Write-ahead log for record operations.
//!
//! Every acknowledged write lands here before any in-memory or arena state
//! changes, so a crash loses nothing that was acknowledged. On restart the
//! store replays the log from the last snapshot position.
//!
//! # Entry Format
//!
//! ```text
//! Upsert: [marker=1: 1B] [id: 8B LE] [vec_len: 4B LE] [payload_len: 4B LE]
//!         [crc32: 4B LE] [vector: vec_len bytes] [payload: payload_len bytes]
//! Delete: [marker=2: 1B] [id: 8B LE]
//! ```
//!
//! `vec_len` is always `dimension * 4`; `payload_len == 0` encodes a missing
//! payload (serialized payloads are never empty). The CRC32 (IEEE 802.3)
//! covers the vector and payload bytes.
//!
//! Replay is tolerant at the tail: an entry cut short by a crash is dropped
//! and replay stops there. A *complete* entry whose checksum does not match
//! is real corruption and fails recovery.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::point::Point;

const MARKER_UPSERT: u8 = 1;
const MARKER_DELETE: u8 = 2;

/// Simple CRC32 implementation (IEEE 802.3 polynomial).
#[inline]
#[allow(clippy::cast_possible_truncation)] // Table index is always 0-255.
pub(crate) fn crc32_hash(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    !crc
}

/// A single replayed operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WalOp {
    /// Insert or replace a record.
    Upsert(Point),
    /// Remove a record.
    Delete(u64),
}

/// Append-only operation log with CRC-protected entries.
pub(crate) struct RecordWal {
    path: PathBuf,
    writer: Mutex<io::BufWriter<File>>,
    /// Current end-of-log byte position, tracked lock-free for snapshot
    /// trigger decisions.
    position: AtomicU64,
    sync_writes: bool,
}

impl RecordWal {
    pub(crate) const FILE_NAME: &'static str = "records.wal";

    /// Opens (or creates) the log in `dir` for appending.
    pub(crate) fn open(dir: &Path, sync_writes: bool) -> io::Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path,
            writer: Mutex::new(io::BufWriter::new(file)),
            position: AtomicU64::new(len),
            sync_writes,
        })
    }

    /// Current end-of-log position in bytes.
    pub(crate) fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Appends an upsert entry and flushes it.
    pub(crate) fn append_upsert(&self, point: &Point) -> Result<()> {
        let vector_bytes: Vec<u8> = point
            .vector
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let payload_bytes = match &point.payload {
            Some(payload) => serde_json::to_vec(payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            None => Vec::new(),
        };

        let vec_len = u32::try_from(vector_bytes.len())
            .map_err(|_| Error::Corrupted("vector too large for WAL entry".into()))?;
        let payload_len = u32::try_from(payload_bytes.len())
            .map_err(|_| Error::Corrupted("payload too large for WAL entry".into()))?;

        let mut crc_input = Vec::with_capacity(vector_bytes.len() + payload_bytes.len());
        crc_input.extend_from_slice(&vector_bytes);
        crc_input.extend_from_slice(&payload_bytes);
        let crc = crc32_hash(&crc_input);

        let mut writer = self.writer.lock();
        writer.write_all(&[MARKER_UPSERT])?;
        writer.write_all(&point.id.to_le_bytes())?;
        writer.write_all(&vec_len.to_le_bytes())?;
        writer.write_all(&payload_len.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&vector_bytes)?;
        writer.write_all(&payload_bytes)?;
        writer.flush()?;
        if self.sync_writes {
            writer.get_ref().sync_data()?;
        }
        drop(writer);

        let entry_size = 1 + 8 + 4 + 4 + 4 + u64::from(vec_len) + u64::from(payload_len);
        self.position.fetch_add(entry_size, Ordering::Release);
        Ok(())
    }

    /// Appends a delete entry and flushes it.
    pub(crate) fn append_delete(&self, id: u64) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(&[MARKER_DELETE])?;
        writer.write_all(&id.to_le_bytes())?;
        writer.flush()?;
        if self.sync_writes {
            writer.get_ref().sync_data()?;
        }
        drop(writer);

        self.position.fetch_add(1 + 8, Ordering::Release);
        Ok(())
    }

    /// Replays entries from `start_pos` to the end of the log.
    ///
    /// `dimension` validates upsert entries; a complete entry with a wrong
    /// vector length or bad checksum fails with [`Error::Corrupted`]. A torn
    /// tail entry stops replay silently; those bytes were never
    /// acknowledged.
    pub(crate) fn replay<F>(&self, start_pos: u64, dimension: usize, mut apply: F) -> Result<u64>
    where
        F: FnMut(WalOp),
    {
        let file = File::open(&self.path)?;
        let end_pos = file.metadata()?.len();
        if start_pos >= end_pos {
            return Ok(end_pos);
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start_pos))?;
        let mut pos = start_pos;

        loop {
            let mut marker = [0u8; 1];
            if reader.read_exact(&mut marker).is_err() {
                break;
            }

            match marker[0] {
                MARKER_UPSERT => {
                    let mut header = [0u8; 8 + 4 + 4 + 4];
                    if reader.read_exact(&mut header).is_err() {
                        tracing::warn!(pos, "dropping torn WAL tail entry");
                        break;
                    }
                    let id = u64::from_le_bytes(header[0..8].try_into().expect("8 bytes"));
                    let vec_len =
                        u32::from_le_bytes(header[8..12].try_into().expect("4 bytes")) as usize;
                    let payload_len =
                        u32::from_le_bytes(header[12..16].try_into().expect("4 bytes")) as usize;
                    let stored_crc =
                        u32::from_le_bytes(header[16..20].try_into().expect("4 bytes"));

                    if vec_len != dimension * 4 {
                        return Err(Error::Corrupted(format!(
                            "WAL upsert at {pos} has vector length {vec_len}, expected {}",
                            dimension * 4
                        )));
                    }

                    let mut body = vec![0u8; vec_len + payload_len];
                    if reader.read_exact(&mut body).is_err() {
                        tracing::warn!(pos, "dropping torn WAL tail entry");
                        break;
                    }

                    let computed_crc = crc32_hash(&body);
                    if computed_crc != stored_crc {
                        return Err(Error::Corrupted(format!(
                            "WAL CRC32 mismatch at {pos}: expected {stored_crc:#010X}, got {computed_crc:#010X}"
                        )));
                    }

                    let vector: Vec<f32> = body[..vec_len]
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
                        .collect();
                    let payload = if payload_len == 0 {
                        None
                    } else {
                        Some(serde_json::from_slice(&body[vec_len..]).map_err(|e| {
                            Error::Corrupted(format!("WAL payload at {pos} is not valid JSON: {e}"))
                        })?)
                    };

                    pos += (1 + 20 + vec_len + payload_len) as u64;
                    apply(WalOp::Upsert(Point::new(id, vector, payload)));
                }
                MARKER_DELETE => {
                    let mut id_bytes = [0u8; 8];
                    if reader.read_exact(&mut id_bytes).is_err() {
                        tracing::warn!(pos, "dropping torn WAL tail entry");
                        break;
                    }
                    pos += 1 + 8;
                    apply(WalOp::Delete(u64::from_le_bytes(id_bytes)));
                }
                other => {
                    return Err(Error::Corrupted(format!(
                        "unknown WAL marker {other} at {pos}"
                    )));
                }
            }
        }

        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let wal = RecordWal::open(dir.path(), false).unwrap();

        wal.append_upsert(&Point::new(1, vec![1.0, 2.0], Some(json!({"a": 1}))))
            .unwrap();
        wal.append_upsert(&Point::new(2, vec![3.0, 4.0], None))
            .unwrap();
        wal.append_delete(1).unwrap();

        let mut ops = Vec::new();
        let end = wal.replay(0, 2, |op| ops.push(op)).unwrap();
        assert_eq!(end, wal.position());
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            WalOp::Upsert(Point::new(1, vec![1.0, 2.0], Some(json!({"a": 1}))))
        );
        assert_eq!(ops[2], WalOp::Delete(1));
    }

    #[test]
    fn test_replay_from_offset_skips_earlier_entries() {
        let dir = tempdir().unwrap();
        let wal = RecordWal::open(dir.path(), false).unwrap();

        wal.append_upsert(&Point::new(1, vec![0.0, 0.0], None))
            .unwrap();
        let mid = wal.position();
        wal.append_upsert(&Point::new(2, vec![1.0, 1.0], None))
            .unwrap();

        let mut ops = Vec::new();
        wal.replay(mid, 2, |op| ops.push(op)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0], WalOp::Upsert(Point::new(2, vec![1.0, 1.0], None)));
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        {
            let wal = RecordWal::open(dir.path(), false).unwrap();
            wal.append_upsert(&Point::new(1, vec![1.0, 2.0], None))
                .unwrap();
        }
        // Simulate a crash mid-write: append a truncated upsert entry.
        let path = dir.path().join(RecordWal::FILE_NAME);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[MARKER_UPSERT, 9, 0, 0]);
        std::fs::write(&path, &bytes).unwrap();

        let wal = RecordWal::open(dir.path(), false).unwrap();
        let mut ops = Vec::new();
        wal.replay(0, 2, |op| ops.push(op)).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_corrupted_crc_fails_replay() {
        let dir = tempdir().unwrap();
        {
            let wal = RecordWal::open(dir.path(), false).unwrap();
            wal.append_upsert(&Point::new(1, vec![1.0, 2.0], None))
                .unwrap();
        }
        // Flip a vector byte inside the complete entry.
        let path = dir.path().join(RecordWal::FILE_NAME);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let wal = RecordWal::open(dir.path(), false).unwrap();
        let result = wal.replay(0, 2, |_| {});
        assert!(matches!(result, Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_unknown_marker_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(RecordWal::FILE_NAME);
        std::fs::write(&path, [7u8, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let wal = RecordWal::open(dir.path(), false).unwrap();
        assert!(matches!(wal.replay(0, 2, |_| {}), Err(Error::Corrupted(_))));
    }
}

//! Durable snapshots of the record store.
//!
//! A snapshot captures every live record plus the WAL position it is
//! consistent with, so cold start loads the snapshot and replays only the
//! WAL delta instead of the whole log.
//!
//! # Format
//!
//! ```text
//! [Magic: "EDBS" 4B] [Version: 1B] [Metric: 1B] [Dimension: 4B LE]
//! [WAL position: 8B LE] [Record count: 8B LE]
//! [Records: (id: 8B LE, vector: dim*4B LE, payload_len: 4B LE, payload) × N]
//! [CRC32: 4B LE]
//! ```
//!
//! Snapshots are written to a temp file and renamed into place, so a crash
//! mid-write leaves the previous snapshot intact.

use std::path::Path;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::point::Point;

use super::wal::crc32_hash;

/// Snapshot file magic bytes.
const SNAPSHOT_MAGIC: &[u8; 4] = b"EDBS";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u8 = 1;

/// Fixed header size: magic(4) + version(1) + metric(1) + dimension(4)
/// + wal_pos(8) + count(8).
const HEADER_LEN: usize = 26;

/// Snapshot file name inside the data directory.
pub(crate) const SNAPSHOT_FILE: &str = "records.snap";

fn metric_to_byte(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Cosine => 0,
        DistanceMetric::Euclidean => 1,
        DistanceMetric::DotProduct => 2,
    }
}

fn metric_from_byte(byte: u8) -> Option<DistanceMetric> {
    match byte {
        0 => Some(DistanceMetric::Cosine),
        1 => Some(DistanceMetric::Euclidean),
        2 => Some(DistanceMetric::DotProduct),
        _ => None,
    }
}

/// Writes a snapshot of `records` consistent with `wal_pos`.
pub(crate) fn write_snapshot(
    dir: &Path,
    dimension: usize,
    metric: DistanceMetric,
    wal_pos: u64,
    records: &[Point],
) -> Result<()> {
    let mut buf = Vec::with_capacity(HEADER_LEN + records.len() * (8 + dimension * 4 + 4));

    buf.extend_from_slice(SNAPSHOT_MAGIC);
    buf.push(SNAPSHOT_VERSION);
    buf.push(metric_to_byte(metric));
    let dim = u32::try_from(dimension)
        .map_err(|_| Error::Corrupted("dimension too large for snapshot".into()))?;
    buf.extend_from_slice(&dim.to_le_bytes());
    buf.extend_from_slice(&wal_pos.to_le_bytes());
    buf.extend_from_slice(&(records.len() as u64).to_le_bytes());

    for point in records {
        buf.extend_from_slice(&point.id.to_le_bytes());
        for v in &point.vector {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let payload_bytes = match &point.payload {
            Some(payload) => serde_json::to_vec(payload)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            None => Vec::new(),
        };
        let payload_len = u32::try_from(payload_bytes.len())
            .map_err(|_| Error::Corrupted("payload too large for snapshot".into()))?;
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&payload_bytes);
    }

    let crc = crc32_hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());

    let temp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    std::fs::write(&temp_path, &buf)?;
    std::fs::rename(&temp_path, dir.join(SNAPSHOT_FILE))?;
    Ok(())
}

/// The result of loading a snapshot.
pub(crate) struct LoadedSnapshot {
    /// Records captured in the snapshot.
    pub records: Vec<Point>,
    /// WAL position the snapshot is consistent with.
    pub wal_pos: u64,
}

/// Loads and validates the snapshot in `dir`, if one exists.
///
/// Returns `Ok(None)` when there is no snapshot. A snapshot that exists but
/// fails magic/version/CRC validation is corruption and fails recovery; a
/// metric or dimension that differs from the engine configuration is a
/// configuration error.
pub(crate) fn load_snapshot(
    dir: &Path,
    dimension: usize,
    metric: DistanceMetric,
) -> Result<Option<LoadedSnapshot>> {
    let path = dir.join(SNAPSHOT_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read(&path)?;
    if data.len() < HEADER_LEN + 4 {
        return Err(Error::Corrupted("snapshot too small".into()));
    }
    if &data[0..4] != SNAPSHOT_MAGIC {
        return Err(Error::Corrupted("snapshot has invalid magic".into()));
    }
    if data[4] != SNAPSHOT_VERSION {
        return Err(Error::Corrupted(format!(
            "unsupported snapshot version {}",
            data[4]
        )));
    }

    let stored_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().expect("4 bytes"));
    let computed_crc = crc32_hash(&data[..data.len() - 4]);
    if stored_crc != computed_crc {
        return Err(Error::Corrupted(format!(
            "snapshot CRC32 mismatch: expected {stored_crc:#010X}, got {computed_crc:#010X}"
        )));
    }

    let snap_metric = metric_from_byte(data[5])
        .ok_or_else(|| Error::Corrupted(format!("unknown snapshot metric byte {}", data[5])))?;
    if snap_metric != metric {
        return Err(Error::Config(format!(
            "data directory was created with metric {snap_metric}, configured metric is {metric}"
        )));
    }

    let snap_dim = u32::from_le_bytes(data[6..10].try_into().expect("4 bytes")) as usize;
    if snap_dim != dimension {
        return Err(Error::Config(format!(
            "data directory was created with dimension {snap_dim}, configured dimension is {dimension}"
        )));
    }

    let wal_pos = u64::from_le_bytes(data[10..18].try_into().expect("8 bytes"));
    let count = u64::from_le_bytes(data[18..26].try_into().expect("8 bytes"));

    // Bound the count before allocating: each record occupies at least
    // 8 + dim*4 + 4 bytes, so a huge count cannot be honest.
    let min_record_len = 8 + dimension * 4 + 4;
    let max_possible = (data.len() - HEADER_LEN - 4) / min_record_len;
    if count > max_possible as u64 {
        return Err(Error::Corrupted(
            "snapshot record count exceeds file size".into(),
        ));
    }
    #[allow(clippy::cast_possible_truncation)] // Bounded by max_possible above.
    let count = count as usize;

    let body = &data[HEADER_LEN..data.len() - 4];
    let mut records = Vec::with_capacity(count);
    let mut offset = 0usize;

    for _ in 0..count {
        if body.len() < offset + min_record_len {
            return Err(Error::Corrupted("snapshot truncated mid-record".into()));
        }
        let id = u64::from_le_bytes(body[offset..offset + 8].try_into().expect("8 bytes"));
        offset += 8;

        let vector: Vec<f32> = body[offset..offset + dimension * 4]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        offset += dimension * 4;

        let payload_len =
            u32::from_le_bytes(body[offset..offset + 4].try_into().expect("4 bytes")) as usize;
        offset += 4;

        let payload = if payload_len == 0 {
            None
        } else {
            if body.len() < offset + payload_len {
                return Err(Error::Corrupted("snapshot truncated mid-payload".into()));
            }
            let value = serde_json::from_slice(&body[offset..offset + payload_len])
                .map_err(|e| Error::Corrupted(format!("snapshot payload is not valid JSON: {e}")))?;
            offset += payload_len;
            Some(value)
        };

        records.push(Point::new(id, vector, payload));
    }

    if offset != body.len() {
        return Err(Error::Corrupted("snapshot has trailing bytes".into()));
    }

    Ok(Some(LoadedSnapshot { records, wal_pos }))
}

//! Batch frame format
//!
//! One frame holds one atomic write batch:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including this field)
//! +------------------+
//! | Record Count     | (u32 LE)
//! +------------------+
//! | Key              | (length-prefixed JSON) \
//! +------------------+                          > repeated Record Count times
//! | Body             | (length-prefixed bytes) /
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{BackendError, BackendResult};
use super::{BackendRecord, RecordKey};

/// Length and count header.
pub(crate) const FRAME_HEADER_SIZE: usize = 8;
/// Smallest possible frame: header plus checksum.
pub(crate) const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + 4;

/// Encodes `records` as a single frame.
pub(crate) fn encode_frame(records: &[BackendRecord]) -> BackendResult<Vec<u8>> {
    let mut buf = vec![0u8; FRAME_HEADER_SIZE];
    for record in records {
        let key = serde_json::to_vec(&record.key).map_err(|e| {
            BackendError::write_failed_no_source(format!("Failed to encode record key: {}", e))
        })?;
        put_bytes(&mut buf, &key)?;
        put_bytes(&mut buf, &record.body)?;
    }

    let total = buf.len() + 4;
    let total = u32::try_from(total)
        .map_err(|_| BackendError::write_failed_no_source("Batch too large for one frame"))?;
    let count = u32::try_from(records.len())
        .map_err(|_| BackendError::write_failed_no_source("Too many records in one batch"))?;
    buf[0..4].copy_from_slice(&total.to_le_bytes());
    buf[4..8].copy_from_slice(&count.to_le_bytes());

    let checksum = compute_checksum(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> BackendResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| BackendError::write_failed_no_source("Record field exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads the declared length of the frame starting at `buf[0]`.
pub(crate) fn frame_length(buf: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = buf.get(0..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes) as usize)
}

/// Decodes and verifies one complete frame. `offset` is for error context.
pub(crate) fn decode_frame(frame: &[u8], offset: u64) -> BackendResult<Vec<BackendRecord>> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(BackendError::corruption_at_offset(
            offset,
            format!("Frame of {} bytes is shorter than the minimum", frame.len()),
        ));
    }
    let (content, checksum_bytes) = frame.split_at(frame.len() - 4);
    let mut expected = [0u8; 4];
    expected.copy_from_slice(checksum_bytes);
    if !verify_checksum(content, u32::from_le_bytes(expected)) {
        return Err(BackendError::corruption_at_offset(offset, "Frame checksum mismatch"));
    }

    let mut cursor = Cursor {
        buf: content,
        pos: 4,
        offset,
    };
    let count = cursor.u32()?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_bytes = cursor.bytes()?;
        let key: RecordKey = serde_json::from_slice(key_bytes).map_err(|e| {
            BackendError::corruption_at_offset(offset, format!("Undecodable record key: {}", e))
        })?;
        let body = cursor.bytes()?.to_vec();
        records.push(BackendRecord { key, body });
    }
    if cursor.pos != content.len() {
        return Err(BackendError::corruption_at_offset(
            offset,
            "Trailing bytes after last record in frame",
        ));
    }
    Ok(records)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> BackendResult<u32> {
        let bytes = self.take(4)?;
        let mut array = [0u8; 4];
        array.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(array))
    }

    fn bytes(&mut self) -> BackendResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn take(&mut self, len: usize) -> BackendResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(BackendError::corruption_at_offset(
                self.offset,
                "Record field runs past end of frame",
            )),
        }
    }
}

//! Append-only file backend
//!
//! - One frame per write batch, appended to `<data_dir>/store/records.dat`
//! - fsync after every batch when `sync_writes` is set
//! - Multiple records for the same key may exist; latest wins
//! - An incomplete trailing frame (crash mid-append) is truncated on open
//! - A checksum mismatch in a complete frame is fatal

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{BackendError, BackendResult};
use super::frame::{decode_frame, encode_frame, frame_length, MIN_FRAME_SIZE};
use super::{Backend, BackendRecord, RecordKey};
use crate::observability::{log_event_with_fields, Event};

/// File-backed record store.
pub struct FileBackend {
    path: PathBuf,
    file: File,
    current_offset: u64,
    sync_writes: bool,
    /// key -> offset of the latest frame holding it
    offsets: HashMap<RecordKey, u64>,
}

impl FileBackend {
    /// Opens or creates the record file under `data_dir`.
    ///
    /// Scans every frame to build the offset index. A torn tail is cut off
    /// and logged; corruption anywhere else fails the open.
    pub fn open(data_dir: &Path, sync_writes: bool) -> BackendResult<Self> {
        let store_dir = data_dir.join("store");
        let path = store_dir.join("records.dat");

        if !store_dir.exists() {
            fs::create_dir_all(&store_dir).map_err(|e| {
                BackendError::write_failed(
                    format!("Failed to create store directory: {}", store_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                BackendError::io_error(
                    format!("Failed to open record file: {}", path.display()),
                    e,
                )
            })?;

        let contents = fs::read(&path).map_err(|e| {
            BackendError::read_failed(format!("Failed to read record file: {}", path.display()), e)
        })?;
        let (offsets, valid_len) = Self::scan(&contents)?;

        if valid_len < contents.len() as u64 {
            log_event_with_fields(
                Event::BackendTornTail,
                &[
                    ("path", &path.display().to_string()),
                    ("valid_bytes", &valid_len.to_string()),
                    ("discarded_bytes", &(contents.len() as u64 - valid_len).to_string()),
                ],
            );
            file.set_len(valid_len).map_err(|e| {
                BackendError::write_failed("Failed to truncate torn tail", e)
            })?;
            file.sync_all()
                .map_err(|e| BackendError::write_failed("fsync failed after truncation", e))?;
        }

        Ok(Self {
            path,
            file,
            current_offset: valid_len,
            sync_writes,
            offsets,
        })
    }

    /// Walks all frames. Returns the index and the length of the valid prefix.
    fn scan(contents: &[u8]) -> BackendResult<(HashMap<RecordKey, u64>, u64)> {
        let mut offsets = HashMap::new();
        let mut pos = 0usize;
        while pos < contents.len() {
            let remaining = &contents[pos..];
            let declared = match frame_length(remaining) {
                Some(len) => len,
                None => break,
            };
            if declared > remaining.len() {
                break;
            }
            if declared < MIN_FRAME_SIZE {
                return Err(BackendError::corruption_at_offset(
                    pos as u64,
                    format!("Invalid frame length: {}", declared),
                ));
            }
            let records = decode_frame(&remaining[..declared], pos as u64).map_err(|err| {
                log_event_with_fields(Event::BackendCorruption, &[("error", &err.to_string())]);
                err
            })?;
            for record in records {
                offsets.insert(record.key, pos as u64);
            }
            pos += declared;
        }
        Ok((offsets, pos as u64))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length of the valid record file.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    fn read_frame_at(&mut self, offset: u64) -> BackendResult<Vec<BackendRecord>> {
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| {
            BackendError::read_failed(format!("Failed to seek to offset {}", offset), e)
        })?;
        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf).map_err(|e| {
            BackendError::read_failed(format!("Failed to read frame length at {}", offset), e)
        })?;
        let declared = u32::from_le_bytes(len_buf) as usize;
        if declared < MIN_FRAME_SIZE {
            return Err(BackendError::corruption_at_offset(
                offset,
                format!("Invalid frame length: {}", declared),
            ));
        }
        let mut frame = vec![0u8; declared];
        frame[0..4].copy_from_slice(&len_buf);
        self.file.read_exact(&mut frame[4..]).map_err(|e| {
            BackendError::read_failed(format!("Failed to read frame at {}", offset), e)
        })?;
        decode_frame(&frame, offset)
    }
}

impl Backend for FileBackend {
    fn write_batch(&mut self, records: &[BackendRecord]) -> BackendResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let frame = encode_frame(records)?;
        let offset = self.current_offset;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| BackendError::write_failed("Failed to seek to end of file", e))?;
        self.file.write_all(&frame).map_err(|e| {
            BackendError::write_failed(format!("Failed to append frame at {}", offset), e)
        })?;
        if self.sync_writes {
            self.file
                .sync_all()
                .map_err(|e| BackendError::write_failed("fsync failed after batch", e))?;
        }

        self.current_offset += frame.len() as u64;
        for record in records {
            self.offsets.insert(record.key, offset);
        }
        Ok(())
    }

    fn read(&mut self, key: &RecordKey) -> BackendResult<Option<Vec<u8>>> {
        let offset = match self.offsets.get(key) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        let records = self.read_frame_at(offset)?;
        // A batch may carry the same key twice; the later one wins.
        let body = records
            .into_iter()
            .rev()
            .find(|record| record.key == *key)
            .map(|record| record.body);
        match body {
            Some(body) => Ok(Some(body)),
            None => Err(BackendError::corruption_at_offset(
                offset,
                "Indexed key missing from its frame",
            )),
        }
    }

    fn keys(&self) -> Vec<RecordKey> {
        let mut keys: Vec<_> = self.offsets.keys().copied().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::revision::{BranchId, RevisionId};

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let key = RecordKey::Revision(RevisionId::new());
        {
            let mut backend = FileBackend::open(dir.path(), true).unwrap();
            backend
                .write_batch(&[BackendRecord::new(key, b"r1".to_vec())])
                .unwrap();
        }
        let mut backend = FileBackend::open(dir.path(), true).unwrap();
        assert_eq!(backend.read(&key).unwrap(), Some(b"r1".to_vec()));
        assert_eq!(backend.keys(), vec![key]);
    }

    #[test]
    fn test_latest_frame_wins() {
        let dir = TempDir::new().unwrap();
        let key = RecordKey::Branch(BranchId::new());
        let mut backend = FileBackend::open(dir.path(), false).unwrap();
        backend
            .write_batch(&[BackendRecord::new(key, b"tip-1".to_vec())])
            .unwrap();
        backend
            .write_batch(&[BackendRecord::new(key, b"tip-2".to_vec())])
            .unwrap();
        assert_eq!(backend.read(&key).unwrap(), Some(b"tip-2".to_vec()));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let key = RecordKey::Branch(BranchId::new());
        let path = {
            let mut backend = FileBackend::open(dir.path(), true).unwrap();
            backend
                .write_batch(&[BackendRecord::new(key, b"kept".to_vec())])
                .unwrap();
            backend.path().to_path_buf()
        };
        let valid = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[200, 0, 0, 0, 1, 0]).unwrap();
        drop(file);

        let mut backend = FileBackend::open(dir.path(), true).unwrap();
        assert_eq!(backend.current_offset(), valid);
        assert_eq!(fs::metadata(&path).unwrap().len(), valid);
        assert_eq!(backend.read(&key).unwrap(), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_checksum_mismatch_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut backend = FileBackend::open(dir.path(), true).unwrap();
            backend
                .write_batch(&[BackendRecord::new(
                    RecordKey::Revision(RevisionId::new()),
                    b"payload".to_vec(),
                )])
                .unwrap();
            backend.path().to_path_buf()
        };
        let mut bytes = fs::read(&path).unwrap();
        let last_body_byte = bytes.len() - 5;
        bytes[last_body_byte] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = FileBackend::open(dir.path(), true).err().unwrap();
        assert!(err.is_fatal());
    }
}

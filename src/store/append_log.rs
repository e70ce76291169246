use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;

use super::ObjectStore;
use crate::io::ObjectRecord;
use crate::{Result, VaError};

/// Bytes in a log entry header: u32 length + u32 CRC32.
const ENTRY_HEADER_LEN: u64 = 8;
/// Bytes per offset-table slot.
const OFFSET_SLOT_LEN: u64 = 8;

struct LogWriter {
    log: BufWriter<File>,
    offsets: BufWriter<File>,
    next_index: u64,
    position: u64,
}

/// Append-only object log with a fixed-width offset table.
///
/// Log entry format:
/// - u32 length of the encoded record (little endian)
/// - u32 crc32 of the encoded record
/// - bincode-encoded [`ObjectRecord`]
///
/// The offset table (`<log>.offsets`) holds one little-endian u64 log offset
/// per object index, so object `i` is found by reading slot `i`. Records must
/// be put with dense, ascending indices. Writes are buffered until
/// [`ObjectStore::flush`].
pub struct LogObjectStore {
    log_path: PathBuf,
    offsets_path: PathBuf,
    dim: usize,
    writer: Option<LogWriter>,
}

impl LogObjectStore {
    pub fn new<P: AsRef<Path>>(log_path: P, dim: usize) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let offsets_path = log_path.with_extension("offsets");
        Ok(Self {
            log_path,
            offsets_path,
            dim,
            writer: None,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn offsets_path(&self) -> &Path {
        &self.offsets_path
    }

    fn open_writer(&self) -> Result<LogWriter> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let offsets = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.offsets_path)?;
        let position = log.metadata()?.len();
        let next_index = offsets.metadata()?.len() / OFFSET_SLOT_LEN;
        Ok(LogWriter {
            log: BufWriter::new(log),
            offsets: BufWriter::new(offsets),
            next_index,
            position,
        })
    }

    fn read_offset(&self, index: u64) -> Result<u64> {
        let mut offsets = match File::open(&self.offsets_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(VaError::MissingObject(index))
            }
            Err(err) => return Err(VaError::Io(err)),
        };
        let slot = index
            .checked_mul(OFFSET_SLOT_LEN)
            .ok_or(VaError::MissingObject(index))?;
        if slot + OFFSET_SLOT_LEN > offsets.metadata()?.len() {
            return Err(VaError::MissingObject(index));
        }
        offsets.seek(SeekFrom::Start(slot))?;
        let mut buf = [0u8; 8];
        offsets.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl ObjectStore for LogObjectStore {
    fn put(&mut self, record: &ObjectRecord) -> Result<()> {
        if record.point.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: record.point.len(),
            });
        }
        if self.writer.is_none() {
            self.writer = Some(self.open_writer()?);
        }
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Err(VaError::InvalidPersistence("object log writer unavailable")),
        };
        if record.index != writer.next_index {
            return Err(VaError::InvalidPersistence(
                "object log requires dense ascending object indices",
            ));
        }

        let body = bincode::serialize(record)
            .map_err(|_| VaError::InvalidPersistence("failed to serialize object record"))?;
        let len = u32::try_from(body.len())
            .map_err(|_| VaError::InvalidPersistence("object record exceeds log entry limits"))?;
        let mut hasher = Hasher::new();
        hasher.update(&body);

        writer.log.write_all(&len.to_le_bytes())?;
        writer.log.write_all(&hasher.finalize().to_le_bytes())?;
        writer.log.write_all(&body)?;
        writer.offsets.write_all(&writer.position.to_le_bytes())?;

        writer.position += ENTRY_HEADER_LEN + body.len() as u64;
        writer.next_index += 1;
        Ok(())
    }

    fn get(&self, index: u64) -> Result<ObjectRecord> {
        let offset = self.read_offset(index)?;

        let mut log = File::open(&self.log_path)?;
        log.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 8];
        log.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let stored_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let entry_end = offset
            .checked_add(ENTRY_HEADER_LEN + u64::from(len))
            .ok_or(VaError::InvalidPersistence("object log entry length overflows"))?;
        if entry_end > log.metadata()?.len() {
            return Err(VaError::InvalidPersistence(
                "object log entry extends past end of log",
            ));
        }

        let mut body = vec![0u8; len as usize];
        log.read_exact(&mut body)?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        if hasher.finalize() != stored_crc {
            return Err(VaError::InvalidPersistence("object log checksum mismatch"));
        }

        let record: ObjectRecord = bincode::deserialize(&body)
            .map_err(|_| VaError::InvalidPersistence("failed to deserialize object record"))?;
        if record.index != index {
            return Err(VaError::InvalidPersistence(
                "object log offset table is inconsistent",
            ));
        }
        if record.point.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: record.point.len(),
            });
        }
        Ok(record)
    }

    fn clear(&mut self) -> Result<()> {
        self.writer = None;
        File::create(&self.log_path)?;
        File::create(&self.offsets_path)?;
        Ok(())
    }

    /// Flush buffered entries and release the write handles.
    fn flush(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.log.flush()?;
            writer.offsets.flush()?;
            writer.log.get_ref().sync_data()?;
            writer.offsets.get_ref().sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(index: u64, x: f64) -> ObjectRecord {
        ObjectRecord {
            index,
            point: vec![x, 1.0 - x],
            payload: format!("obj-{index}"),
        }
    }

    #[test]
    fn entries_are_addressable_by_index() {
        let dir = tempdir().unwrap();
        let mut store = LogObjectStore::new(dir.path().join("objects.log"), 2).unwrap();
        store.clear().unwrap();
        for index in 0..20 {
            store.put(&record(index, index as f64 / 20.0)).unwrap();
        }
        store.flush().unwrap();

        assert_eq!(store.get(0).unwrap(), record(0, 0.0));
        assert_eq!(store.get(13).unwrap(), record(13, 13.0 / 20.0));
        assert!(matches!(store.get(20), Err(VaError::MissingObject(20))));
    }

    #[test]
    fn non_sequential_put_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = LogObjectStore::new(dir.path().join("objects.log"), 2).unwrap();
        store.put(&record(0, 0.1)).unwrap();
        assert!(matches!(
            store.put(&record(2, 0.2)),
            Err(VaError::InvalidPersistence(_))
        ));
    }

    #[test]
    fn clear_resets_indices() {
        let dir = tempdir().unwrap();
        let mut store = LogObjectStore::new(dir.path().join("objects.log"), 2).unwrap();
        store.put(&record(0, 0.1)).unwrap();
        store.put(&record(1, 0.2)).unwrap();
        store.flush().unwrap();

        store.clear().unwrap();
        assert!(matches!(store.get(0), Err(VaError::MissingObject(0))));
        store.put(&record(0, 0.3)).unwrap();
        store.flush().unwrap();
        assert_eq!(store.get(0).unwrap(), record(0, 0.3));
    }

    #[test]
    fn corrupted_entry_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.log");
        let mut store = LogObjectStore::new(&path, 2).unwrap();
        store.put(&record(0, 0.4)).unwrap();
        store.flush().unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.get(0),
            Err(VaError::InvalidPersistence("object log checksum mismatch"))
        ));
    }

    #[test]
    fn oversized_entry_length_is_rejected_before_reading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.log");
        let mut store = LogObjectStore::new(&path, 2).unwrap();
        store.put(&record(0, 0.4)).unwrap();
        store.put(&record(1, 0.6)).unwrap();
        store.flush().unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            store.get(0),
            Err(VaError::InvalidPersistence(
                "object log entry extends past end of log"
            ))
        ));
        assert_eq!(store.get(1).unwrap(), record(1, 0.6));
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::ObjectStore;
use crate::io::{format_point_line, parse_point_line, ObjectRecord};
use crate::{Result, VaError};

const OBJECT_EXTENSION: &str = "obj";

/// One text file per object under a base directory.
///
/// Object `i` lives in `<base>/<i>.obj` and holds a single line with the same
/// shape as an input record: `D` coordinates followed by the payload. Every
/// `get` opens, reads and closes its file; no handle outlives a call.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    base_path: PathBuf,
    dim: usize,
}

impl FileObjectStore {
    /// Open (creating if needed) a store rooted at `base_path`.
    pub fn new<P: AsRef<Path>>(base_path: P, dim: usize) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, dim })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn object_path(&self, index: u64) -> PathBuf {
        self.base_path.join(format!("{index}.{OBJECT_EXTENSION}"))
    }

    fn is_object_file(path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(OBJECT_EXTENSION)
            && path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.parse::<u64>().is_ok())
    }
}

impl ObjectStore for FileObjectStore {
    fn put(&mut self, record: &ObjectRecord) -> Result<()> {
        if record.point.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: record.point.len(),
            });
        }
        let mut line = format_point_line(&record.point, &record.payload);
        line.push('\n');
        fs::write(self.object_path(record.index), line)?;
        Ok(())
    }

    fn get(&self, index: u64) -> Result<ObjectRecord> {
        let text = match fs::read_to_string(self.object_path(index)) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(VaError::MissingObject(index))
            }
            Err(err) => return Err(VaError::Io(err)),
        };
        let (point, payload) = parse_point_line(&text, self.dim, 1)?;
        Ok(ObjectRecord {
            index,
            point,
            payload,
        })
    }

    /// Remove every `<index>.obj` file; anything else in the directory is left alone.
    fn clear(&mut self) -> Result<()> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.base_path)?;
                return Ok(());
            }
            Err(err) => return Err(VaError::Io(err)),
        };
        for entry in entries {
            let path = entry?.path();
            if Self::is_object_file(&path) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(index: u64, point: Vec<f64>, payload: &str) -> ObjectRecord {
        ObjectRecord {
            index,
            point,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn put_then_get_returns_exact_coordinates() {
        let dir = tempdir().unwrap();
        let mut store = FileObjectStore::new(dir.path().join("objects"), 3).unwrap();
        let original = record(17, vec![0.1, 1.0 / 7.0, 0.999_999], "seventeen");
        store.put(&original).unwrap();
        assert_eq!(store.get(17).unwrap(), original);
        assert!(dir.path().join("objects").join("17.obj").exists());
    }

    #[test]
    fn missing_object_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::new(dir.path(), 2).unwrap();
        assert!(matches!(store.get(9), Err(VaError::MissingObject(9))));
    }

    #[test]
    fn clear_only_removes_object_files() {
        let dir = tempdir().unwrap();
        let mut store = FileObjectStore::new(dir.path(), 1).unwrap();
        store.put(&record(0, vec![0.5], "a")).unwrap();
        store.put(&record(1, vec![0.25], "b")).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        store.clear().unwrap();
        assert!(matches!(store.get(0), Err(VaError::MissingObject(0))));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn wrong_dimension_is_rejected_on_put() {
        let dir = tempdir().unwrap();
        let mut store = FileObjectStore::new(dir.path(), 2).unwrap();
        assert!(store.put(&record(0, vec![0.5], "a")).is_err());
    }
}

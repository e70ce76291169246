//! Exact-coordinate object storage, addressed by object index.
//!
//! The query engine only ever calls [`ObjectStore::get`], one candidate at a
//! time, during refinement. Builders call [`ObjectStore::clear`] once, then
//! [`ObjectStore::put`] for every object in index order, then
//! [`ObjectStore::flush`].

mod append_log;
mod file;

use std::collections::BTreeMap;

pub use append_log::LogObjectStore;
pub use file::FileObjectStore;

use crate::io::ObjectRecord;
use crate::{Result, VaError};

/// Storage backend for exact object data.
pub trait ObjectStore {
    /// Persist `record` under `record.index`.
    fn put(&mut self, record: &ObjectRecord) -> Result<()>;

    /// Load the record stored under `index`.
    ///
    /// A record that was never stored is reported as [`VaError::MissingObject`].
    fn get(&self, index: u64) -> Result<ObjectRecord>;

    /// Drop every stored record.
    fn clear(&mut self) -> Result<()>;

    /// Make every `put` so far visible to `get`.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
    fn put(&mut self, record: &ObjectRecord) -> Result<()> {
        (**self).put(record)
    }

    fn get(&self, index: u64) -> Result<ObjectRecord> {
        (**self).get(index)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// In-memory store, handy for tests and small throwaway indexes.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    records: BTreeMap<u64, ObjectRecord>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&mut self, record: &ObjectRecord) -> Result<()> {
        self.records.insert(record.index, record.clone());
        Ok(())
    }

    fn get(&self, index: u64) -> Result<ObjectRecord> {
        self.records
            .get(&index)
            .cloned()
            .ok_or(VaError::MissingObject(index))
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}

//! Vector approximation file (VA-file) for similarity search over points in
//! `[0, 1)^D`.
//!
//! Every indexed point is compressed to a per-dimension cell code of `B` bits.
//! Queries scan the compact approximation file once, discard objects whose
//! cell provably cannot match, and only then load exact coordinates from the
//! object store for the survivors.
//!
//! ```no_run
//! use vafile_rs::{Query, VaConfig, VaIndex};
//!
//! let config = VaConfig::new(2, 8)
//!     .with_input_path("points.txt")
//!     .with_approx_path("points.va")
//!     .with_store_path("objects");
//! let index = VaIndex::open_or_build(config)?;
//! let hits = index.engine().execute(&Query::Knn { point: vec![0.2, 0.4], k: 5 })?;
//! for hit in hits {
//!     println!("{}", hit.payload);
//! }
//! # Ok::<(), vafile_rs::VaError>(())
//! ```

pub mod approx;
pub mod brute_force;
pub mod builder;
pub mod config;
pub mod index;
pub mod io;
pub mod manifest;
pub mod query;
pub mod quantizer;
pub mod store;
pub mod workload;

mod heap;
mod math;

pub use approx::{file_size, ApproxScan, ApproxSummary, ApproxWriter, VaRecord};
pub use brute_force::LinearScanIndex;
pub use builder::{BuildSummary, IndexBuilder};
pub use config::{BoundKind, KnnStrategy, StoreKind, VaConfig};
pub use index::VaIndex;
pub use io::ObjectRecord;
pub use manifest::IndexManifest;
pub use math::{distance, points_equal};
pub use quantizer::{CellCode, Quantizer};
pub use query::{Match, Query, QueryEngine, QueryStats};
pub use store::{FileObjectStore, LogObjectStore, MemoryObjectStore, ObjectStore};


/// Errors that can occur when building or querying a VA-file index.
#[derive(thiserror::Error, Debug)]
pub enum VaError {
    /// Returned when a point does not have the configured dimensionality.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when an invalid configuration is supplied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Returned when a query carries non-finite coordinates or parameters.
    #[error("invalid query: {0}")]
    InvalidQuery(&'static str),
    /// Returned when a textual record cannot be parsed.
    #[error("malformed record at line {line}: {message}")]
    Parse { line: usize, message: String },
    /// Returned when strict domain checking rejects an input coordinate.
    #[error("coordinate {value} at line {line} lies outside [0, 1)")]
    OutOfDomain { line: usize, value: f64 },
    /// Returned when refinement needs an object the store does not hold.
    #[error("object {0} is missing from the object store")]
    MissingObject(u64),
    /// Returned when an I/O operation fails.
    #[error("i/o error while reading or writing an index: {0}")]
    Io(#[from] std::io::Error),
    /// Returned when persisted bytes are inconsistent or corrupt.
    #[error("invalid persisted index: {0}")]
    InvalidPersistence(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaError>;

impl VaError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        VaError::Parse {
            line,
            message: message.into(),
        }
    }
}

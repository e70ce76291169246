use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, VaError};

/// Largest supported per-dimension bit width. Cell codes are stored as `u16`.
pub const MAX_BITS: u32 = 16;

/// Object store backend used for exact coordinates and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreKind {
    /// One text file per object, named after the object index.
    #[default]
    Files,
    /// Single append-only log plus a fixed-width offset table.
    Log,
}

/// How the filter phase bounds the distance between a query and a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundKind {
    /// Per dimension, distance to the nearer cell edge, zero inside the cell.
    /// Never exceeds the true distance to a point in the cell.
    #[default]
    NearestEdge,
    /// Per dimension, distance to the cell's lower edge only. Overestimates
    /// whenever the query lies above a cell's lower edge, so range and kNN
    /// queries may miss true matches under this bound.
    LowerEdge,
}

/// Candidate selection used by kNN queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KnnStrategy {
    /// Keep the `k` smallest cell upper bounds and admit every record whose
    /// lower bound does not exceed the current `k`-th upper bound. Exact.
    #[default]
    UpperBound,
    /// Keep only the `k` records with the smallest lower bounds, then refine
    /// those. Cheaper, but a true neighbour with a loose bound can be evicted.
    LowerBoundCascade,
}

/// Fixed parameters of one VA-file index instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaConfig {
    /// Dimensionality `D` of every point.
    pub dim: usize,
    /// Bits per dimension `B`; each axis is split into `2^B` cells.
    pub bits: u32,
    /// Raw input records consumed by the builder.
    pub input_path: PathBuf,
    /// Approximation file written by the builder and scanned by queries.
    pub approx_path: PathBuf,
    /// Object store location (directory for `Files`, log path for `Log`).
    pub store_path: PathBuf,
    pub store_kind: StoreKind,
    pub bound: BoundKind,
    pub knn: KnnStrategy,
    /// Reject input coordinates outside `[0, 1)` during builds. When off,
    /// such coordinates are clamped into `[0, 1)` before being stored.
    pub strict_domain: bool,
}

impl VaConfig {
    pub fn new(dim: usize, bits: u32) -> Self {
        Self {
            dim,
            bits,
            input_path: PathBuf::from("data.txt"),
            approx_path: PathBuf::from("vafile.txt"),
            store_path: PathBuf::from("objects"),
            store_kind: StoreKind::default(),
            bound: BoundKind::default(),
            knn: KnnStrategy::default(),
            strict_domain: true,
        }
    }

    pub fn with_input_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.input_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_approx_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.approx_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_store_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.store_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_store_kind(mut self, store_kind: StoreKind) -> Self {
        self.store_kind = store_kind;
        self
    }

    pub fn with_bound(mut self, bound: BoundKind) -> Self {
        self.bound = bound;
        self
    }

    pub fn with_knn_strategy(mut self, knn: KnnStrategy) -> Self {
        self.knn = knn;
        self
    }

    pub fn with_strict_domain(mut self, strict_domain: bool) -> Self {
        self.strict_domain = strict_domain;
        self
    }

    /// Path of the manifest sidecar that accompanies the approximation file.
    pub fn manifest_path(&self) -> PathBuf {
        self.approx_path.with_extension("manifest")
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(VaError::InvalidConfig("dimension must be positive"));
        }
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(VaError::InvalidConfig("bits must be between 1 and 16"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_dimension_and_wide_codes() {
        assert!(VaConfig::new(0, 4).validate().is_err());
        assert!(VaConfig::new(3, 0).validate().is_err());
        assert!(VaConfig::new(3, 17).validate().is_err());
        assert!(VaConfig::new(3, 16).validate().is_ok());
    }

    #[test]
    fn manifest_sits_next_to_approximation_file() {
        let config = VaConfig::new(2, 4).with_approx_path("/tmp/idx/points.va");
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/idx/points.manifest"));
    }
}

//! Filter-and-refine query execution.
//!
//! Every query makes one sequential pass over the approximation file (filter),
//! collecting candidate object indices from cell codes alone, and then loads
//! each surviving candidate from the object store to test its exact
//! coordinates (refine).

use std::path::Path;

use log::debug;

use crate::approx::ApproxScan;
use crate::config::KnnStrategy;
use crate::heap::BoundedMaxHeap;
use crate::math::{distance, points_equal};
use crate::quantizer::Quantizer;
use crate::store::ObjectStore;
use crate::{Result, VaError};

/// A similarity query against a VA-file index.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Objects whose coordinates equal `point` exactly.
    Point(Vec<f64>),
    /// Objects within `radius` (inclusive) of `point`.
    Range { point: Vec<f64>, radius: f64 },
    /// The `k` objects nearest to `point`.
    Knn { point: Vec<f64>, k: usize },
}

impl Query {
    pub fn point(&self) -> &[f64] {
        match self {
            Query::Point(point) => point,
            Query::Range { point, .. } | Query::Knn { point, .. } => point,
        }
    }

    /// Numeric query type used by query-description streams: 1, 2 or 3.
    pub fn type_code(&self) -> u8 {
        match self {
            Query::Point(_) => 1,
            Query::Range { .. } => 2,
            Query::Knn { .. } => 3,
        }
    }
}

/// One refined result.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub index: u64,
    pub payload: String,
    /// Exact distance to the query point.
    pub distance: f64,
}

/// Work done by one query.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueryStats {
    /// Approximation records read during the filter phase.
    pub scanned: usize,
    /// Records that survived the filter phase.
    pub candidates: usize,
    /// Objects loaded from the store during refinement.
    pub refined: usize,
}

/// Read-only query executor over a built index.
///
/// Result order: point and range queries return matches in approximation-file
/// order (ascending object index); kNN queries return matches by ascending
/// exact distance, ties broken toward the lower object index.
pub struct QueryEngine<'a, S: ObjectStore + ?Sized> {
    quantizer: Quantizer,
    approx_path: &'a Path,
    store: &'a S,
    knn: KnnStrategy,
}

impl<'a, S: ObjectStore + ?Sized> QueryEngine<'a, S> {
    pub fn new(quantizer: Quantizer, approx_path: &'a Path, store: &'a S) -> Self {
        Self {
            quantizer,
            approx_path,
            store,
            knn: KnnStrategy::default(),
        }
    }

    pub fn with_knn_strategy(mut self, knn: KnnStrategy) -> Self {
        self.knn = knn;
        self
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    pub fn execute(&self, query: &Query) -> Result<Vec<Match>> {
        self.execute_internal(query, None)
    }

    pub fn execute_with_stats(&self, query: &Query) -> Result<(Vec<Match>, QueryStats)> {
        let mut stats = QueryStats::default();
        let matches = self.execute_internal(query, Some(&mut stats))?;
        Ok((matches, stats))
    }

    pub fn point_query(&self, point: &[f64]) -> Result<Vec<Match>> {
        self.point_internal(point, None)
    }

    pub fn range_query(&self, point: &[f64], radius: f64) -> Result<Vec<Match>> {
        self.range_internal(point, radius, None)
    }

    pub fn knn_query(&self, point: &[f64], k: usize) -> Result<Vec<Match>> {
        self.knn_internal(point, k, None)
    }

    fn execute_internal(&self, query: &Query, stats: Option<&mut QueryStats>) -> Result<Vec<Match>> {
        match query {
            Query::Point(point) => self.point_internal(point, stats),
            Query::Range { point, radius } => self.range_internal(point, *radius, stats),
            Query::Knn { point, k } => self.knn_internal(point, *k, stats),
        }
    }

    fn check_query_point(&self, point: &[f64]) -> Result<()> {
        self.quantizer.check_dim(point)?;
        if point.iter().any(|c| !c.is_finite()) {
            return Err(VaError::InvalidQuery("query coordinates must be finite"));
        }
        Ok(())
    }

    fn scan(&self) -> Result<ApproxScan> {
        ApproxScan::open(
            self.approx_path,
            self.quantizer.dim(),
            self.quantizer.bits(),
        )
    }

    fn point_internal(
        &self,
        point: &[f64],
        stats: Option<&mut QueryStats>,
    ) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        let target = self.quantizer.grid(point)?;
        let mut local = QueryStats::default();

        let mut candidates = Vec::new();
        for record in self.scan()? {
            let record = record?;
            local.scanned += 1;
            if record.cell == target {
                candidates.push(record.index);
            }
        }
        local.candidates = candidates.len();

        let mut matches = Vec::new();
        for index in candidates {
            let object = self.store.get(index)?;
            local.refined += 1;
            if points_equal(&object.point, point) {
                matches.push(Match {
                    index,
                    payload: object.payload,
                    distance: 0.0,
                });
            }
        }

        debug!(
            "point query: scanned {}, candidates {}, matches {}",
            local.scanned,
            local.candidates,
            matches.len()
        );
        if let Some(stats) = stats {
            *stats = local;
        }
        Ok(matches)
    }

    fn range_internal(
        &self,
        point: &[f64],
        radius: f64,
        stats: Option<&mut QueryStats>,
    ) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        if radius.is_nan() {
            return Err(VaError::InvalidQuery("range radius must not be NaN"));
        }
        let mut local = QueryStats::default();

        let mut candidates = Vec::new();
        for record in self.scan()? {
            let record = record?;
            local.scanned += 1;
            if self.quantizer.min_distance(point, &record.cell) <= radius {
                candidates.push(record.index);
            }
        }
        local.candidates = candidates.len();

        let mut matches = Vec::new();
        for index in candidates {
            let object = self.store.get(index)?;
            local.refined += 1;
            let exact = distance(&object.point, point);
            if exact <= radius {
                matches.push(Match {
                    index,
                    payload: object.payload,
                    distance: exact,
                });
            }
        }

        debug!(
            "range query r={radius}: scanned {}, candidates {}, matches {}",
            local.scanned,
            local.candidates,
            matches.len()
        );
        if let Some(stats) = stats {
            *stats = local;
        }
        Ok(matches)
    }

    fn knn_internal(
        &self,
        point: &[f64],
        k: usize,
        stats: Option<&mut QueryStats>,
    ) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        let mut local = QueryStats::default();
        if k == 0 {
            if let Some(stats) = stats {
                *stats = local;
            }
            return Ok(Vec::new());
        }

        let candidates = match self.knn {
            KnnStrategy::UpperBound => self.knn_filter_upper_bound(point, k, &mut local)?,
            KnnStrategy::LowerBoundCascade => self.knn_filter_cascade(point, k, &mut local)?,
        };
        local.candidates = candidates.len();

        let mut nearest: BoundedMaxHeap<String> = BoundedMaxHeap::new(k);
        for (lower_bound, index) in candidates {
            if let Some(worst) = nearest.threshold() {
                if lower_bound > worst {
                    // Candidates are sorted by lower bound; none of the rest can qualify.
                    break;
                }
            }
            let object = self.store.get(index)?;
            local.refined += 1;
            let exact = distance(&object.point, point);
            nearest.offer(exact, index, object.payload);
        }

        let matches: Vec<Match> = nearest
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, index, payload)| Match {
                index,
                payload,
                distance,
            })
            .collect();

        debug!(
            "knn query k={k}: scanned {}, candidates {}, refined {}",
            local.scanned, local.candidates, local.refined
        );
        if let Some(stats) = stats {
            *stats = local;
        }
        Ok(matches)
    }

    /// Candidates are the records whose lower bound does not exceed the `k`-th
    /// smallest cell upper bound. Returned sorted by `(lower bound, index)`.
    fn knn_filter_upper_bound(
        &self,
        point: &[f64],
        k: usize,
        stats: &mut QueryStats,
    ) -> Result<Vec<(f64, u64)>> {
        let mut upper_bounds: BoundedMaxHeap<()> = BoundedMaxHeap::new(k);
        let mut candidates = Vec::new();

        for record in self.scan()? {
            let record = record?;
            stats.scanned += 1;
            let lower = self.quantizer.min_distance(point, &record.cell);
            let upper = self.quantizer.max_distance(point, &record.cell);
            upper_bounds.offer(upper, record.index, ());
            let threshold = upper_bounds.threshold().unwrap_or(f64::INFINITY);
            if lower <= threshold {
                candidates.push((lower, record.index));
            }
        }

        // The threshold only shrinks, so early admissions may now be provably out.
        let threshold = upper_bounds.threshold().unwrap_or(f64::INFINITY);
        candidates.retain(|&(lower, _)| lower <= threshold);
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(candidates)
    }

    /// Candidates are the `k` records with the smallest lower bounds.
    fn knn_filter_cascade(
        &self,
        point: &[f64],
        k: usize,
        stats: &mut QueryStats,
    ) -> Result<Vec<(f64, u64)>> {
        let mut lowest: BoundedMaxHeap<()> = BoundedMaxHeap::new(k);
        for record in self.scan()? {
            let record = record?;
            stats.scanned += 1;
            let lower = self.quantizer.min_distance(point, &record.cell);
            lowest.offer(lower, record.index, ());
        }
        Ok(lowest
            .into_sorted_vec()
            .into_iter()
            .map(|(lower, index, ())| (lower, index))
            .collect())
    }
}

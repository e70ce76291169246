//! Exhaustive in-memory search over exact coordinates.
//!
//! Used as ground truth for the VA-file engine and as a `--linear` baseline in
//! the CLI. Result ordering matches [`QueryEngine`](crate::QueryEngine).

use std::io::BufRead;
use std::path::Path;

use rayon::prelude::*;

use crate::io::{read_records, read_records_from_reader, ObjectRecord};
use crate::math::{distance, points_equal};
use crate::query::{Match, Query};
use crate::{Result, VaError};

/// Linear-scan index holding every object in memory.
#[derive(Debug, Clone)]
pub struct LinearScanIndex {
    dim: usize,
    records: Vec<ObjectRecord>,
}

impl LinearScanIndex {
    /// Records must be sorted by ascending index.
    pub fn new(dim: usize, records: Vec<ObjectRecord>) -> Result<Self> {
        if dim == 0 {
            return Err(VaError::InvalidConfig("dimension must be positive"));
        }
        if let Some(bad) = records.iter().find(|r| r.point.len() != dim) {
            return Err(VaError::DimensionMismatch {
                expected: dim,
                got: bad.point.len(),
            });
        }
        Ok(Self { dim, records })
    }

    pub fn from_reader<R: BufRead>(reader: R, dim: usize) -> Result<Self> {
        Self::new(dim, read_records_from_reader(reader, dim)?)
    }

    pub fn load<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self> {
        Self::new(dim, read_records(path, dim)?)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ObjectRecord] {
        &self.records
    }

    pub fn execute(&self, query: &Query) -> Result<Vec<Match>> {
        match query {
            Query::Point(point) => self.point_query(point),
            Query::Range { point, radius } => self.range_query(point, *radius),
            Query::Knn { point, k } => self.knn_query(point, *k),
        }
    }

    pub fn point_query(&self, point: &[f64]) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        Ok(self
            .records
            .par_iter()
            .filter(|record| points_equal(&record.point, point))
            .map(|record| to_match(record, 0.0))
            .collect())
    }

    pub fn range_query(&self, point: &[f64], radius: f64) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        if radius.is_nan() {
            return Err(VaError::InvalidQuery("range radius must not be NaN"));
        }
        Ok(self
            .records
            .par_iter()
            .filter_map(|record| {
                let exact = distance(&record.point, point);
                (exact <= radius).then(|| to_match(record, exact))
            })
            .collect())
    }

    pub fn knn_query(&self, point: &[f64], k: usize) -> Result<Vec<Match>> {
        self.check_query_point(point)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(f64, usize)> = self
            .records
            .par_iter()
            .enumerate()
            .map(|(pos, record)| (distance(&record.point, point), pos))
            .collect();
        scored.par_sort_unstable_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(self.records[a.1].index.cmp(&self.records[b.1].index))
        });
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(exact, pos)| to_match(&self.records[pos], exact))
            .collect())
    }

    fn check_query_point(&self, point: &[f64]) -> Result<()> {
        if point.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: point.len(),
            });
        }
        if point.iter().any(|c| !c.is_finite()) {
            return Err(VaError::InvalidQuery("query coordinates must be finite"));
        }
        Ok(())
    }
}

fn to_match(record: &ObjectRecord, distance: f64) -> Match {
    Match {
        index: record.index,
        payload: record.payload.clone(),
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> LinearScanIndex {
        let input = "0.1 0.1 a\n0.2 0.2 b\n0.9 0.9 c\n0.2 0.2 d\n0.25 0.2 e\n";
        LinearScanIndex::from_reader(Cursor::new(input), 2).unwrap()
    }

    #[test]
    fn point_query_returns_every_duplicate_in_index_order() {
        let index = sample();
        let hits: Vec<u64> = index
            .point_query(&[0.2, 0.2])
            .unwrap()
            .into_iter()
            .map(|m| m.index)
            .collect();
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn knn_breaks_ties_by_index() {
        let index = sample();
        let hits: Vec<u64> = index
            .knn_query(&[0.2, 0.2], 3)
            .unwrap()
            .into_iter()
            .map(|m| m.index)
            .collect();
        assert_eq!(hits, vec![1, 3, 4]);
        assert_eq!(index.knn_query(&[0.2, 0.2], 99).unwrap().len(), 5);
        assert!(index.knn_query(&[0.2, 0.2], 0).unwrap().is_empty());
    }

    #[test]
    fn range_returns_matches_in_index_order() {
        let index = sample();
        let hits = index.range_query(&[0.1, 0.1], 0.2).unwrap();
        let payloads: Vec<&str> = hits.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["a", "b", "d", "e"]);
    }

    #[test]
    fn rejects_wrong_dimension() {
        assert!(matches!(
            sample().range_query(&[0.1], 0.5),
            Err(VaError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}

use serde::{Deserialize, Serialize};

use crate::config::{BoundKind, MAX_BITS};
use crate::math::norm_of_gaps;
use crate::{Result, VaError};

/// Grid cell containing a point: one `B`-bit code per dimension.
///
/// Code `m` on an axis identifies the half-open interval
/// `[m * 2^-B, (m + 1) * 2^-B)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCode(Vec<u16>);

impl CellCode {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u16> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u16>> for CellCode {
    fn from(codes: Vec<u16>) -> Self {
        CellCode(codes)
    }
}

/// Uniform scalar quantizer over `[0, 1)^D`.
///
/// Pure arithmetic; holds no I/O or mutable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    dim: usize,
    bits: u32,
    base: f64,
    bound: BoundKind,
}

impl Quantizer {
    pub fn new(dim: usize, bits: u32) -> Result<Self> {
        if dim == 0 {
            return Err(VaError::InvalidConfig("dimension must be positive"));
        }
        if bits == 0 || bits > MAX_BITS {
            return Err(VaError::InvalidConfig("bits must be between 1 and 16"));
        }
        Ok(Self {
            dim,
            bits,
            // Exact: a power of two is representable for every supported width.
            base: 2f64.powi(-(bits as i32)),
            bound: BoundKind::default(),
        })
    }

    pub fn with_bound(mut self, bound: BoundKind) -> Self {
        self.bound = bound;
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn bound(&self) -> BoundKind {
        self.bound
    }

    /// Width of one cell along an axis, `2^-B`.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Largest cell code, `2^B - 1`.
    pub fn max_code(&self) -> u16 {
        ((1u32 << self.bits) - 1) as u16
    }

    /// Index of the cell containing `coordinate`.
    ///
    /// Values below `base` (including negatives and NaN) map to 0; values at or
    /// above `base * (2^B - 1)` map to `2^B - 1`. Binary search over the cell
    /// boundaries, so the cost is `O(B)` comparisons.
    pub fn quantize(&self, coordinate: f64) -> u16 {
        if !(coordinate >= self.base) {
            return 0;
        }

        // Invariant: first * base <= coordinate, and the answer lies in [first, last].
        let mut first: u32 = 1;
        let mut last: u32 = self.max_code() as u32;
        while first < last {
            let mid = (first + last + 1) / 2;
            if coordinate < mid as f64 * self.base {
                last = mid - 1;
            } else {
                first = mid;
            }
        }
        first as u16
    }

    /// Quantize every coordinate of `point`.
    pub fn grid(&self, point: &[f64]) -> Result<CellCode> {
        self.check_dim(point)?;
        Ok(CellCode(point.iter().map(|&c| self.quantize(c)).collect()))
    }

    /// Lower and upper edge of cell `code` along one axis.
    #[inline]
    pub fn cell_interval(&self, code: u16) -> (f64, f64) {
        let low = code as f64 * self.base;
        (low, low + self.base)
    }

    /// Lower bound on the distance from `point` to any point inside `cell`,
    /// computed with the configured [`BoundKind`].
    pub fn min_distance(&self, point: &[f64], cell: &CellCode) -> f64 {
        debug_assert_eq!(point.len(), cell.len());
        match self.bound {
            BoundKind::NearestEdge => {
                norm_of_gaps(point.iter().zip(cell.as_slice()).map(|(&p, &code)| {
                    let (low, high) = self.cell_interval(code);
                    if p < low {
                        low - p
                    } else if p >= high {
                        p - high
                    } else {
                        0.0
                    }
                }))
            }
            BoundKind::LowerEdge => norm_of_gaps(
                point
                    .iter()
                    .zip(cell.as_slice())
                    .map(|(&p, &code)| p - self.cell_interval(code).0),
            ),
        }
    }

    /// Upper bound on the distance from `point` to any point inside `cell`.
    pub fn max_distance(&self, point: &[f64], cell: &CellCode) -> f64 {
        debug_assert_eq!(point.len(), cell.len());
        norm_of_gaps(point.iter().zip(cell.as_slice()).map(|(&p, &code)| {
            let (low, high) = self.cell_interval(code);
            (p - low).abs().max((high - p).abs())
        }))
    }

    pub(crate) fn check_dim(&self, point: &[f64]) -> Result<()> {
        if point.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: point.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::distance;

    #[test]
    fn two_bit_cells_follow_half_open_intervals() {
        let q = Quantizer::new(1, 2).unwrap();
        assert_eq!(q.base(), 0.25);
        assert_eq!(q.quantize(0.0), 0);
        assert_eq!(q.quantize(0.1), 0);
        assert_eq!(q.quantize(0.249_999), 0);
        assert_eq!(q.quantize(0.25), 1);
        assert_eq!(q.quantize(0.5), 2);
        assert_eq!(q.quantize(0.74), 2);
        assert_eq!(q.quantize(0.75), 3);
        assert_eq!(q.quantize(0.9), 3);
    }

    #[test]
    fn out_of_domain_values_are_clamped() {
        let q = Quantizer::new(1, 3).unwrap();
        assert_eq!(q.quantize(-4.0), 0);
        assert_eq!(q.quantize(f64::NAN), 0);
        assert_eq!(q.quantize(1.0), 7);
        assert_eq!(q.quantize(12.5), 7);
    }

    #[test]
    fn binary_search_agrees_with_division() {
        let q = Quantizer::new(1, 7).unwrap();
        for step in 0..10_000 {
            let c = step as f64 / 10_000.0;
            let expected = ((c / q.base()).floor() as u16).min(q.max_code());
            assert_eq!(q.quantize(c), expected, "coordinate {c}");
        }
    }

    #[test]
    fn grid_rejects_wrong_dimension() {
        let q = Quantizer::new(3, 4).unwrap();
        assert!(matches!(
            q.grid(&[0.1, 0.2]),
            Err(VaError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert_eq!(q.grid(&[0.0, 0.5, 0.99]).unwrap().as_slice(), &[0, 8, 15]);
    }

    #[test]
    fn nearest_edge_bound_is_zero_inside_cell() {
        let q = Quantizer::new(2, 2).unwrap();
        let point = [0.3, 0.6];
        let cell = q.grid(&point).unwrap();
        assert_eq!(q.min_distance(&point, &cell), 0.0);
    }

    #[test]
    fn nearest_edge_bound_never_exceeds_exact_distance() {
        let q = Quantizer::new(2, 2).unwrap();
        let query = [0.9, 0.05];
        for &x in &[0.0, 0.1, 0.26, 0.5, 0.74, 0.8, 0.999] {
            for &y in &[0.0, 0.3, 0.55, 0.99] {
                let point = [x, y];
                let cell = q.grid(&point).unwrap();
                let exact = distance(&query, &point);
                assert!(q.min_distance(&query, &cell) <= exact);
                assert!(q.max_distance(&query, &cell) >= exact);
            }
        }
    }

    #[test]
    fn lower_edge_bound_can_overestimate() {
        let q = Quantizer::new(1, 2).unwrap().with_bound(BoundKind::LowerEdge);
        // Query sits at the top of cell 0; a point in the same cell is closer
        // than the query's distance to the cell's lower edge.
        let query = [0.24];
        let point = [0.2];
        let cell = q.grid(&point).unwrap();
        assert!(q.min_distance(&query, &cell) > distance(&query, &point));
    }
}

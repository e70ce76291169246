/// Compute the squared Euclidean distance between two points.
#[inline]
pub fn l2_distance_sqr(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Exact Euclidean distance, used only on full-precision coordinates.
#[inline]
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    l2_distance_sqr(a, b).sqrt()
}

/// Componentwise exact equality of two points.
#[inline]
pub fn points_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Square root of a sum of per-dimension gaps, summed in the same order as
/// [`l2_distance_sqr`] so a bound built from smaller gaps never rounds above
/// the exact distance.
#[inline]
pub(crate) fn norm_of_gaps<I>(gaps: I) -> f64
where
    I: Iterator<Item = f64>,
{
    gaps.map(|gap| gap * gap).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_matches_pythagoras() {
        assert_eq!(distance(&[0.0, 0.0], &[0.375, 0.5]), 0.625);
        assert_eq!(distance(&[0.25, 0.75], &[0.25, 0.75]), 0.0);
    }

    #[test]
    fn equality_is_exact() {
        assert!(points_equal(&[0.1, 0.2], &[0.1, 0.2]));
        assert!(!points_equal(&[0.1, 0.2], &[0.1, 0.2 + f64::EPSILON]));
        assert!(!points_equal(&[0.1], &[0.1, 0.2]));
    }
}

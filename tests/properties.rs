//! Property-based tests for the VA-file codec and query engine.
//!
//! Invariants checked:
//! - cell codes stay in range and grow monotonically with the coordinate
//! - every coordinate lies inside the interval of its own cell
//! - cell lower bound <= exact distance <= cell upper bound
//! - range and kNN answers equal a linear scan over the same points

use std::io::Cursor;

use proptest::prelude::*;
use tempfile::tempdir;
use vafile_rs::io::format_point_line;
use vafile_rs::{distance, IndexBuilder, LinearScanIndex, MemoryObjectStore, QueryEngine, Quantizer};

mod codec_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn quantize_is_in_range_and_monotone(
            bits in 1u32..=16,
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            let quantizer = Quantizer::new(1, bits).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let q_lo = quantizer.quantize(lo);
            let q_hi = quantizer.quantize(hi);
            prop_assert!(q_hi <= quantizer.max_code());
            prop_assert!(q_lo <= q_hi, "quantize({lo}) = {q_lo} > quantize({hi}) = {q_hi}");
        }

        #[test]
        fn coordinate_lies_in_its_cell(bits in 1u32..=16, x in 0.0f64..1.0) {
            let quantizer = Quantizer::new(1, bits).unwrap();
            let code = quantizer.quantize(x);
            let (low, high) = quantizer.cell_interval(code);
            prop_assert!(low <= x && x < high, "{x} outside [{low}, {high}) for code {code}");
        }

        #[test]
        fn bounds_bracket_exact_distance(
            bits in 1u32..=12,
            query in prop::collection::vec(0.0f64..1.0, 4),
            object in prop::collection::vec(0.0f64..1.0, 4),
        ) {
            let quantizer = Quantizer::new(4, bits).unwrap();
            let cell = quantizer.grid(&object).unwrap();
            let exact = distance(&query, &object);
            let lower = quantizer.min_distance(&query, &cell);
            let upper = quantizer.max_distance(&query, &cell);
            prop_assert!(lower <= exact, "lower bound {lower} > exact {exact}");
            prop_assert!(exact <= upper, "exact {exact} > upper bound {upper}");
        }
    }
}

mod engine_props {
    use super::*;

    fn input_text(points: &[Vec<f64>]) -> String {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}\n", format_point_line(p, &format!("p{i}"))))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn filter_and_refine_matches_linear_scan(
            bits in 1u32..=6,
            points in prop::collection::vec(prop::collection::vec(0.0f64..1.0, 3), 1..60),
            query in prop::collection::vec(0.0f64..1.0, 3),
            radius in 0.0f64..0.8,
            k in 0usize..70,
        ) {
            let dir = tempdir().unwrap();
            let approx = dir.path().join("vafile.txt");
            let text = input_text(&points);
            let quantizer = Quantizer::new(3, bits).unwrap();

            let mut store = MemoryObjectStore::new();
            IndexBuilder::new(quantizer, &approx, &mut store)
                .build_from_reader(Cursor::new(text.as_bytes()))
                .unwrap();
            let engine = QueryEngine::new(quantizer, &approx, &store);
            let baseline = LinearScanIndex::from_reader(Cursor::new(text.as_bytes()), 3).unwrap();

            prop_assert_eq!(
                engine.range_query(&query, radius).unwrap(),
                baseline.range_query(&query, radius).unwrap()
            );
            prop_assert_eq!(
                engine.knn_query(&query, k).unwrap(),
                baseline.knn_query(&query, k).unwrap()
            );
            prop_assert_eq!(
                engine.point_query(&points[0]).unwrap(),
                baseline.point_query(&points[0]).unwrap()
            );
        }
    }
}

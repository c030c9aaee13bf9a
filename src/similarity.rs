//! Bounded cosine similarity between embedding vectors.
//!
//! Sums run in index order so identical inputs always produce identical
//! bits, regardless of how `ndarray` would vectorise a `dot`.

use ndarray::ArrayView1;

use crate::error::{Result, RetrievalError};

/// Signed cosine similarity in `[-1, 1]`.
///
/// Zero-magnitude vectors score `0.0`.
pub fn cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Result<f64> {
    if a.len() != b.len() {
        return Err(RetrievalError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Relevance score in `[0, 1]`.
///
/// Negative correlation is floored to `0.0`, so "opposite" and
/// "unrelated" rank the same. Use [`cosine`] when the sign matters.
pub fn score(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Result<f64> {
    cosine(a, b).map(|similarity| similarity.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};
    use proptest::prelude::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = array![1.0, 2.0, 3.0];
        let s = score(v.view(), v.view()).unwrap();
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let s = score(array![1.0, 0.0].view(), array![0.0, 1.0].view()).unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn opposite_vectors_are_clamped() {
        let a = array![1.0, 0.0];
        let b = array![-1.0, 0.0];
        assert_eq!(score(a.view(), b.view()).unwrap(), 0.0);
        assert!((cosine(a.view(), b.view()).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_magnitude_scores_zero() {
        let zero = array![0.0, 0.0, 0.0];
        let v = array![1.0, 2.0, 3.0];
        assert_eq!(score(zero.view(), v.view()).unwrap(), 0.0);
        assert_eq!(score(v.view(), zero.view()).unwrap(), 0.0);
    }

    #[test]
    fn empty_vectors_score_zero() {
        let empty: Array1<f64> = Array1::zeros(0);
        assert_eq!(score(empty.view(), empty.view()).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = score(array![1.0, 2.0].view(), array![1.0].view()).unwrap_err();
        assert_eq!(err, RetrievalError::DimensionMismatch { left: 2, right: 1 });
    }

    #[test]
    fn diagonal_scores_half_sqrt_two() {
        let s = score(array![1.0, 0.0].view(), array![1.0, 1.0].view()).unwrap();
        assert!((s - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    fn vector(len: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-1000.0f64..1000.0, len)
    }

    proptest! {
        #[test]
        fn score_stays_in_unit_range(
            (a, b) in (1usize..16).prop_flat_map(|n| (vector(n), vector(n)))
        ) {
            let s = score(Array1::from(a).view(), Array1::from(b).view()).unwrap();
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn self_similarity_is_one(v in vector(8)) {
            let v = Array1::from(v);
            prop_assume!(v.iter().any(|x| *x != 0.0));
            let s = score(v.view(), v.view()).unwrap();
            prop_assert!((s - 1.0).abs() < 1e-9);
        }

        #[test]
        fn scoring_is_deterministic(a in vector(6), b in vector(6)) {
            let (a, b) = (Array1::from(a), Array1::from(b));
            let first = score(a.view(), b.view()).unwrap();
            let second = score(a.view(), b.view()).unwrap();
            prop_assert_eq!(first.to_bits(), second.to_bits());
        }

        #[test]
        fn negative_correlation_floors_to_zero(v in vector(5)) {
            let v = Array1::from(v);
            prop_assume!(v.iter().any(|x| *x != 0.0));
            let negated = v.mapv(|x| -x);
            prop_assert_eq!(score(v.view(), negated.view()).unwrap(), 0.0);
        }
    }
}

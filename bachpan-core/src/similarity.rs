//! Cosine similarity between embeddings.

use std::fmt;

/// Reasons two embeddings cannot be compared.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// The vectors have different lengths.
    DimensionMismatch { expected: usize, got: usize },
    /// One of the vectors has zero (or non-finite) magnitude.
    DegenerateVector,
}

impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {expected}, got {got}")
            }
            Self::DegenerateVector => write!(f, "degenerate vector: zero magnitude"),
        }
    }
}

impl std::error::Error for ScoreError {}

/// Compute cosine similarity between two vectors.
///
/// Accumulates in `f64`. The result is identical for `(a, b)` and `(b, a)`:
/// every product and the final norm product are commutative and the
/// summation order does not depend on argument order.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
    if a.len() != b.len() {
        return Err(ScoreError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return Err(ScoreError::DegenerateVector);
    }
    Ok((dot / denom) as f32)
}

/// Euclidean norm, used to reject zero vectors before they reach a scorer.
pub fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Whether `v` can take part in a cosine comparison at all.
pub fn is_degenerate(v: &[f32]) -> bool {
    let m = magnitude(v);
    m == 0.0 || !m.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(seed: u32, dims: usize) -> Vec<f32> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        (0..dims)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 2000) as f32 / 1000.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn identical_vectors_score_one() {
        for seed in 1..20 {
            let v = pseudo_random(seed, 512);
            let s = cosine_similarity(&v, &v).unwrap();
            assert!((s - 1.0).abs() < 1e-6, "seed {seed}: self-similarity {s}");
        }
    }

    #[test]
    fn score_is_symmetric_bit_for_bit() {
        for seed in 1..20 {
            let a = pseudo_random(seed, 384);
            let b = pseudo_random(seed + 100, 384);
            let ab = cosine_similarity(&a, &b).unwrap();
            let ba = cosine_similarity(&b, &a).unwrap();
            assert_eq!(ab.to_bits(), ba.to_bits());
        }
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        let s = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(s.abs() < 1e-6);
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]).unwrap();
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn magnitude_does_not_affect_score() {
        let a = [0.3, 0.4, 0.5];
        let b = [3.0, 4.0, 5.0];
        let s = cosine_similarity(&a, &b).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, ScoreError::DimensionMismatch { expected: 3, got: 2 });
        let err = cosine_similarity(&[1.0], &[]).unwrap_err();
        assert!(matches!(err, ScoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn zero_vector_is_degenerate() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap_err(),
            ScoreError::DegenerateVector
        );
        assert_eq!(
            cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]).unwrap_err(),
            ScoreError::DegenerateVector
        );
        assert_eq!(
            cosine_similarity(&[], &[]).unwrap_err(),
            ScoreError::DegenerateVector
        );
    }

    #[test]
    fn nan_input_is_degenerate() {
        let err = cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, ScoreError::DegenerateVector);
    }

    #[test]
    fn degenerate_detection() {
        assert!(is_degenerate(&[0.0; 8]));
        assert!(is_degenerate(&[]));
        assert!(is_degenerate(&[f32::INFINITY, 0.0]));
        assert!(!is_degenerate(&[0.0, 1e-3]));
    }
}

//! Cosine similarity between feature vectors, clamped to [0, 1].

use crate::types::FeatureVector;

/// Score two optional feature vectors for likeness.
///
/// Missing or zero-magnitude inputs score 0. Vectors of different lengths are
/// compared over their common prefix. Negative cosine carries no meaning for
/// a decision and is clamped to 0.
pub fn score(a: Option<&FeatureVector>, b: Option<&FeatureVector>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => a.similarity(b),
        _ => 0.0,
    }
}

impl FeatureVector {
    /// Cosine similarity in [0, 1] over the shorter of the two lengths.
    pub fn similarity(&self, other: &FeatureVector) -> f32 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (a as f64, b as f64);
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom.is_nan() || denom <= 0.0 || !dot.is_finite() {
            return 0.0;
        }
        (dot / denom).clamp(0.0, 1.0) as f32
    }
}

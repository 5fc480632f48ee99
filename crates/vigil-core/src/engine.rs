//! Admit/deny decisions against the enrollment catalog.

use crate::capture::{CaptureError, ProbeSource};
use crate::enrollment::EnrollmentStore;
use crate::extractor::FeatureExtractor;
use crate::types::{AccessDecision, FeatureVector, Identity, Outcome};
use image::DynamicImage;
use std::sync::Arc;

/// Similarity a probe must strictly exceed to be admitted.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Best-scoring identity in `gallery`, earliest entry winning ties.
///
/// Every entry is scored; there is no early exit.
pub fn best_match<'a>(probe: &FeatureVector, gallery: &'a [Identity]) -> Option<(&'a Identity, f32)> {
    let mut best: Option<(&Identity, f32)> = None;
    for identity in gallery {
        let sim = probe.similarity(&identity.features);
        let better = match best {
            None => true,
            Some((_, prev)) => sim > prev,
        };
        if better {
            best = Some((identity, sim));
        }
    }
    best
}

/// Composes extraction, scoring and the threshold rule.
///
/// The engine neither records events nor notifies anyone; callers sequence
/// those steps with the returned [`AccessDecision`].
pub struct AccessDecisionEngine {
    extractor: Arc<FeatureExtractor>,
    store: Arc<EnrollmentStore>,
    threshold: f32,
}

impl AccessDecisionEngine {
    pub fn new(extractor: Arc<FeatureExtractor>, store: Arc<EnrollmentStore>, threshold: f32) -> Self {
        Self {
            extractor,
            store,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }

    /// Capture a probe from `source` and decide on it.
    pub fn decide_from(&self, source: &mut dyn ProbeSource) -> Result<(DynamicImage, AccessDecision), CaptureError> {
        let probe = source.capture()?;
        let decision = self.decide(&probe);
        Ok((probe, decision))
    }

    /// Decide on an already captured probe image.
    pub fn decide(&self, probe: &DynamicImage) -> AccessDecision {
        let features = self.extractor.extract(probe);
        if features.is_none() {
            tracing::info!("no face detected in probe");
        }
        self.decide_features(features.as_ref())
    }

    /// Decide on probe features against a snapshot of the catalog.
    pub fn decide_features(&self, probe: Option<&FeatureVector>) -> AccessDecision {
        let Some(probe) = probe else {
            return AccessDecision::denied(0.0);
        };

        let gallery = self.store.list();
        let Some((identity, similarity)) = best_match(probe, &gallery) else {
            tracing::debug!("empty enrollment catalog");
            return AccessDecision::denied(0.0);
        };
        let similarity = similarity.clamp(0.0, 1.0);

        let decision = if similarity > self.threshold {
            AccessDecision {
                outcome: Outcome::Admitted,
                matched_name: identity.name.clone(),
                similarity,
            }
        } else {
            AccessDecision::denied(similarity)
        };

        tracing::info!(
            outcome = %decision.outcome,
            name = %decision.matched_name,
            similarity = decision.similarity,
            threshold = self.threshold,
            "access decision"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageFile;
    use crate::detector::FixedRegions;
    use crate::enrollment::NoMirror;
    use crate::types::UNKNOWN_NAME;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn identity(name: &str, values: &[f32]) -> Identity {
        Identity {
            name: name.into(),
            features: FeatureVector::new(values.to_vec()),
            source_image: format!("{name}.jpg").into(),
        }
    }

    fn face(seed: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            let v = ((x * seed + y * (seed + 3)) % 256) as u8;
            Rgb([v, v, v])
        }))
    }

    fn engine(tmp: &TempDir, regions: FixedRegions, threshold: f32) -> AccessDecisionEngine {
        let extractor = Arc::new(FeatureExtractor::new(Box::new(regions)));
        let store = Arc::new(EnrollmentStore::new(tmp.path(), extractor.clone(), Arc::new(NoMirror)));
        AccessDecisionEngine::new(extractor, store, threshold)
    }

    #[test]
    fn test_best_match_scores_all_entries() {
        let probe = FeatureVector::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            identity("decoy1", &[0.0, 1.0, 0.0]),
            identity("decoy2", &[0.0, 0.0, 1.0]),
            identity("match", &[1.0, 0.0, 0.0]),
        ];
        let (best, sim) = best_match(&probe, &gallery).unwrap();
        assert_eq!(best.name, "match");
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_tie_goes_to_earliest() {
        let probe = FeatureVector::new(vec![1.0, 1.0]);
        let gallery = vec![identity("amy", &[2.0, 2.0]), identity("zed", &[1.0, 1.0])];
        let (best, _) = best_match(&probe, &gallery).unwrap();
        assert_eq!(best.name, "amy");
    }

    #[test]
    fn test_best_match_empty_gallery() {
        let probe = FeatureVector::new(vec![1.0]);
        assert!(best_match(&probe, &[]).is_none());
    }

    #[test]
    fn test_decide_admits_enrolled_face() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, FixedRegions::whole(64, 64), DEFAULT_THRESHOLD);
        engine.store().enroll("alice", &face(3)).unwrap();

        let decision = engine.decide(&face(3));
        assert_eq!(decision.outcome, Outcome::Admitted);
        assert_eq!(decision.matched_name, "alice");
        assert!((decision.similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_decide_no_face_denies_with_zero() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, FixedRegions::default(), DEFAULT_THRESHOLD);
        let decision = engine.decide(&face(3));
        assert_eq!(decision, AccessDecision::denied(0.0));
        assert_eq!(decision.matched_name, UNKNOWN_NAME);
    }

    #[test]
    fn test_decide_empty_catalog_denies() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, FixedRegions::whole(64, 64), DEFAULT_THRESHOLD);
        let decision = engine.decide(&face(3));
        assert_eq!(decision.outcome, Outcome::Denied);
        assert_eq!(decision.similarity, 0.0);
    }

    #[test]
    fn test_threshold_equal_is_denied() {
        let tmp = TempDir::new().unwrap();
        let probe_engine = engine(&tmp, FixedRegions::whole(64, 64), DEFAULT_THRESHOLD);
        probe_engine.store().enroll("bob", &face(3)).unwrap();

        let extractor = FeatureExtractor::new(Box::new(FixedRegions::whole(64, 64)));
        let probe = extractor.extract(&face(7)).unwrap();
        let exact = probe.similarity(&probe_engine.store().get("bob").unwrap().features);

        assert!(exact > 0.0);

        let at_threshold = AccessDecisionEngine::new(Arc::new(extractor), probe_engine.store.clone(), exact);
        let decision = at_threshold.decide_features(Some(&probe));
        assert_eq!(decision.outcome, Outcome::Denied);
        assert_eq!(decision.matched_name, UNKNOWN_NAME);
        // Near-miss score is still reported.
        assert!((decision.similarity - exact).abs() < 1e-6);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, FixedRegions::whole(64, 64), 0.2);
        engine.store().enroll("carol", &face(3)).unwrap();
        engine.store().enroll("dave", &face(5)).unwrap();

        let probe = face(4);
        let first = engine.decide(&probe);
        for _ in 0..5 {
            assert_eq!(engine.decide(&probe), first);
        }
    }

    #[test]
    fn test_decide_from_unreadable_probe() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, FixedRegions::whole(64, 64), DEFAULT_THRESHOLD);
        let mut source = ImageFile::new(tmp.path().join("missing.png"));
        assert!(matches!(engine.decide_from(&mut source), Err(CaptureError::Unreadable { .. })));
    }
}

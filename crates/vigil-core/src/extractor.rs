//! Face feature extraction: equalized intensity histogram of the first
//! detected face region.

use crate::detector::RegionDetector;
use crate::types::FeatureVector;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

/// Side length of the canonical face crop.
pub const CANONICAL_FACE_SIZE: u32 = 200;
/// Number of intensity histogram bins (feature vector length).
pub const HISTOGRAM_BINS: usize = 256;

/// Turns images into [`FeatureVector`]s using a region detector.
pub struct FeatureExtractor {
    detector: Box<dyn RegionDetector>,
}

impl FeatureExtractor {
    pub fn new(detector: Box<dyn RegionDetector>) -> Self {
        Self { detector }
    }

    /// Extract a feature vector from `image`.
    ///
    /// Returns `None` when no face region is found, when the first region
    /// lies outside the image, or when the detector fails.
    pub fn extract(&self, image: &DynamicImage) -> Option<FeatureVector> {
        let mut gray = image.to_luma8();
        equalize_histogram(&mut gray);

        let regions = match self.detector.detect(&gray) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(error = %e, "face detector failed");
                return None;
            }
        };

        // Detector order is authoritative: take the first region as reported.
        let region = regions.first()?;
        let Some((x, y, w, h)) = region.clip(gray.width(), gray.height()) else {
            tracing::debug!(?region, "first face region lies outside the image");
            return None;
        };

        let crop = imageops::crop_imm(&gray, x, y, w, h).to_image();
        let face = imageops::resize(&crop, CANONICAL_FACE_SIZE, CANONICAL_FACE_SIZE, FilterType::Triangle);

        let mut values = intensity_histogram(&face);
        l2_normalize(&mut values);
        Some(FeatureVector::new(values))
    }
}

/// Global histogram equalization in place (CDF remap to 0–255).
pub fn equalize_histogram(gray: &mut GrayImage) {
    let total = gray.as_raw().len();
    if total == 0 {
        return;
    }

    let mut hist = [0usize; 256];
    for &p in gray.as_raw() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0usize; 256];
    let mut running = 0usize;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = total - cdf_min;
    if denom == 0 {
        // Single intensity: nothing to spread.
        return;
    }

    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f64 * 255.0 / denom as f64;
        *slot = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// 256-bin intensity histogram as floating-point counts.
pub fn intensity_histogram(gray: &GrayImage) -> Vec<f32> {
    let mut hist = vec![0.0f32; HISTOGRAM_BINS];
    for &p in gray.as_raw() {
        hist[p as usize] += 1.0;
    }
    hist
}

/// Scale `values` to unit Euclidean length; zero vectors are left unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

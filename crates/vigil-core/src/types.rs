use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Name recorded for decisions that did not resolve to an enrolled identity.
pub const UNKNOWN_NAME: &str = "unknown";

/// Rectangular face region reported by a [`RegionDetector`](crate::RegionDetector).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl Region {
    /// Integer pixel rectangle `(x, y, w, h)` clipped to an image of the given size.
    ///
    /// Returns `None` when nothing of the region lies inside the image.
    pub fn clip(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        if !(self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()) {
            return None;
        }
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).min(image_width as f32).max(0.0)).floor() as u32;
        let y1 = ((self.y + self.height).min(image_height as f32).max(0.0)).floor() as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Normalized intensity-histogram descriptor of a face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean magnitude.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// An enrolled subject and its reference descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub features: FeatureVector,
    pub source_image: PathBuf,
}

/// Outcome of one access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Admitted,
    Denied,
}

impl Outcome {
    /// Persisted / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Admitted => "ADMITTED",
            Outcome::Denied => "DENIED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMITTED" => Some(Outcome::Admitted),
            "DENIED" => Some(Outcome::Denied),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of [`AccessDecisionEngine::decide`](crate::AccessDecisionEngine::decide).
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub outcome: Outcome,
    /// Matched identity name, or [`UNKNOWN_NAME`] when denied.
    pub matched_name: String,
    /// Best similarity found, in [0, 1], even when below threshold.
    pub similarity: f32,
}

impl AccessDecision {
    pub fn denied(similarity: f32) -> Self {
        Self {
            outcome: Outcome::Denied,
            matched_name: UNKNOWN_NAME.to_string(),
            similarity: similarity.clamp(0.0, 1.0),
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.outcome == Outcome::Admitted
    }
}

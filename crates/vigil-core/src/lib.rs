//! vigil-core — Face-based access decisions.
//!
//! Extracts an equalized intensity-histogram descriptor from the first
//! detected face region, scores it against enrolled identities with cosine
//! similarity, and admits when the best score strictly exceeds a threshold.

pub mod attempt;
pub mod capture;
pub mod config;
pub mod detector;
pub mod engine;
pub mod enrollment;
pub mod extractor;
pub mod scorer;
pub mod types;

pub use attempt::{run_attempt, AttemptError, EventSink, LogNotifier, Notifier, SinkError};
pub use capture::{CancelFlag, CaptureError, ImageFile, ProbeSource};
pub use config::Config;
pub use detector::{DetectorError, FixedRegions, RegionDetector, ScrfdDetector};
pub use engine::{AccessDecisionEngine, DEFAULT_THRESHOLD};
pub use enrollment::{EnrollError, EnrollmentStore, IdentityMirror, LoadSummary, MirrorError, NoMirror};
pub use extractor::FeatureExtractor;
pub use scorer::score;
pub use types::{AccessDecision, FeatureVector, Identity, Outcome, Region, UNKNOWN_NAME};

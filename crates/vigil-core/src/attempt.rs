//! One access attempt: capture, decide, record, notify.
//!
//! Each step is a separate collaborator so recording and notification can be
//! tested, retried or replaced independently of the decision itself.

use crate::capture::{CaptureError, ProbeSource};
use crate::engine::AccessDecisionEngine;
use crate::types::{AccessDecision, Outcome};
use chrono::Local;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("event sink: {0}")]
pub struct SinkError(pub String);

/// Destination for access events. One call per decision.
pub trait EventSink {
    fn record(&self, decision: &AccessDecision, evidence: Option<&Path>) -> Result<(), SinkError>;
}

/// Receiver of decision notifications (e-mail, chat, ...).
pub trait Notifier {
    fn notify(&self, decision: &AccessDecision, evidence: Option<&Path>) -> Result<(), String>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, decision: &AccessDecision, evidence: Option<&Path>) -> Result<(), String> {
        let evidence = evidence.map(|p| p.display().to_string());
        match decision.outcome {
            Outcome::Admitted => tracing::info!(
                name = %decision.matched_name,
                similarity = decision.similarity,
                evidence = evidence.as_deref(),
                "access admitted"
            ),
            Outcome::Denied => tracing::warn!(
                similarity = decision.similarity,
                evidence = evidence.as_deref(),
                "access denied"
            ),
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Run one attempt end to end.
///
/// A capture failure returns before anything is recorded. The probe is
/// written to `evidence_dir` when given; a failed write is logged and the
/// event is recorded without evidence. Notification failures are logged and
/// do not affect the recorded event.
pub fn run_attempt(
    engine: &AccessDecisionEngine,
    source: &mut dyn ProbeSource,
    sink: &dyn EventSink,
    notifier: &dyn Notifier,
    evidence_dir: Option<&Path>,
) -> Result<AccessDecision, AttemptError> {
    let (probe, decision) = engine.decide_from(source)?;

    let evidence = evidence_dir.and_then(|dir| match save_evidence(dir, &probe, &decision) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to store evidence image");
            None
        }
    });

    sink.record(&decision, evidence.as_deref())?;

    if let Err(e) = notifier.notify(&decision, evidence.as_deref()) {
        tracing::warn!(error = %e, "notification failed");
    }

    Ok(decision)
}

/// Write the probe as `<dir>/<timestamp>_<name>.jpg`.
pub fn save_evidence(dir: &Path, probe: &DynamicImage, decision: &AccessDecision) -> Result<PathBuf, image::ImageError> {
    fs::create_dir_all(dir).map_err(image::ImageError::IoError)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
    let path = dir.join(format!("{stamp}_{}.jpg", decision.matched_name));
    probe.to_rgb8().save_with_format(&path, ImageFormat::Jpeg)?;
    Ok(path)
}

//! Adaptive sensitivity calibration.
//!
//! The agent ships with a conservative default decision threshold. A short
//! calibration pass (15 s of ordinary wear) measures how much the wearer
//! moves at rest and replaces the default with a personalized threshold:
//! frail, mostly-still users get a hair trigger, athletic users get a high
//! bar so workouts don't page their contacts.

use crate::core::features::FeatureVector;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How long a calibration session accumulates samples.
pub const CALIBRATION_SECS: i64 = 15;

/// Decision threshold used before the first completed calibration.
pub const DEFAULT_THRESHOLD: f64 = 0.65;

/// Profile label reported before the first completed calibration.
pub const UNCALIBRATED_LABEL: &str = "Uncalibrated";

/// Whether the pipeline is watching for falls or measuring the wearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    Monitoring,
    Calibrating,
}

/// Wearer activity class derived from calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityProfile {
    Sedentary,
    Normal,
    Active,
}

impl ActivityProfile {
    /// Map the activity score (std-dev of acceleration magnitude at rest)
    /// to a profile.
    pub fn from_activity_score(score: f64) -> Self {
        if score < 0.05 {
            ActivityProfile::Sedentary
        } else if score > 0.30 {
            ActivityProfile::Active
        } else {
            ActivityProfile::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityProfile::Sedentary => "Sedentary / Frail",
            ActivityProfile::Normal => "Normal Baseline",
            ActivityProfile::Active => "Active / Athletic",
        }
    }

    /// Personalized fall-probability threshold for this profile.
    pub fn threshold(&self) -> f64 {
        match self {
            ActivityProfile::Sedentary => 0.45,
            ActivityProfile::Normal => 0.65,
            ActivityProfile::Active => 0.85,
        }
    }
}

/// Outcome of a completed calibration session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub profile: ActivityProfile,
    /// Population std-dev of acc-magnitude over the session.
    pub activity_score: f64,
}

/// Accumulator for one in-flight calibration session. Discarded on
/// completion; never persisted.
#[derive(Debug)]
struct CalibrationSession {
    started_at: DateTime<Utc>,
    features: Vec<FeatureVector>,
}

/// State machine gating calibration.
///
/// `Monitoring` ⇄ `Calibrating`; entry is commanded, exit is time-driven and
/// checked against sample timestamps on every absorbed sample rather than a
/// separate timer.
#[derive(Debug)]
pub struct CalibrationController {
    session: Option<CalibrationSession>,
    duration: Duration,
    last_progress: u8,
}

impl CalibrationController {
    pub fn new() -> Self {
        Self {
            session: None,
            duration: Duration::seconds(CALIBRATION_SECS),
            last_progress: 0,
        }
    }

    pub fn is_calibrating(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> SystemState {
        if self.is_calibrating() {
            SystemState::Calibrating
        } else {
            SystemState::Monitoring
        }
    }

    /// Begin (or restart) a calibration session. Re-entry discards any
    /// partially accumulated session.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.session = Some(CalibrationSession {
            started_at: now,
            features: Vec::with_capacity(
                (CALIBRATION_SECS as usize) * crate::core::features::SAMPLING_RATE_HZ as usize,
            ),
        });
    }

    /// Feed one feature vector into the active session.
    ///
    /// Returns `Some` exactly once per session: on the first sample whose
    /// timestamp puts the elapsed time past the calibration duration. Returns
    /// `None` while accumulating, and always when no session is active.
    pub fn absorb(
        &mut self,
        feature: &FeatureVector,
        now: DateTime<Utc>,
    ) -> Option<CalibrationResult> {
        let session = self.session.as_mut()?;
        session.features.push(*feature);

        if now - session.started_at <= self.duration {
            return None;
        }

        let session = self.session.take()?;
        self.last_progress = 100;
        Some(Self::analyze(&session.features))
    }

    /// Completion percentage: live while calibrating, otherwise the last
    /// completed value (0 before the first calibration).
    pub fn progress_percent(&self, now: DateTime<Utc>) -> u8 {
        match &self.session {
            Some(session) => {
                let elapsed = (now - session.started_at)
                    .min(self.duration)
                    .max(Duration::zero());
                let ratio = elapsed.num_milliseconds() as f64
                    / self.duration.num_milliseconds() as f64;
                (ratio * 100.0) as u8
            }
            None => self.last_progress,
        }
    }

    fn analyze(features: &[FeatureVector]) -> CalibrationResult {
        // A session shorter than two samples has no defined spread; fall back
        // to the baseline profile instead of reading noise as frailty.
        if features.len() < 2 {
            return CalibrationResult {
                profile: ActivityProfile::Normal,
                activity_score: 0.0,
            };
        }

        let magnitudes: Vec<f64> = features.iter().map(|f| f.acc_mag).collect();
        let activity_score = std_dev(&magnitudes);

        CalibrationResult {
            profile: ActivityProfile::from_activity_score(activity_score),
            activity_score,
        }
    }
}

impl Default for CalibrationController {
    fn default() -> Self {
        Self::new()
    }
}

/// Population standard deviation of a slice of values.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

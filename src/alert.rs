//! Fall decision, posture/impact summarization and alert debouncing.
//!
//! Converts a classifier probability into an alert decision: strict
//! threshold comparison, impact and posture summaries for the responder, and
//! a 30-second cooldown so overlapping inferences over the same fall cannot
//! place more than one call.

use crate::core::features::SensorSample;
use crate::core::window::SlidingWindow;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Minimum spacing between two dispatched alerts.
pub const ALERT_COOLDOWN_SECS: i64 = 30;

/// What gets spoken to the emergency contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertPayload {
    /// Peak acceleration over the window, in g, rounded to one decimal.
    pub impact: f64,
    /// Skin temperature in °C, rounded to one decimal.
    pub temperature: f64,
}

/// Body orientation inferred from the gravity-aligned accelerometer axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    LyingFaceUp,
    LyingFaceDown,
    Upright,
    UpsideDown,
    LyingOnSide,
    Unknown,
}

impl Posture {
    /// Dominant-axis heuristic: whichever axis carries the most gravity
    /// decides the orientation, its sign decides the direction.
    pub fn from_accel(ax: f64, ay: f64, az: f64) -> Self {
        let (abs_x, abs_y, abs_z) = (ax.abs(), ay.abs(), az.abs());
        if abs_z > abs_x && abs_z > abs_y {
            if az > 0.0 {
                Posture::LyingFaceUp
            } else {
                Posture::LyingFaceDown
            }
        } else if abs_y > abs_x && abs_y > abs_z {
            if ay > 0.0 {
                Posture::Upright
            } else {
                Posture::UpsideDown
            }
        } else {
            Posture::LyingOnSide
        }
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Posture::LyingFaceUp => "Lying Face Up",
            Posture::LyingFaceDown => "Lying Face Down",
            Posture::Upright => "Upright",
            Posture::UpsideDown => "Upside Down",
            Posture::LyingOnSide => "Lying on Side",
            Posture::Unknown => "Unknown",
        };
        write!(f, "{label}")
    }
}

/// Outbound boundary for triggered alerts.
///
/// The coordinator only decides; delivery happens behind this trait so the
/// sampling loop is never blocked by transport latency.
pub trait AlertDispatch: Send {
    fn dispatch(&self, alert: AlertPayload);
}

/// Hands alerts to the notifier worker over a bounded channel.
pub struct ChannelDispatch {
    sender: crossbeam_channel::Sender<AlertPayload>,
}

impl ChannelDispatch {
    pub fn new(sender: crossbeam_channel::Sender<AlertPayload>) -> Self {
        Self { sender }
    }
}

impl AlertDispatch for ChannelDispatch {
    fn dispatch(&self, alert: AlertPayload) {
        if let Err(e) = self.sender.try_send(alert) {
            tracing::warn!("alert dropped, notifier queue unavailable: {e}");
        }
    }
}

/// Used when no notifier is configured; the decision is still logged.
pub struct LogOnlyDispatch;

impl AlertDispatch for LogOnlyDispatch {
    fn dispatch(&self, alert: AlertPayload) {
        tracing::warn!(
            impact = alert.impact,
            temperature = alert.temperature,
            "emergency notifier disabled, alert not sent"
        );
    }
}

/// Result of evaluating one inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub is_fall: bool,
    /// Peak acc-magnitude over the window in g (0.0 when not a fall).
    pub impact: f64,
    pub posture: Posture,
    /// Whether an alert was handed to the dispatcher.
    pub dispatched: bool,
}

impl Decision {
    fn normal() -> Self {
        Self {
            is_fall: false,
            impact: 0.0,
            posture: Posture::Unknown,
            dispatched: false,
        }
    }
}

/// Applies the decision rule and owns the alert cooldown state.
pub struct AlertCoordinator {
    dispatch: Box<dyn AlertDispatch>,
    cooldown: Duration,
    last_alert: Option<DateTime<Utc>>,
}

impl AlertCoordinator {
    pub fn new(dispatch: Box<dyn AlertDispatch>) -> Self {
        Self {
            dispatch,
            cooldown: Duration::seconds(ALERT_COOLDOWN_SECS),
            last_alert: None,
        }
    }

    /// Evaluate one inference against the active threshold.
    ///
    /// A fall is declared only on `p_fall > threshold` (a tie does not
    /// trigger). The cooldown timestamp advances the moment a dispatch is
    /// decided, before any transport completes, so a second inference over
    /// the same fall cannot dispatch again while a call is in flight. A
    /// failed delivery therefore still consumes the cooldown window.
    pub fn evaluate(
        &mut self,
        window: &SlidingWindow,
        p_fall: f64,
        threshold: f64,
        sample: &SensorSample,
    ) -> Decision {
        if p_fall <= threshold {
            return Decision::normal();
        }

        let impact = round1(window.peak_acc_magnitude());
        let posture = Posture::from_accel(sample.ax, sample.ay, sample.az);
        let temperature = round1(sample.temperature);

        tracing::warn!("FALL! {impact:.1}G | {posture} | {temperature:.1}C");

        let now = sample.timestamp;
        let dispatched = match self.last_alert {
            None => true,
            Some(last) => now - last > self.cooldown,
        };

        if dispatched {
            self.last_alert = Some(now);
            self.dispatch.dispatch(AlertPayload {
                impact,
                temperature,
            });
        }

        Decision {
            is_fall: true,
            impact,
            posture,
            dispatched,
        }
    }

    /// Timestamp of the most recent dispatched alert, if any.
    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }
}

/// Round to one decimal place, as spoken in alerts and shown in telemetry.
pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::FeatureVector;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    struct RecordingDispatch {
        sent: Arc<Mutex<Vec<AlertPayload>>>,
    }

    impl AlertDispatch for RecordingDispatch {
        fn dispatch(&self, alert: AlertPayload) {
            self.sent.lock().unwrap().push(alert);
        }
    }

    fn recording_coordinator() -> (AlertCoordinator, Arc<Mutex<Vec<AlertPayload>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let coordinator = AlertCoordinator::new(Box::new(RecordingDispatch {
            sent: Arc::clone(&sent),
        }));
        (coordinator, sent)
    }

    fn window_with_peak(peak: f64) -> SlidingWindow {
        let mut window = SlidingWindow::with_capacity(8);
        for i in 0..8 {
            window.push(FeatureVector {
                ax: 0.0,
                ay: 1.0,
                az: 0.0,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
                altitude_delta: 0.0,
                acc_mag: if i == 3 { peak } else { 1.0 },
                gyro_mag: 0.0,
                jerk_x: 0.0,
                jerk_y: 0.0,
                jerk_z: 0.0,
            });
        }
        window
    }

    fn sample_at(secs: i64, ax: f64, ay: f64, az: f64) -> SensorSample {
        SensorSample {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            ax,
            ay,
            az,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
            temperature: 33.25,
        }
    }

    #[test]
    fn test_below_threshold_never_dispatches() {
        let (mut coordinator, sent) = recording_coordinator();
        let window = window_with_peak(4.0);

        for secs in 0..100 {
            let decision =
                coordinator.evaluate(&window, 0.60, 0.65, &sample_at(secs, 0.0, 1.0, 0.0));
            assert!(!decision.is_fall);
        }

        assert!(sent.lock().unwrap().is_empty());
        assert!(coordinator.last_alert().is_none());
    }

    #[test]
    fn test_tie_does_not_trigger() {
        let (mut coordinator, sent) = recording_coordinator();
        let decision = coordinator.evaluate(
            &window_with_peak(4.0),
            0.65,
            0.65,
            &sample_at(0, 0.0, 1.0, 0.0),
        );

        assert!(!decision.is_fall);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_second_dispatch() {
        let (mut coordinator, sent) = recording_coordinator();
        let window = window_with_peak(3.5);

        let first = coordinator.evaluate(&window, 0.9, 0.65, &sample_at(0, 0.0, 0.0, -1.0));
        assert!(first.is_fall && first.dispatched);

        // 10 seconds later: still a fall, still inside the cooldown.
        let second = coordinator.evaluate(&window, 0.9, 0.65, &sample_at(10, 0.0, 0.0, -1.0));
        assert!(second.is_fall);
        assert!(!second.dispatched);

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dispatch_resumes_after_cooldown() {
        let (mut coordinator, sent) = recording_coordinator();
        let window = window_with_peak(3.5);

        coordinator.evaluate(&window, 0.9, 0.65, &sample_at(0, 0.0, 0.0, -1.0));
        // Exactly at the boundary the cooldown still holds (strict >).
        let at_boundary =
            coordinator.evaluate(&window, 0.9, 0.65, &sample_at(30, 0.0, 0.0, -1.0));
        assert!(!at_boundary.dispatched);

        let past = coordinator.evaluate(&window, 0.9, 0.65, &sample_at(31, 0.0, 0.0, -1.0));
        assert!(past.dispatched);

        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_alert_payload_rounded() {
        let (mut coordinator, sent) = recording_coordinator();
        let decision = coordinator.evaluate(
            &window_with_peak(3.4567),
            0.9,
            0.65,
            &sample_at(0, 0.0, 1.0, 0.0),
        );

        assert!((decision.impact - 3.5).abs() < 1e-9);
        let sent = sent.lock().unwrap();
        assert!((sent[0].impact - 3.5).abs() < 1e-9);
        assert!((sent[0].temperature - 33.3).abs() < 1e-9);
    }

    #[test]
    fn test_posture_dominant_axis() {
        assert_eq!(Posture::from_accel(0.0, 0.0, -1.0), Posture::LyingFaceDown);
        assert_eq!(Posture::from_accel(0.0, 0.0, 1.0), Posture::LyingFaceUp);
        assert_eq!(Posture::from_accel(0.0, 1.0, 0.0), Posture::Upright);
        assert_eq!(Posture::from_accel(0.1, -1.0, 0.2), Posture::UpsideDown);
        assert_eq!(Posture::from_accel(1.0, 0.1, 0.1), Posture::LyingOnSide);
        // Equal-magnitude tie falls through to the side case.
        assert_eq!(Posture::from_accel(1.0, 1.0, 1.0), Posture::LyingOnSide);
    }

    #[test]
    fn test_posture_labels() {
        assert_eq!(Posture::LyingFaceDown.to_string(), "Lying Face Down");
        assert_eq!(Posture::Upright.to_string(), "Upright");
        assert_eq!(Posture::Unknown.to_string(), "Unknown");
    }
}

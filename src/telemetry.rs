//! Push events, commands and shared status for the UI surface.
//!
//! The pipeline publishes through an [`EventSink`] and never knows who is
//! listening; the server (or a test) subscribes on the other side. Commands
//! flow the opposite way over an ordinary channel.

use crate::core::calibration::{SystemState, DEFAULT_THRESHOLD, UNCALIBRATED_LABEL};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Events pushed to the telemetry/UI collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    /// Rolling heartbeat: raw accelerometer triple, every 10th sample.
    Sample { t: f64, x: f64, y: f64, z: f64 },
    /// One entry per eligible inference, fall or not.
    Movement {
        status: String,
        fall_prob: f64,
        threshold: f64,
        impact: f64,
        posture: String,
        temp: f64,
    },
    /// Once per completed calibration.
    CalibrationDone { profile: String, threshold: f64 },
}

impl UiEvent {
    /// Stable event name used for stream framing.
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::Sample { .. } => "sample",
            UiEvent::Movement { .. } => "movement",
            UiEvent::CalibrationDone { .. } => "calibration_done",
        }
    }
}

/// Commands the UI surface can issue to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin (or restart) a calibration session.
    StartCalibration,
}

/// Outbound event boundary. Implementations must never block the sampling
/// loop.
pub trait EventSink: Send {
    fn publish(&self, event: UiEvent);
}

/// Discards everything; used when no UI surface is attached.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: UiEvent) {}
}

/// Fans events out to any number of live subscribers; sends to an audience
/// of zero are silently dropped.
pub struct BroadcastSink {
    sender: broadcast::Sender<UiEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Handle for subscribing elsewhere (the HTTP server's event stream).
    pub fn sender(&self) -> broadcast::Sender<UiEvent> {
        self.sender.clone()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }
}

/// Snapshot answered by the status query.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: SystemState,
    pub profile: String,
    pub threshold: f64,
    pub progress: u8,
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            state: SystemState::Monitoring,
            profile: UNCALIBRATED_LABEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            progress: 0,
        }
    }
}

/// Status cell shared between the pipeline thread and the HTTP handlers.
pub type SharedStatus = Arc<RwLock<StatusReport>>;

pub fn shared_status() -> SharedStatus {
    Arc::new(RwLock::new(StatusReport::default()))
}

/// Identifier for this agent instance: hostname plus a short random suffix.
/// Generated fresh each call; callers keep one per process.
pub fn device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "safeguard-{}-{}",
        hostname,
        &uuid::Uuid::new_v4().to_string()[..8]
    )
}

/// Read the current status, recovering from a poisoned lock.
pub fn read_status(status: &SharedStatus) -> StatusReport {
    match status.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replace the current status, recovering from a poisoned lock.
pub fn write_status(status: &SharedStatus, report: StatusReport) {
    match status.write() {
        Ok(mut guard) => *guard = report,
        Err(poisoned) => *poisoned.into_inner() = report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let sample = UiEvent::Sample {
            t: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        assert_eq!(sample.name(), "sample");

        let done = UiEvent::CalibrationDone {
            profile: "Normal Baseline".to_string(),
            threshold: 0.65,
        };
        assert_eq!(done.name(), "calibration_done");
    }

    #[test]
    fn test_event_serialization() {
        let event = UiEvent::Movement {
            status: "NORMAL".to_string(),
            fall_prob: 0.12,
            threshold: 0.65,
            impact: 0.0,
            posture: "Unknown".to_string(),
            temp: 32.5,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"movement\""));
        assert!(json.contains("\"fall_prob\":0.12"));
        assert!(json.contains("\"posture\":\"Unknown\""));
    }

    #[test]
    fn test_status_serializes_uppercase_state() {
        let json = serde_json::to_string(&StatusReport::default()).unwrap();
        assert!(json.contains("\"state\":\"MONITORING\""));
        assert!(json.contains("\"profile\":\"Uncalibrated\""));
    }

    #[test]
    fn test_broadcast_sink_delivers() {
        let sink = BroadcastSink::new(16);
        let mut receiver = sink.sender().subscribe();

        sink.publish(UiEvent::Sample {
            t: 1.5,
            x: 0.0,
            y: 1.0,
            z: 0.0,
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.name(), "sample");
    }

    #[test]
    fn test_broadcast_sink_without_subscribers() {
        let sink = BroadcastSink::new(16);
        // Must not panic or block.
        sink.publish(UiEvent::CalibrationDone {
            profile: "Active / Athletic".to_string(),
            threshold: 0.85,
        });
    }

    #[test]
    fn test_device_id_shape() {
        let id = device_id();
        assert!(id.starts_with("safeguard-"));
        assert_ne!(id, device_id());
    }

    #[test]
    fn test_shared_status_round_trip() {
        let status = shared_status();
        let mut report = read_status(&status);
        assert_eq!(report.progress, 0);

        report.progress = 40;
        report.state = SystemState::Calibrating;
        write_status(&status, report);

        let read_back = read_status(&status);
        assert_eq!(read_back.progress, 40);
        assert_eq!(read_back.state, SystemState::Calibrating);
    }
}

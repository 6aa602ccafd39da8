//! Sample-driven orchestration of the fall-detection pipeline.
//!
//! One `Orchestrator` per device session owns every piece of mutable state:
//! the extractor's jerk memory, the sliding window, the calibration session,
//! the active profile/threshold, and the alert cooldown (inside the
//! coordinator). Samples are processed strictly in arrival order on a single
//! thread; the only work that leaves this thread is alert delivery.

use crate::alert::{round1, AlertCoordinator};
use crate::classifier::FallClassifier;
use crate::core::calibration::{
    CalibrationController, CalibrationResult, DEFAULT_THRESHOLD, UNCALIBRATED_LABEL,
};
use crate::core::features::{FeatureExtractor, SensorSample};
use crate::core::window::SlidingWindow;
use crate::stats::SharedCounters;
use crate::telemetry::{write_status, Command, EventSink, SharedStatus, StatusReport, UiEvent};
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Inference runs once per this many samples (once the window is warm),
/// trading detection latency for compute on constrained hardware.
pub const INFERENCE_STRIDE: u64 = 10;

/// A heartbeat `sample` event goes out every this many samples.
pub const SAMPLE_EVENT_STRIDE: u64 = 10;

/// Drives the pipeline for one device session.
pub struct Orchestrator {
    extractor: FeatureExtractor,
    window: SlidingWindow,
    calibration: CalibrationController,
    classifier: FallClassifier,
    alerts: AlertCoordinator,
    events: Box<dyn EventSink>,
    status: SharedStatus,
    counters: SharedCounters,
    profile_label: String,
    threshold: f64,
    samples_seen: u64,
    calibration_requested: bool,
}

impl Orchestrator {
    pub fn new(
        classifier: FallClassifier,
        alerts: AlertCoordinator,
        events: Box<dyn EventSink>,
        status: SharedStatus,
        counters: SharedCounters,
    ) -> Self {
        let orchestrator = Self {
            extractor: FeatureExtractor::new(),
            window: SlidingWindow::new(),
            calibration: CalibrationController::new(),
            classifier,
            alerts,
            events,
            status,
            counters,
            profile_label: UNCALIBRATED_LABEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            samples_seen: 0,
            calibration_requested: false,
        };
        orchestrator.publish_status(Utc::now());
        orchestrator
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn profile_label(&self) -> &str {
        &self.profile_label
    }

    /// Queue a UI command. Calibration start is applied on the next sample
    /// so session timing stays in the sample clock domain.
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartCalibration => {
                self.calibration_requested = true;
            }
        }
    }

    /// Process one sample through the full pipeline.
    pub fn process_sample(&mut self, sample: SensorSample) {
        // Boundary guard: one bad sample must never take the pipeline down.
        if !sample.is_finite() {
            tracing::warn!(timestamp = %sample.timestamp, "non-finite sample skipped");
            self.counters.record_sample_skipped();
            return;
        }

        if self.calibration_requested {
            self.calibration_requested = false;
            self.calibration.start(sample.timestamp);
            tracing::info!("calibration started");
            self.publish_status(sample.timestamp);
        }

        self.samples_seen += 1;
        self.counters.record_sample();

        let feature = self.extractor.extract(&sample);
        // The main window keeps filling during calibration so monitoring
        // resumes warm the moment the session completes.
        self.window.push(feature);

        if self.calibration.is_calibrating() {
            match self.calibration.absorb(&feature, sample.timestamp) {
                Some(result) => self.apply_calibration(result, sample.timestamp),
                None => self.publish_status(sample.timestamp),
            }
            return;
        }

        if self.samples_seen % SAMPLE_EVENT_STRIDE == 0 {
            self.events.publish(UiEvent::Sample {
                t: sample.timestamp.timestamp_millis() as f64 / 1000.0,
                x: sample.ax,
                y: sample.ay,
                z: sample.az,
            });
        }

        if self.window.is_full() && self.samples_seen % INFERENCE_STRIDE == 0 {
            self.run_inference(&sample);
        }
    }

    fn run_inference(&mut self, sample: &SensorSample) {
        let (_p_no_fall, p_fall) = self.classifier.predict(&self.window);
        self.counters.record_inference();

        let decision = self
            .alerts
            .evaluate(&self.window, p_fall, self.threshold, sample);

        if decision.is_fall {
            self.counters.record_fall();
        }
        if decision.dispatched {
            self.counters.record_alert();
        }

        let status = if decision.is_fall {
            "FALL DETECTED"
        } else {
            "NORMAL"
        };

        self.events.publish(UiEvent::Movement {
            status: status.to_string(),
            fall_prob: p_fall,
            threshold: self.threshold,
            impact: decision.impact,
            posture: decision.posture.to_string(),
            temp: round1(sample.temperature),
        });
    }

    fn apply_calibration(&mut self, result: CalibrationResult, now: DateTime<Utc>) {
        self.profile_label = result.profile.label().to_string();
        self.threshold = result.profile.threshold();
        self.counters.record_calibration();

        tracing::info!(
            profile = %self.profile_label,
            threshold = self.threshold,
            activity_score = result.activity_score,
            "calibration complete"
        );

        self.events.publish(UiEvent::CalibrationDone {
            profile: self.profile_label.clone(),
            threshold: self.threshold,
        });
        self.publish_status(now);
    }

    fn publish_status(&self, now: DateTime<Utc>) {
        write_status(
            &self.status,
            StatusReport {
                state: self.calibration.state(),
                profile: self.profile_label.clone(),
                threshold: round2(self.threshold),
                progress: self.calibration.progress_percent(now),
            },
        );
    }

    /// Consume samples and commands until shutdown.
    ///
    /// Exits when `running` clears or the sample feed disconnects. A closed
    /// command channel is tolerated (the agent may run headless).
    pub fn run(
        &mut self,
        samples: Receiver<SensorSample>,
        commands: Receiver<Command>,
        running: &AtomicBool,
    ) {
        while running.load(Ordering::SeqCst) {
            // Commands are rare; drain whatever queued up since last sample.
            while let Ok(command) = commands.try_recv() {
                self.handle_command(command);
            }

            match samples.recv_timeout(Duration::from_millis(100)) {
                Ok(sample) => self.process_sample(sample),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    tracing::info!("sample feed ended");
                    break;
                }
            }
        }
    }
}

/// Round to two decimals for status display.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

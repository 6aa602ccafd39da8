//! End-to-end tests for the sample-driven pipeline.

use chrono::{Duration, TimeZone, Utc};
use safeguard_agent::alert::{AlertCoordinator, AlertDispatch, AlertPayload};
use safeguard_agent::classifier::{
    BackendError, ClassifierBackend, FallClassifier, TensorData, TensorDtype, TensorSpec,
};
use safeguard_agent::core::features::{SensorSample, FEATURE_COUNT};
use safeguard_agent::core::window::WINDOW_SAMPLES;
use safeguard_agent::pipeline::Orchestrator;
use safeguard_agent::stats::shared_counters;
use safeguard_agent::telemetry::{read_status, shared_status, Command, EventSink, UiEvent};
use std::sync::{Arc, Mutex};

/// Backend that always answers the same probability pair.
struct FixedBackend {
    input_spec: TensorSpec,
    output_spec: TensorSpec,
    p_fall: f32,
}

impl FixedBackend {
    fn new(p_fall: f32) -> Self {
        Self {
            input_spec: TensorSpec {
                shape: vec![1, WINDOW_SAMPLES, FEATURE_COUNT],
                dtype: TensorDtype::Float32,
                quantization: None,
            },
            output_spec: TensorSpec {
                shape: vec![1, 2],
                dtype: TensorDtype::Float32,
                quantization: None,
            },
            p_fall,
        }
    }
}

impl ClassifierBackend for FixedBackend {
    fn input_spec(&self) -> &TensorSpec {
        &self.input_spec
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output_spec
    }

    fn invoke(&mut self, _input: TensorData) -> Result<TensorData, BackendError> {
        Ok(TensorData::Float32(vec![1.0 - self.p_fall, self.p_fall]))
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
struct RecordingDispatch {
    alerts: Arc<Mutex<Vec<AlertPayload>>>,
}

impl RecordingDispatch {
    fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

impl AlertDispatch for RecordingDispatch {
    fn dispatch(&self, alert: AlertPayload) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// Sample `step` ticks into the session, 10 ms apart (100 Hz).
fn sample_at(step: i64, ay: f64) -> SensorSample {
    SensorSample {
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(step * 10),
        ax: 0.0,
        ay,
        az: 0.0,
        gx: 0.0,
        gy: 0.0,
        gz: 0.0,
        temperature: 32.04,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    sink: RecordingSink,
    dispatch: RecordingDispatch,
    status: safeguard_agent::telemetry::SharedStatus,
    counters: safeguard_agent::stats::SharedCounters,
}

fn harness(classifier: FallClassifier) -> Harness {
    let sink = RecordingSink::default();
    let dispatch = RecordingDispatch::default();
    let status = shared_status();
    let counters = shared_counters();

    let orchestrator = Orchestrator::new(
        classifier,
        AlertCoordinator::new(Box::new(dispatch.clone())),
        Box::new(sink.clone()),
        status.clone(),
        counters.clone(),
    );

    Harness {
        orchestrator,
        sink,
        dispatch,
        status,
        counters,
    }
}

#[test]
fn warmup_then_inference_cadence() {
    let mut h = harness(FallClassifier::with_backend(Box::new(FixedBackend::new(
        0.1,
    ))));

    for step in 0..250 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
    }

    // Window fills at sample 200; inference at samples 200, 210, ..., 250.
    assert_eq!(h.sink.count("movement"), 6);
    // Heartbeat every 10th sample regardless of warmup.
    assert_eq!(h.sink.count("sample"), 25);

    for event in h.sink.events() {
        if let UiEvent::Movement {
            status,
            fall_prob,
            threshold,
            impact,
            posture,
            ..
        } = event
        {
            assert_eq!(status, "NORMAL");
            assert!((fall_prob - 0.1).abs() < 1e-6);
            assert!((threshold - 0.65).abs() < 1e-9);
            assert_eq!(impact, 0.0);
            assert_eq!(posture, "Unknown");
        }
    }

    assert_eq!(h.dispatch.count(), 0);
    assert_eq!(h.counters.snapshot().falls_detected, 0);
}

#[test]
fn fall_dispatches_once_per_cooldown() {
    let mut h = harness(FallClassifier::with_backend(Box::new(FixedBackend::new(
        0.9,
    ))));

    // 250 samples span 2.5 s; every inference past warmup is a fall but only
    // the first may place a call.
    for step in 0..250 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
    }

    let snapshot = h.counters.snapshot();
    assert_eq!(snapshot.falls_detected, 6);
    assert_eq!(snapshot.alerts_dispatched, 1);
    assert_eq!(h.dispatch.count(), 1);

    let movement_statuses: Vec<String> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            UiEvent::Movement { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert!(movement_statuses.iter().all(|s| s == "FALL DETECTED"));

    // Constant 1 g posture: y dominant, positive.
    if let Some(UiEvent::Movement { posture, impact, .. }) = h
        .sink
        .events()
        .into_iter()
        .find(|e| e.name() == "movement")
    {
        assert_eq!(posture, "Upright");
        assert!((impact - 1.0).abs() < 1e-9);
    } else {
        panic!("no movement event recorded");
    }
}

#[test]
fn calibration_retunes_threshold() {
    // p_fall 0.5 sits between the sedentary threshold (0.45) and the
    // default (0.65): invisible before calibration, a fall after.
    let mut h = harness(FallClassifier::with_backend(Box::new(FixedBackend::new(
        0.5,
    ))));

    let mut step = 0i64;
    for _ in 0..300 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
        step += 1;
    }
    assert_eq!(h.dispatch.count(), 0);
    let pre_movements = h.sink.count("movement");
    assert!(pre_movements > 0);

    h.orchestrator.handle_command(Command::StartCalibration);

    // Perfectly still wearer: activity score 0 -> Sedentary / Frail. The
    // session starts on the next sample and completes on the first sample
    // past the 15 s mark, 1502 samples later.
    for _ in 0..1502 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
        step += 1;
    }

    assert_eq!(h.sink.count("calibration_done"), 1);
    let done = h
        .sink
        .events()
        .into_iter()
        .find(|e| e.name() == "calibration_done")
        .unwrap();
    if let UiEvent::CalibrationDone { profile, threshold } = done {
        assert_eq!(profile, "Sedentary / Frail");
        assert!((threshold - 0.45).abs() < 1e-9);
    }

    // No movement or heartbeat events while calibrating.
    assert_eq!(h.sink.count("movement"), pre_movements);

    let report = read_status(&h.status);
    assert_eq!(report.profile, "Sedentary / Frail");
    assert!((report.threshold - 0.45).abs() < 1e-9);
    assert_eq!(report.progress, 100);

    // Monitoring resumes warm: the very next eligible inference fires.
    for _ in 0..20 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
        step += 1;
    }

    assert!(h.sink.count("movement") > pre_movements);
    assert_eq!(h.dispatch.count(), 1);
    let last_movement = h
        .sink
        .events()
        .into_iter()
        .rev()
        .find(|e| e.name() == "movement")
        .unwrap();
    if let UiEvent::Movement {
        status, threshold, ..
    } = last_movement
    {
        assert_eq!(status, "FALL DETECTED");
        assert!((threshold - 0.45).abs() < 1e-9);
    }
}

#[test]
fn calibration_restart_is_idempotent() {
    let mut h = harness(FallClassifier::disabled());

    h.orchestrator.handle_command(Command::StartCalibration);
    let mut step = 0i64;
    for _ in 0..700 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
        step += 1;
    }
    assert_eq!(h.sink.count("calibration_done"), 0);

    // Re-entry restarts the 15 s session; completion arrives once.
    h.orchestrator.handle_command(Command::StartCalibration);
    for _ in 0..1520 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
        step += 1;
    }

    assert_eq!(h.sink.count("calibration_done"), 1);
    assert_eq!(h.counters.snapshot().calibrations_completed, 1);
}

#[test]
fn degraded_classifier_never_signals() {
    let mut h = harness(FallClassifier::disabled());

    for step in 0..1000 {
        h.orchestrator.process_sample(sample_at(step, 1.0));
    }

    // Monitoring and telemetry continue; detection is off.
    assert!(h.sink.count("movement") > 0);
    assert_eq!(h.dispatch.count(), 0);
    assert_eq!(h.counters.snapshot().falls_detected, 0);

    for event in h.sink.events() {
        if let UiEvent::Movement {
            status, fall_prob, ..
        } = event
        {
            assert_eq!(status, "NORMAL");
            assert_eq!(fall_prob, 0.0);
        }
    }
}

//! Session counters for the running agent.
//!
//! Cheap atomic tallies of what the pipeline has done, shared between the
//! processing thread and whoever wants to report on it. No sensor data is
//! retained here, only counts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct SessionCounters {
    /// Samples accepted into the pipeline
    samples_processed: AtomicU64,
    /// Samples rejected at the boundary (non-finite values)
    samples_skipped: AtomicU64,
    /// Classifier invocations
    inferences_run: AtomicU64,
    /// Fall decisions (dispatched or not)
    falls_detected: AtomicU64,
    /// Alerts handed to the notifier
    alerts_dispatched: AtomicU64,
    /// Completed calibration sessions
    calibrations_completed: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub samples_processed: u64,
    pub samples_skipped: u64,
    pub inferences_run: u64,
    pub falls_detected: u64,
    pub alerts_dispatched: u64,
    pub calibrations_completed: u64,
    pub session_duration_secs: u64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self {
            samples_processed: AtomicU64::new(0),
            samples_skipped: AtomicU64::new(0),
            inferences_run: AtomicU64::new(0),
            falls_detected: AtomicU64::new(0),
            alerts_dispatched: AtomicU64::new(0),
            calibrations_completed: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_sample(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_skipped(&self) {
        self.samples_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self) {
        self.inferences_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fall(&self) {
        self.falls_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calibration(&self) {
        self.calibrations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            samples_skipped: self.samples_skipped.load(Ordering::Relaxed),
            inferences_run: self.inferences_run.load(Ordering::Relaxed),
            falls_detected: self.falls_detected.load(Ordering::Relaxed),
            alerts_dispatched: self.alerts_dispatched.load(Ordering::Relaxed),
            calibrations_completed: self.calibrations_completed.load(Ordering::Relaxed),
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for shutdown output.
    pub fn summary(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Samples processed: {}\n\
             - Samples skipped: {}\n\
             - Inferences run: {}\n\
             - Falls detected: {}\n\
             - Alerts dispatched: {}\n\
             - Calibrations completed: {}\n\
             - Session duration: {} seconds",
            snapshot.samples_processed,
            snapshot.samples_skipped,
            snapshot.inferences_run,
            snapshot.falls_detected,
            snapshot.alerts_dispatched,
            snapshot.calibrations_completed,
            snapshot.session_duration_secs
        )
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable handle to the session counters.
pub type SharedCounters = Arc<SessionCounters>;

pub fn shared_counters() -> SharedCounters {
    Arc::new(SessionCounters::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = SessionCounters::new();
        counters.record_sample();
        counters.record_sample();
        counters.record_sample_skipped();
        counters.record_inference();
        counters.record_fall();
        counters.record_alert();
        counters.record_calibration();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.samples_processed, 2);
        assert_eq!(snapshot.samples_skipped, 1);
        assert_eq!(snapshot.inferences_run, 1);
        assert_eq!(snapshot.falls_detected, 1);
        assert_eq!(snapshot.alerts_dispatched, 1);
        assert_eq!(snapshot.calibrations_completed, 1);
    }

    #[test]
    fn test_summary_contains_counts() {
        let counters = SessionCounters::new();
        counters.record_sample();

        let summary = counters.summary();
        assert!(summary.contains("Samples processed: 1"));
        assert!(summary.contains("Falls detected: 0"));
    }
}

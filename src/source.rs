//! Inbound sample feeds.
//!
//! The pipeline consumes an ordinary channel of decoded samples; how they
//! are produced is the host's business. Two feeds ship with the agent: a
//! JSONL replay of recorded sessions, and a deterministic synthetic gait for
//! demos and soak tests. Hosts with real sensor plumbing inject their own
//! sender instead.

use crate::core::features::SensorSample;
use chrono::{Duration, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

/// Channel depth for sample feeds.
const FEED_CAPACITY: usize = 1024;

/// Errors raised when opening a feed.
#[derive(Debug)]
pub enum SourceError {
    Io(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Io(msg) => write!(f, "Sample source error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A running feed. Dropping all receivers stops the producer thread; the
/// producer finishing (replay EOF) disconnects the receiver, which ends the
/// pipeline loop.
pub struct SampleFeed {
    receiver: Receiver<SensorSample>,
}

impl SampleFeed {
    pub fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }

    pub fn into_receiver(self) -> Receiver<SensorSample> {
        self.receiver
    }
}

/// Replay a recorded session from a JSONL file, one `SensorSample` per line.
///
/// Pacing follows the recorded timestamp deltas (clamped to at most one
/// second per gap). With `rebase_time`, timestamps are shifted so the replay
/// starts "now" and calibration/cooldown timing line up with wall clock;
/// without it the recorded timestamps pass through untouched.
pub fn spawn_replay(path: &Path, rebase_time: bool) -> Result<SampleFeed, SourceError> {
    let file = File::open(path).map_err(|e| {
        SourceError::Io(format!("cannot open replay file {}: {e}", path.display()))
    })?;
    let display_path: PathBuf = path.to_path_buf();

    let (sender, receiver) = bounded(FEED_CAPACITY);

    thread::spawn(move || {
        let reader = BufReader::new(file);
        let mut offset: Option<Duration> = None;
        let mut prev_timestamp = None;
        let mut line_number = 0usize;

        for line in reader.lines() {
            line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("replay read failed at line {line_number}: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let mut sample: SensorSample = match serde_json::from_str(&line) {
                Ok(sample) => sample,
                Err(e) => {
                    // Malformed lines are skipped, mirroring the pipeline's
                    // own per-sample fault handling.
                    tracing::warn!("replay line {line_number} skipped: {e}");
                    continue;
                }
            };

            if let Some(prev) = prev_timestamp {
                let gap: Duration = sample.timestamp - prev;
                let gap = gap.clamp(Duration::zero(), Duration::seconds(1));
                if let Ok(gap) = gap.to_std() {
                    thread::sleep(gap);
                }
            }
            prev_timestamp = Some(sample.timestamp);

            if rebase_time {
                let offset = *offset.get_or_insert_with(|| Utc::now() - sample.timestamp);
                sample.timestamp = sample.timestamp + offset;
            }

            if sender.send(sample).is_err() {
                break; // consumer gone
            }
        }

        tracing::info!(
            file = %display_path.display(),
            lines = line_number,
            "replay finished"
        );
    });

    Ok(SampleFeed { receiver })
}

/// Deterministic synthetic gait at 100 Hz: gravity on the y axis plus a
/// gentle walking oscillation. Useful for demos and for soak-testing the
/// pipeline without hardware.
pub fn spawn_synthetic() -> SampleFeed {
    let (sender, receiver) = bounded(FEED_CAPACITY);

    thread::spawn(move || {
        synthetic_loop(&sender);
    });

    SampleFeed { receiver }
}

fn synthetic_loop(sender: &Sender<SensorSample>) {
    let tick = std::time::Duration::from_millis(10);
    let mut step = 0u64;

    loop {
        let phase = step as f64 / 100.0;
        let sample = SensorSample {
            timestamp: Utc::now(),
            ax: 0.03 * (2.0 * std::f64::consts::PI * 1.8 * phase).sin(),
            ay: 1.0 + 0.12 * (2.0 * std::f64::consts::PI * 0.9 * phase).sin(),
            az: 0.05 * (2.0 * std::f64::consts::PI * 1.1 * phase + 0.7).sin(),
            gx: 0.2 * (2.0 * std::f64::consts::PI * 0.9 * phase).cos(),
            gy: 0.1 * (2.0 * std::f64::consts::PI * 1.8 * phase).sin(),
            gz: 0.05 * (2.0 * std::f64::consts::PI * 0.4 * phase).sin(),
            temperature: 32.5 + 0.3 * (phase / 60.0).sin(),
        };

        if sender.send(sample).is_err() {
            return; // consumer gone
        }

        step += 1;
        thread::sleep(tick);
    }
}

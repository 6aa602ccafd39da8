//! Per-sample feature extraction from raw IMU readings.
//!
//! Each incoming six-axis sample (plus skin temperature) is expanded into the
//! 12-value feature vector the fall model was trained on: the raw axes, the
//! acceleration and rotation magnitudes, and the jerk (rate of change of
//! acceleration) approximated as a rate-scaled first difference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nominal sampling rate of the wearable IMU in Hz.
pub const SAMPLING_RATE_HZ: f64 = 100.0;

/// Number of values in a feature vector.
pub const FEATURE_COUNT: usize = 12;

/// One decoded reading from the wearable: 3-axis acceleration in g,
/// 3-axis angular rate, and skin temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Timestamp assigned at acquisition. Must be monotonically increasing
    /// within a stream; jerk and cooldown timing both rely on it.
    pub timestamp: DateTime<Utc>,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub temperature: f64,
}

impl SensorSample {
    /// True when every channel holds a finite value. Samples failing this
    /// check are dropped at the pipeline boundary.
    pub fn is_finite(&self) -> bool {
        [
            self.ax,
            self.ay,
            self.az,
            self.gx,
            self.gy,
            self.gz,
            self.temperature,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// The 12 features derived from one sample, in model input order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    /// Altitude change within the window. The deployed model was trained with
    /// a per-window barometric delta in this slot; the live device has no
    /// barometer, so the pipeline feeds a constant 0.0 here.
    pub altitude_delta: f64,
    pub acc_mag: f64,
    pub gyro_mag: f64,
    pub jerk_x: f64,
    pub jerk_y: f64,
    pub jerk_z: f64,
}

impl FeatureVector {
    /// Flatten into model input order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.ax,
            self.ay,
            self.az,
            self.gx,
            self.gy,
            self.gz,
            self.altitude_delta,
            self.acc_mag,
            self.gyro_mag,
            self.jerk_x,
            self.jerk_y,
            self.jerk_z,
        ]
    }
}

/// Stateful per-sample transform.
///
/// Carries exactly one unit of memory (the previous acceleration triple) for
/// the jerk finite difference; everything else is pure. Never fails.
#[derive(Debug, Default)]
pub struct FeatureExtractor {
    prev_accel: Option<[f64; 3]>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self { prev_accel: None }
    }

    /// Clear the jerk memory, as if no sample had been seen yet.
    pub fn reset(&mut self) {
        self.prev_accel = None;
    }

    /// Expand a raw sample into its feature vector.
    ///
    /// The first sample after construction or [`reset`](Self::reset) has all
    /// three jerk components equal to zero; later samples use the
    /// rate-normalized difference `(cur - prev) * SAMPLING_RATE_HZ`.
    pub fn extract(&mut self, sample: &SensorSample) -> FeatureVector {
        let acc_mag =
            (sample.ax * sample.ax + sample.ay * sample.ay + sample.az * sample.az).sqrt();
        let gyro_mag =
            (sample.gx * sample.gx + sample.gy * sample.gy + sample.gz * sample.gz).sqrt();

        let (jerk_x, jerk_y, jerk_z) = match self.prev_accel {
            None => (0.0, 0.0, 0.0),
            Some([px, py, pz]) => (
                (sample.ax - px) * SAMPLING_RATE_HZ,
                (sample.ay - py) * SAMPLING_RATE_HZ,
                (sample.az - pz) * SAMPLING_RATE_HZ,
            ),
        };

        self.prev_accel = Some([sample.ax, sample.ay, sample.az]);

        FeatureVector {
            ax: sample.ax,
            ay: sample.ay,
            az: sample.az,
            gx: sample.gx,
            gy: sample.gy,
            gz: sample.gz,
            altitude_delta: 0.0,
            acc_mag,
            gyro_mag,
            jerk_x,
            jerk_y,
            jerk_z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_sample(ax: f64, ay: f64, az: f64) -> SensorSample {
        SensorSample {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ax,
            ay,
            az,
            gx: 0.1,
            gy: -0.2,
            gz: 0.3,
            temperature: 32.5,
        }
    }

    #[test]
    fn test_first_sample_has_zero_jerk() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&make_sample(0.5, -0.5, 1.0));

        assert_eq!(features.jerk_x, 0.0);
        assert_eq!(features.jerk_y, 0.0);
        assert_eq!(features.jerk_z, 0.0);
    }

    #[test]
    fn test_jerk_is_rate_scaled_difference() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract(&make_sample(0.0, 1.0, 0.0));
        let features = extractor.extract(&make_sample(0.1, 1.0, -0.2));

        assert!((features.jerk_x - 10.0).abs() < 1e-9);
        assert!((features.jerk_y - 0.0).abs() < 1e-9);
        assert!((features.jerk_z - -20.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_jerk_memory() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract(&make_sample(1.0, 0.0, 0.0));
        extractor.reset();
        let features = extractor.extract(&make_sample(0.0, 0.0, 1.0));

        assert_eq!(features.jerk_x, 0.0);
        assert_eq!(features.jerk_z, 0.0);
    }

    #[test]
    fn test_magnitudes() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&make_sample(3.0, 4.0, 0.0));

        assert!((features.acc_mag - 5.0).abs() < 1e-9);
        let expected_gyro = (0.01f64 + 0.04 + 0.09).sqrt();
        assert!((features.gyro_mag - expected_gyro).abs() < 1e-9);
    }

    #[test]
    fn test_altitude_slot_is_placeholder() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&make_sample(0.0, 1.0, 0.0));
        assert_eq!(features.altitude_delta, 0.0);
        assert_eq!(features.to_array()[6], 0.0);
    }

    #[test]
    fn test_non_finite_sample_detected() {
        let mut sample = make_sample(0.0, 1.0, 0.0);
        assert!(sample.is_finite());
        sample.az = f64::NAN;
        assert!(!sample.is_finite());
    }
}

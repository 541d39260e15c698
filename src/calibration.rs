use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::posture::{PostureAnalysisResult, Thresholds};

/// Degrees subtracted from the calibrated torso angle.
const TORSO_ALLOWANCE_DEG: f64 = 15.0;
/// Multiplier over the calibrated head offset.
const HEAD_ALLOWANCE_FACTOR: f64 = 1.5;

/// A user's neutral posture, captured at one calibration instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    pub torso_angle: f64,
    pub head_forward: f64,
}

impl CalibrationBaseline {
    fn is_valid(&self) -> bool {
        self.torso_angle.is_finite() && self.head_forward.is_finite()
    }
}

/// Owns the single active baseline (if any) and derives live thresholds from it.
pub struct CalibrationStore {
    path: PathBuf,
    defaults: Thresholds,
    baseline: Option<CalibrationBaseline>,
}

impl CalibrationStore {
    /// Restores a persisted baseline from `path`. Missing or corrupt storage leaves the
    /// store uncalibrated; it never fails.
    pub fn open(path: PathBuf, defaults: Thresholds) -> Self {
        let baseline = match load_baseline(&path) {
            Ok(Some(baseline)) => {
                info!("Loaded saved calibration baseline: {baseline:?}");
                Some(baseline)
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Ignoring calibration at {}: {err:#}", path.display());
                None
            }
        };

        Self {
            path,
            defaults,
            baseline,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<CalibrationBaseline> {
        self.baseline
    }

    /// Replaces the baseline with the angles in `result` and persists it before returning.
    /// On a write failure the previous baseline stays active.
    pub fn calibrate(&mut self, result: &PostureAnalysisResult) -> Result<CalibrationBaseline> {
        let baseline = CalibrationBaseline {
            torso_angle: result.torso_angle,
            head_forward: result.head_forward,
        };
        if !baseline.is_valid() {
            bail!("refusing to calibrate on a non-finite reading");
        }

        self.persist(&baseline)?;
        self.baseline = Some(baseline);
        info!("Calibration baseline set: {baseline:?}");
        Ok(baseline)
    }

    pub fn thresholds(&self) -> Thresholds {
        match self.baseline {
            Some(baseline) => Thresholds {
                torso_deg: baseline.torso_angle - TORSO_ALLOWANCE_DEG,
                head_fraction: baseline.head_forward * HEAD_ALLOWANCE_FACTOR,
            },
            None => self.defaults,
        }
    }

    fn persist(&self, baseline: &CalibrationBaseline) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(baseline)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write calibration to {}", self.path.display()))
    }
}

fn load_baseline(path: &Path) -> Result<Option<CalibrationBaseline>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration from {}", path.display()))?;
    let baseline: CalibrationBaseline =
        serde_json::from_str(&contents).context("calibration file is not a baseline object")?;
    if !baseline.is_valid() {
        bail!("calibration baseline has non-finite values");
    }
    Ok(Some(baseline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;

    const DEFAULTS: Thresholds = Thresholds {
        torso_deg: 15.0,
        head_fraction: 0.08,
    };

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("sentinel-calibration-{}", uuid::Uuid::new_v4()))
            .join("calibration.json")
    }

    fn reading(torso_angle: f64, head_forward: f64) -> PostureAnalysisResult {
        PostureAnalysisResult {
            torso_angle,
            head_forward,
            slouching: false,
            attentive: true,
            on_phone: false,
            shoulder_avg: Point2::default(),
            hip_avg: Point2::default(),
            nose: Point2::default(),
        }
    }

    #[test]
    fn uncalibrated_store_returns_defaults() {
        let store = CalibrationStore::open(scratch_path(), DEFAULTS);
        assert!(!store.is_calibrated());
        assert_eq!(store.thresholds(), DEFAULTS);
        assert_eq!(store.thresholds(), store.thresholds());
    }

    #[test]
    fn calibrated_thresholds_use_fixed_allowance() {
        let mut store = CalibrationStore::open(scratch_path(), DEFAULTS);
        store.calibrate(&reading(40.0, 0.04)).unwrap();

        let thresholds = store.thresholds();
        assert_eq!(thresholds.torso_deg, 25.0);
        assert!((thresholds.head_fraction - 0.06).abs() < 1e-12);
        assert_eq!(thresholds, store.thresholds());
    }

    #[test]
    fn recalibration_overwrites_the_baseline() {
        let path = scratch_path();
        let mut store = CalibrationStore::open(path.clone(), DEFAULTS);
        store.calibrate(&reading(40.0, 0.04)).unwrap();
        store.calibrate(&reading(30.0, 0.10)).unwrap();

        assert_eq!(
            store.baseline(),
            Some(CalibrationBaseline {
                torso_angle: 30.0,
                head_forward: 0.10
            })
        );

        let reopened = CalibrationStore::open(path, DEFAULTS);
        assert_eq!(reopened.baseline(), store.baseline());
        assert_eq!(reopened.thresholds().torso_deg, 15.0);
    }

    #[test]
    fn persisted_format_is_a_flat_object() {
        let path = scratch_path();
        let mut store = CalibrationStore::open(path.clone(), DEFAULTS);
        store.calibrate(&reading(12.5, 0.02)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["torso_angle"], 12.5);
        assert_eq!(value["head_forward"], 0.02);
    }

    #[test]
    fn corrupt_storage_stays_uncalibrated() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"torso_angle\": \"upright\"}").unwrap();

        let store = CalibrationStore::open(path, DEFAULTS);
        assert!(!store.is_calibrated());
        assert_eq!(store.thresholds(), DEFAULTS);
    }

    #[test]
    fn non_finite_reading_is_refused() {
        let mut store = CalibrationStore::open(scratch_path(), DEFAULTS);
        assert!(store.calibrate(&reading(f64::NAN, 0.01)).is_err());
        assert!(!store.is_calibrated());
    }
}

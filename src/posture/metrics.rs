use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{torso_lean_degrees, AngleError, Point2};

use super::LandmarkSet;

/// Live classification limits: torso lean in degrees, head offset as a fraction of frame width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub torso_deg: f64,
    pub head_fraction: f64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum MetricsError {
    #[error("frame width is zero")]
    ZeroWidth,
    #[error(transparent)]
    Angle(#[from] AngleError),
}

/// Posture reading for one person in one frame. Built fresh per frame, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PostureAnalysisResult {
    /// Degrees from vertical; 0 is an upright spine.
    pub torso_angle: f64,
    /// |nose.x - shoulder_mid.x| / frame width.
    pub head_forward: f64,
    pub slouching: bool,
    pub attentive: bool,
    /// May lag real time: the phone classifier answers from a cache.
    pub on_phone: bool,
    pub shoulder_avg: Point2,
    pub hip_avg: Point2,
    pub nose: Point2,
}

impl PostureAnalysisResult {
    pub fn with_phone(self, on_phone: bool) -> Self {
        Self { on_phone, ..self }
    }
}

/// Classifies one landmark set against `thresholds`. Both comparisons are strict:
/// slouching needs a lean above the limit, attentive an offset below it.
pub fn analyze_pose(
    landmarks: &LandmarkSet,
    frame_width: u32,
    thresholds: Thresholds,
) -> Result<PostureAnalysisResult, MetricsError> {
    if frame_width == 0 {
        return Err(MetricsError::ZeroWidth);
    }

    let shoulder_avg = landmarks.shoulder_midpoint();
    let hip_avg = landmarks.hip_midpoint();
    let nose = landmarks.nose();

    let torso_angle = torso_lean_degrees(hip_avg, shoulder_avg)?;
    let head_forward = (nose.x - shoulder_avg.x).abs() / f64::from(frame_width);

    Ok(PostureAnalysisResult {
        torso_angle,
        head_forward,
        slouching: torso_angle > thresholds.torso_deg,
        attentive: head_forward < thresholds.head_fraction,
        on_phone: false,
        shoulder_avg,
        hip_avg,
        nose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posture::landmarks::synthetic_pose;

    const DEFAULTS: Thresholds = Thresholds {
        torso_deg: 15.0,
        head_fraction: 0.08,
    };

    fn pose(nose: (f64, f64), shoulder: (f64, f64), hip: (f64, f64)) -> LandmarkSet {
        // Mirror each midpoint into a left/right pair 20px apart.
        synthetic_pose(
            Point2::new(nose.0, nose.1),
            [
                Point2::new(shoulder.0 - 10.0, shoulder.1),
                Point2::new(shoulder.0 + 10.0, shoulder.1),
            ],
            [
                Point2::new(hip.0 - 10.0, hip.1),
                Point2::new(hip.0 + 10.0, hip.1),
            ],
        )
    }

    #[test]
    fn upright_centered_person_is_good() {
        let landmarks = pose((100.0, 40.0), (100.0, 50.0), (100.0, 150.0));
        let result = analyze_pose(&landmarks, 320, DEFAULTS).unwrap();

        assert!(result.torso_angle.abs() < 1e-9);
        assert_eq!(result.head_forward, 0.0);
        assert!(!result.slouching);
        assert!(result.attentive);
        assert!(!result.on_phone);
        assert_eq!(result.shoulder_avg, Point2::new(100.0, 50.0));
        assert_eq!(result.hip_avg, Point2::new(100.0, 150.0));
    }

    #[test]
    fn leaning_torso_is_slouching() {
        // 45 degree lean.
        let landmarks = pose((200.0, 40.0), (200.0, 50.0), (100.0, 150.0));
        let result = analyze_pose(&landmarks, 320, DEFAULTS).unwrap();
        assert!((result.torso_angle - 45.0).abs() < 1e-9);
        assert!(result.slouching);
    }

    #[test]
    fn head_offset_is_direction_agnostic() {
        let left = pose((68.0, 40.0), (100.0, 50.0), (100.0, 150.0));
        let right = pose((132.0, 40.0), (100.0, 50.0), (100.0, 150.0));

        let l = analyze_pose(&left, 320, DEFAULTS).unwrap();
        let r = analyze_pose(&right, 320, DEFAULTS).unwrap();
        assert_eq!(l.head_forward, r.head_forward);
        assert!((l.head_forward - 0.1).abs() < 1e-12);
        assert!(!l.attentive);
    }

    #[test]
    fn threshold_comparisons_are_strict() {
        let landmarks = pose((120.0, 40.0), (200.0, 50.0), (100.0, 150.0));
        let reading = analyze_pose(&landmarks, 320, DEFAULTS).unwrap();

        let at_limit = Thresholds {
            torso_deg: reading.torso_angle,
            head_fraction: DEFAULTS.head_fraction,
        };
        assert!(!analyze_pose(&landmarks, 320, at_limit).unwrap().slouching);

        // The head comparison is strict too: an offset equal to the limit is not attentive.
        let head_limit = Thresholds {
            torso_deg: DEFAULTS.torso_deg,
            head_fraction: reading.head_forward,
        };
        assert!(!analyze_pose(&landmarks, 320, head_limit).unwrap().attentive);
    }

    #[test]
    fn collapsed_torso_has_no_reading() {
        let landmarks = pose((100.0, 40.0), (100.0, 100.0), (100.0, 100.0));
        assert_eq!(
            analyze_pose(&landmarks, 320, DEFAULTS),
            Err(MetricsError::Angle(AngleError::UndefinedAngle))
        );
    }

    #[test]
    fn zero_width_frame_is_rejected() {
        let landmarks = pose((100.0, 40.0), (100.0, 50.0), (100.0, 150.0));
        assert_eq!(analyze_pose(&landmarks, 0, DEFAULTS), Err(MetricsError::ZeroWidth));
    }

    #[test]
    fn readings_stay_in_range() {
        let cases = [
            ((10.0, 5.0), (30.0, 20.0), (0.0, 300.0)),
            ((300.0, 5.0), (250.0, 200.0), (20.0, 10.0)),
            ((0.0, 0.0), (160.0, 120.0), (161.0, 240.0)),
        ];
        for (nose, shoulder, hip) in cases {
            let result = analyze_pose(&pose(nose, shoulder, hip), 320, DEFAULTS).unwrap();
            assert!((0.0..=180.0).contains(&result.torso_angle));
            assert!(result.head_forward >= 0.0);
        }
    }
}

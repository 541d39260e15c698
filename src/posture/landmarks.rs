use serde::Deserialize;
use thiserror::Error;

use crate::geometry::{Point2, Point3};

// 33-point body model indices.
pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;

const REQUIRED_POINTS: usize = RIGHT_HIP + 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("landmark set has {0} points, need at least {REQUIRED_POINTS}")]
    TooFewPoints(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// Body landmarks for one detected person in one frame. Positions are significant,
/// so the set is validated once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<[f64; 3]>")]
pub struct LandmarkSet {
    points: Vec<Point3>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point3>) -> Result<Self, LandmarkError> {
        if points.len() < REQUIRED_POINTS {
            return Err(LandmarkError::TooFewPoints(points.len()));
        }
        if let Some(index) = points
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(LandmarkError::NonFinite(index));
        }
        Ok(Self { points })
    }

    pub fn nose(&self) -> Point2 {
        self.points[NOSE].xy()
    }

    pub fn shoulder_midpoint(&self) -> Point2 {
        self.points[LEFT_SHOULDER]
            .xy()
            .midpoint(self.points[RIGHT_SHOULDER].xy())
    }

    pub fn hip_midpoint(&self) -> Point2 {
        self.points[LEFT_HIP].xy().midpoint(self.points[RIGHT_HIP].xy())
    }
}

impl TryFrom<Vec<[f64; 3]>> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(raw: Vec<[f64; 3]>) -> Result<Self, Self::Error> {
        LandmarkSet::new(raw.into_iter().map(|[x, y, z]| Point3::new(x, y, z)).collect())
    }
}

/// Builds a landmark set with only the points the metrics read placed explicitly;
/// every other point sits at the origin.
#[cfg(test)]
pub(crate) fn synthetic_pose(
    nose: Point2,
    shoulders: [Point2; 2],
    hips: [Point2; 2],
) -> LandmarkSet {
    let mut points = vec![Point3::default(); 33];
    points[NOSE] = Point3::new(nose.x, nose.y, 0.0);
    points[LEFT_SHOULDER] = Point3::new(shoulders[0].x, shoulders[0].y, 0.0);
    points[RIGHT_SHOULDER] = Point3::new(shoulders[1].x, shoulders[1].y, 0.0);
    points[LEFT_HIP] = Point3::new(hips[0].x, hips[0].y, 0.0);
    points[RIGHT_HIP] = Point3::new(hips[1].x, hips[1].y, 0.0);
    LandmarkSet::new(points).expect("synthetic pose is complete")
}

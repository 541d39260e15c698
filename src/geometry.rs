//! Plane geometry over landmark coordinates. Image space: x grows right, y grows down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum AngleError {
    /// One of the two segments has zero length, so no direction is defined.
    #[error("undefined angle: degenerate segment")]
    UndefinedAngle,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point2) -> Point2 {
        Point2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn sub(self, other: Point2) -> Point2 {
        Point2::new(self.x - other.x, self.y - other.y)
    }

    pub fn dot(self, other: Point2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// A landmark coordinate: x, y in frame pixels, z relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Angle in degrees at `p2` between the incoming segment `p1 -> p2` and the outgoing
/// segment `p2 -> p3`. Collinear, same-direction segments give 0; a full reversal gives 180.
pub fn angle_at(p1: Point2, p2: Point2, p3: Point2) -> Result<f64, AngleError> {
    let incoming = p2.sub(p1);
    let outgoing = p3.sub(p2);
    let lengths = incoming.norm() * outgoing.norm();

    if !lengths.is_finite() || lengths <= f64::EPSILON {
        return Err(AngleError::UndefinedAngle);
    }

    // Rounding can push the cosine a hair outside [-1, 1].
    let cosine = (incoming.dot(outgoing) / lengths).clamp(-1.0, 1.0);
    Ok(cosine.acos().to_degrees())
}

/// Lean of the `hip -> shoulder` vector away from straight up, in degrees.
pub fn torso_lean_degrees(hip: Point2, shoulder: Point2) -> Result<f64, AngleError> {
    let vertical_top = Point2::new(shoulder.x, shoulder.y - 1.0);
    angle_at(hip, shoulder, vertical_top)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn straight_line_is_zero_degrees() {
        let angle = angle_at(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        )
        .unwrap();
        assert!(close(angle, 0.0));
    }

    #[test]
    fn right_turn_is_ninety_degrees() {
        let angle = angle_at(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 5.0),
        )
        .unwrap();
        assert!(close(angle, 90.0));
    }

    #[test]
    fn reversal_is_one_eighty() {
        let angle = angle_at(
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(1.0, 0.0),
        )
        .unwrap();
        assert!(close(angle, 180.0));
    }

    #[test]
    fn duplicate_points_are_undefined() {
        let p = Point2::new(4.0, 4.0);
        assert_eq!(
            angle_at(p, p, Point2::new(9.0, 9.0)),
            Err(AngleError::UndefinedAngle)
        );
        assert_eq!(
            angle_at(Point2::new(0.0, 0.0), p, p),
            Err(AngleError::UndefinedAngle)
        );
    }

    #[test]
    fn upright_torso_has_no_lean() {
        let lean = torso_lean_degrees(Point2::new(100.0, 150.0), Point2::new(100.0, 50.0)).unwrap();
        assert!(close(lean, 0.0));
    }

    #[test]
    fn forty_five_degree_lean() {
        let lean = torso_lean_degrees(Point2::new(100.0, 150.0), Point2::new(200.0, 50.0)).unwrap();
        assert!(close(lean, 45.0));
    }

    #[test]
    fn shoulder_on_top_edge_is_still_defined() {
        let lean = torso_lean_degrees(Point2::new(10.0, 80.0), Point2::new(10.0, 0.0)).unwrap();
        assert!(close(lean, 0.0));
    }

    #[test]
    fn lean_stays_within_bounds() {
        let hip = Point2::new(50.0, 50.0);
        for (dx, dy) in [(1.0, 0.0), (0.0, 1.0), (-3.0, -2.0), (7.0, 9.0), (-0.5, 4.0)] {
            let lean = torso_lean_degrees(hip, Point2::new(hip.x + dx, hip.y + dy)).unwrap();
            assert!((0.0..=180.0).contains(&lean), "lean {lean} out of range");
        }
    }
}

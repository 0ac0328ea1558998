// THEORY:
// `Point` is the smallest unit of the engine: a position or a displacement in
// the 2-D world plane. It is used for both because every routine in the engine
// treats them the same way (add, subtract, scale, measure), the same way the
// vision engine used one `(f64, f64)` for centers of mass and velocities alike.
//
// Key principles:
// 1.  **Plain value**: `Copy`, no invariants, no identity.
// 2.  **Safe normalization**: a zero-length vector normalizes to zero instead of
//     NaN, so direction averaging in the sensor never poisons its state.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector at `angle` radians from the +X axis.
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn distance(self, other: Point) -> f64 {
        (other - self).length()
    }

    pub fn distance_squared(self, other: Point) -> f64 {
        (other - self).length_squared()
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3-D cross product.
    pub fn cross(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Returns the unit vector, or zero for a zero vector.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 { self / len } else { Point::ZERO }
    }

    /// Rotates counter-clockwise by `angle` radians about the origin.
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Mirrors the vector across the line whose unit normal is `normal`.
    pub fn reflected(self, normal: Point) -> Self {
        self - normal * (2.0 * self.dot(normal))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Arithmetic mean; `None` for an empty slice.
    pub fn mean(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Point::ZERO, |acc, p| acc + *p);
        Some(sum / points.len() as f64)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Point {
    fn sub_assign(&mut self, rhs: Point) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;
    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn zero_vector_normalizes_to_zero() {
        assert_eq!(Point::ZERO.normalized(), Point::ZERO);
        let unit = Point::new(3.0, 4.0).normalized();
        assert!((unit.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_is_counter_clockwise() {
        let p = Point::new(1.0, 0.0).rotated(FRAC_PI_2);
        assert!(p.x.abs() < 1e-12);
        assert!((p.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reflection_flips_normal_component() {
        let v = Point::new(2.0, -3.0);
        let r = v.reflected(Point::new(0.0, 1.0));
        assert_eq!(r, Point::new(2.0, 3.0));
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert!(Point::mean(&[]).is_none());
        let m = Point::mean(&[Point::new(0.0, 0.0), Point::new(2.0, 4.0)]).unwrap();
        assert_eq!(m, Point::new(1.0, 2.0));
    }
}

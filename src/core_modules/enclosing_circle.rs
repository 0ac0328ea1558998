// THEORY:
// Smallest enclosing circle by Welzl's randomized incremental method, written as
// three nested loops instead of recursion. The input is shuffled first with the
// caller's random source: expected linear time comes from the permutation, and
// passing the source in keeps every run reproducible from its seed.
//
// A circle through three collinear support points does not exist. That case
// yields an infinite radius centred at the origin, and callers must guard it.

use crate::core_modules::point::Point;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

const CONTAINMENT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub fn contains(&self, p: Point) -> bool {
        self.center.distance(p) <= self.radius + CONTAINMENT_TOLERANCE
    }

    pub fn is_finite(&self) -> bool {
        self.center.is_finite() && self.radius.is_finite()
    }

    fn from_two(a: Point, b: Point) -> Self {
        let center = (a + b) / 2.0;
        Circle { center, radius: center.distance(a) }
    }

    fn from_three(a: Point, b: Point, c: Point) -> Self {
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d == 0.0 {
            return Circle { center: Point::ZERO, radius: f64::INFINITY };
        }
        let a_sq = a.length_squared();
        let b_sq = b.length_squared();
        let c_sq = c.length_squared();
        let center = Point::new(
            (a_sq * (b.y - c.y) + b_sq * (c.y - a.y) + c_sq * (a.y - b.y)) / d,
            (a_sq * (c.x - b.x) + b_sq * (a.x - c.x) + c_sq * (b.x - a.x)) / d,
        );
        Circle { center, radius: center.distance(a) }
    }
}

/// Returns `None` only for an empty input.
pub fn smallest_enclosing_circle<R: Rng + ?Sized>(points: &[Point], rng: &mut R) -> Option<Circle> {
    let mut shuffled = points.to_vec();
    shuffled.shuffle(rng);

    let first = *shuffled.first()?;
    let mut circle = Circle { center: first, radius: 0.0 };

    for i in 1..shuffled.len() {
        let pi = shuffled[i];
        if circle.contains(pi) {
            continue;
        }
        circle = Circle { center: pi, radius: 0.0 };
        for j in 0..i {
            let pj = shuffled[j];
            if circle.contains(pj) {
                continue;
            }
            circle = Circle::from_two(pi, pj);
            for &pk in &shuffled[..j] {
                if !circle.contains(pk) {
                    circle = Circle::from_three(pi, pj, pk);
                }
            }
        }
    }
    Some(circle)
}

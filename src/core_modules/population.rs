// THEORY:
// The `population` module holds the tracked points and everything they do on
// their own. Each `TrackedPoint` lives in the area's frame: it keeps an offset
// from the area's frame origin, and its world position is recomputed from that
// offset every step.
//
// Key principles:
// 1.  **Two motion modes**: in rigid mode the offset never changes, so points
//     ride along with the area (and turn with the rectangle). In walk mode each
//     point runs its own random walk inside the shape and bounces off the
//     shape's boundary with a small random turn so it cannot stick to a wall.
// 2.  **Blinking is independent of motion**: every point runs a two-phase
//     `VisibilityTimer` no matter how it moves. It starts Hidden, and whenever a
//     phase runs out it flips and draws a fresh duration for the new phase.
// 3.  **Sampling, not fairness**: initial scattering follows fixed recipes
//     (angle and radius for a circle, rejection sampling for a polygon). The
//     circle recipe is denser near the center. That bias is kept on purpose.

use crate::config::{PointMotion, SimulationConfig, VisibilityDistribution};
use crate::core_modules::area::{Area, Shape};
use crate::core_modules::geometry::{
    Bounds, point_in_polygon, point_segment_distance, segment_intersection,
};
use crate::core_modules::point::Point;
use rand::Rng;
use serde::Serialize;
use std::f64::consts::{PI, TAU};
use tracing::warn;

/// Points keep this far from the circle and rectangle boundary.
const BOUNDARY_MARGIN: f64 = 5.0;
const MAX_SAMPLING_ATTEMPTS: usize = 100;
const HIDDEN_EXPONENTIAL_RATE: f64 = 0.5;
/// Total spread of the turn applied after a wall bounce.
const BOUNCE_JITTER: f64 = 0.1 * PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Phase-duration distributions shared by every point of a population.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityRules {
    pub hidden_distribution: VisibilityDistribution,
    pub max_visible_time: f64,
    pub max_hidden_time: f64,
}

impl VisibilityRules {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            hidden_distribution: config.hidden_distribution,
            max_visible_time: config.max_visible_time,
            max_hidden_time: config.max_hidden_time,
        }
    }

    fn draw<R: Rng + ?Sized>(&self, phase: Visibility, rng: &mut R) -> f64 {
        match phase {
            Visibility::Visible => rng.random_range(0.0..=self.max_visible_time),
            Visibility::Hidden => match self.hidden_distribution {
                VisibilityDistribution::Uniform => rng.random_range(0.0..=self.max_hidden_time),
                VisibilityDistribution::Exponential => {
                    let u: f64 = rng.random();
                    -(1.0 - u).ln() / HIDDEN_EXPONENTIAL_RATE
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisibilityTimer {
    phase: Visibility,
    remaining: f64,
}

impl VisibilityTimer {
    pub fn new<R: Rng + ?Sized>(rules: &VisibilityRules, rng: &mut R) -> Self {
        Self { phase: Visibility::Hidden, remaining: rules.draw(Visibility::Hidden, rng) }
    }

    pub fn update<R: Rng + ?Sized>(&mut self, dt: f64, rules: &VisibilityRules, rng: &mut R) {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.phase = match self.phase {
                Visibility::Hidden => Visibility::Visible,
                Visibility::Visible => Visibility::Hidden,
            };
            self.remaining = rules.draw(self.phase, rng);
        }
    }

    pub fn phase(&self) -> Visibility {
        self.phase
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }
}

#[derive(Debug, Clone)]
pub struct TrackedPoint {
    position: Point,
    /// Offset in the area's frame.
    offset: Point,
    /// Walk velocity in the area's frame.
    velocity: Point,
    walk_remaining: f64,
    timer: VisibilityTimer,
}

impl TrackedPoint {
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn visibility(&self) -> Visibility {
        self.timer.phase()
    }

    pub fn is_visible(&self) -> bool {
        self.timer.phase() == Visibility::Visible
    }
}

pub struct PointPopulation {
    points: Vec<TrackedPoint>,
    motion: PointMotion,
    max_speed: f64,
    max_walk_time: f64,
    rules: VisibilityRules,
}

impl PointPopulation {
    /// Places `config.point_count` points inside the area's current shape.
    pub fn scatter<R: Rng + ?Sized>(area: &Area, config: &SimulationConfig, rng: &mut R) -> Self {
        let offsets: Vec<Point> = (0..config.point_count).map(|_| sample_offset(area, rng)).collect();
        Self::with_offsets(area, config, offsets, rng)
    }

    /// Places one point per offset in the area's frame. `config.point_count`
    /// is ignored.
    pub fn with_offsets<R: Rng + ?Sized>(
        area: &Area,
        config: &SimulationConfig,
        offsets: impl IntoIterator<Item = Point>,
        rng: &mut R,
    ) -> Self {
        let rules = VisibilityRules::from_config(config);
        let mut population = Self {
            points: Vec::with_capacity(config.point_count),
            motion: config.point_motion,
            max_speed: config.point_max_speed,
            max_walk_time: config.point_max_walk_time,
            rules,
        };

        for offset in offsets {
            let mut point = TrackedPoint {
                position: area.to_world(offset),
                offset,
                velocity: Point::ZERO,
                walk_remaining: 0.0,
                timer: VisibilityTimer::new(&rules, rng),
            };
            if population.motion == PointMotion::RandomWalk {
                population.start_new_walk(&mut point, rng);
            }
            population.points.push(point);
        }
        population
    }

    /// Moves every point for one step, then advances its visibility timer.
    pub fn update<R: Rng + ?Sized>(&mut self, area: &Area, dt: f64, rng: &mut R) {
        let mut points = std::mem::take(&mut self.points);
        for point in points.iter_mut() {
            if self.motion == PointMotion::RandomWalk {
                point.walk_remaining -= dt;
                if point.walk_remaining <= 0.0 {
                    self.start_new_walk(point, rng);
                }
                walk(point, area, dt, rng);
            }
            point.position = area.to_world(point.offset);
            point.timer.update(dt, &self.rules, rng);
        }
        self.points = points;
    }

    pub fn points(&self) -> &[TrackedPoint] {
        &self.points
    }

    pub fn positions(&self) -> Vec<Point> {
        self.points.iter().map(TrackedPoint::position).collect()
    }

    pub fn visible_positions(&self) -> Vec<Point> {
        self.points
            .iter()
            .filter(|p| p.is_visible())
            .map(TrackedPoint::position)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn start_new_walk<R: Rng + ?Sized>(&self, point: &mut TrackedPoint, rng: &mut R) {
        let speed = rng.random_range(0.0..=self.max_speed);
        let heading = rng.random_range(0.0..TAU);
        point.velocity = Point::from_angle(heading) * speed;
        point.walk_remaining = rng.random_range(0.0..=self.max_walk_time);
    }
}

fn sample_offset<R: Rng + ?Sized>(area: &Area, rng: &mut R) -> Point {
    match area.shape() {
        Shape::Circle { radius, .. } => {
            let angle = rng.random_range(0.0..TAU);
            let distance = rng.random_range(0.0..=(radius - BOUNDARY_MARGIN).max(0.0));
            Point::from_angle(angle) * distance
        }
        Shape::Rectangle { width, height, .. } => {
            let half_width = (width / 2.0 - BOUNDARY_MARGIN).max(0.0);
            let half_height = (height / 2.0 - BOUNDARY_MARGIN).max(0.0);
            Point::new(
                (rng.random::<f64>() * 2.0 - 1.0) * half_width,
                (rng.random::<f64>() * 2.0 - 1.0) * half_height,
            )
        }
        Shape::Polygon { vertices, anchor } => {
            let Some(bounds) = Bounds::from_points(vertices) else {
                return Point::ZERO;
            };
            let mut candidate = *anchor;
            for _ in 0..MAX_SAMPLING_ATTEMPTS {
                candidate = Point::new(
                    bounds.min.x + rng.random::<f64>() * bounds.width(),
                    bounds.min.y + rng.random::<f64>() * bounds.height(),
                );
                if point_in_polygon(candidate, vertices) {
                    return candidate - *anchor;
                }
            }
            warn!(attempts = MAX_SAMPLING_ATTEMPTS, "point sampling exhausted, keeping last candidate");
            candidate - *anchor
        }
    }
}

/// Integrates one walk step in the area's frame, bouncing off the shape.
fn walk<R: Rng + ?Sized>(point: &mut TrackedPoint, area: &Area, dt: f64, rng: &mut R) {
    let mut next = point.offset + point.velocity * dt;

    let bounced = match area.shape() {
        Shape::Circle { radius, .. } => {
            let limit = (radius - BOUNDARY_MARGIN).max(0.0);
            if next.length() > limit {
                let normal = next.normalized();
                next = normal * limit;
                point.velocity = point.velocity.reflected(normal);
                true
            } else {
                false
            }
        }
        Shape::Rectangle { width, height, .. } => {
            let half_width = (width / 2.0 - BOUNDARY_MARGIN).max(0.0);
            let half_height = (height / 2.0 - BOUNDARY_MARGIN).max(0.0);
            let hit_x = clamp_axis(&mut next.x, half_width, &mut point.velocity.x);
            let hit_y = clamp_axis(&mut next.y, half_height, &mut point.velocity.y);
            hit_x || hit_y
        }
        Shape::Polygon { vertices, anchor } => {
            let from = *anchor + point.offset;
            let to = *anchor + next;
            if point_in_polygon(to, vertices) {
                false
            } else {
                let boundary = closest_crossing(from, to, vertices).unwrap_or(from);
                next = boundary - *anchor;
                let normal = nearest_edge_normal(boundary, vertices);
                point.velocity = point.velocity.reflected(normal);
                true
            }
        }
    };

    if bounced {
        let turn = rng.random::<f64>() * BOUNCE_JITTER - BOUNCE_JITTER / 2.0;
        point.velocity = point.velocity.rotated(turn);
    }
    point.offset = next;
}

/// Clamps one local coordinate into `[-half, half]`, negating the velocity on a hit.
fn clamp_axis(value: &mut f64, half: f64, velocity: &mut f64) -> bool {
    if *value < -half {
        *value = -half;
    } else if *value > half {
        *value = half;
    } else {
        return false;
    }
    *velocity = -*velocity;
    true
}

fn closest_crossing(from: Point, to: Point, ring: &[Point]) -> Option<Point> {
    let n = ring.len();
    (0..n)
        .filter_map(|i| segment_intersection(from, to, ring[i], ring[(i + 1) % n]))
        .min_by(|a, b| from.distance_squared(*a).total_cmp(&from.distance_squared(*b)))
}

fn nearest_edge_normal(p: Point, ring: &[Point]) -> Point {
    let n = ring.len();
    (0..n)
        .map(|i| (ring[i], ring[(i + 1) % n]))
        .min_by(|(a1, b1), (a2, b2)| {
            point_segment_distance(p, *a1, *b1).total_cmp(&point_segment_distance(p, *a2, *b2))
        })
        .map(|(a, b)| {
            let edge = b - a;
            Point::new(-edge.y, edge.x).normalized()
        })
        .unwrap_or(Point::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShapeKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn polygon_config() -> SimulationConfig {
        SimulationConfig {
            shape: ShapeKind::Polygon,
            vertices: vec![
                Point::new(400.0, 400.0),
                Point::new(700.0, 400.0),
                Point::new(700.0, 700.0),
                Point::new(550.0, 550.0),
                Point::new(400.0, 700.0),
            ],
            ..Default::default()
        }
    }

    fn inside_or_on_edge(p: Point, ring: &[Point]) -> bool {
        let n = ring.len();
        point_in_polygon(p, ring)
            || (0..n).any(|i| point_segment_distance(p, ring[i], ring[(i + 1) % n]) < 1e-6)
    }

    #[test]
    fn timer_starts_hidden_and_flips() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rules = VisibilityRules::from_config(&SimulationConfig::default());
        let mut timer = VisibilityTimer::new(&rules, &mut rng);
        assert_eq!(timer.phase(), Visibility::Hidden);
        assert!(timer.remaining() <= 5.0);

        let before = timer.remaining();
        timer.update(before + 0.001, &rules, &mut rng);
        assert_eq!(timer.phase(), Visibility::Visible);
        assert!(timer.remaining() <= 2.0);
    }

    #[test]
    fn exponential_hidden_durations_are_non_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let rules = VisibilityRules {
            hidden_distribution: VisibilityDistribution::Exponential,
            max_visible_time: 2.0,
            max_hidden_time: 5.0,
        };
        let draws: Vec<f64> = (0..2000).map(|_| rules.draw(Visibility::Hidden, &mut rng)).collect();
        assert!(draws.iter().all(|d| *d >= 0.0 && d.is_finite()));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.0).abs() < 0.3, "mean {mean}");
    }

    #[test]
    fn circle_scatter_respects_margin() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = SimulationConfig { point_count: 200, ..Default::default() };
        let area = Area::from_config(&config).unwrap();
        let population = PointPopulation::scatter(&area, &config, &mut rng);
        assert_eq!(population.len(), 200);
        for p in population.points() {
            assert!(p.position().distance(config.center()) <= config.radius - BOUNDARY_MARGIN + 1e-9);
            assert_eq!(p.visibility(), Visibility::Hidden);
        }
    }

    #[test]
    fn explicit_offsets_follow_the_frame() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let config = SimulationConfig::default();
        let area = Area::from_config(&config).unwrap();
        let offsets = [Point::ZERO, Point::new(10.0, -20.0)];
        let population = PointPopulation::with_offsets(&area, &config, offsets, &mut rng);
        assert_eq!(population.len(), 2);
        assert_eq!(population.positions(), vec![config.center(), config.center() + offsets[1]]);
    }

    #[test]
    fn polygon_scatter_lands_inside() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let config = SimulationConfig { point_count: 100, ..polygon_config() };
        let area = Area::from_config(&config).unwrap();
        let population = PointPopulation::scatter(&area, &config, &mut rng);
        assert!(population.positions().iter().all(|p| point_in_polygon(*p, &config.vertices)));
    }

    #[test]
    fn rigid_points_turn_with_the_rectangle() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let config = SimulationConfig {
            shape: ShapeKind::Rectangle,
            area_max_speed: 0.0,
            ..Default::default()
        };
        let mut area = Area::from_config(&config).unwrap();
        let mut population = PointPopulation::scatter(&area, &config, &mut rng);
        area.start_new_random_walk(&mut rng);
        for _ in 0..50 {
            area.update(0.016);
            population.update(&area, 0.016, &mut rng);
        }
        for p in population.points() {
            let expected = area.frame_origin() + p.offset().rotated(area.angle());
            assert!(p.position().distance(expected) < 1e-9);
            assert!(p.position().distance(config.center()) - p.offset().length() < 1e-9);
        }
    }

    #[test]
    fn walking_points_stay_inside_every_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        for shape in [ShapeKind::Circle, ShapeKind::Rectangle, ShapeKind::Polygon] {
            let config = SimulationConfig {
                shape,
                point_motion: PointMotion::RandomWalk,
                point_max_speed: 400.0,
                area_max_speed: 0.0,
                area_max_angular_speed: 0.0,
                ..polygon_config()
            };
            let area = Area::from_config(&config).unwrap();
            let mut population = PointPopulation::scatter(&area, &config, &mut rng);
            for _ in 0..400 {
                population.update(&area, 0.016, &mut rng);
                for p in population.points() {
                    let ok = match area.shape() {
                        Shape::Circle { center, radius } => {
                            p.position().distance(*center) <= radius - BOUNDARY_MARGIN + 1e-9
                        }
                        Shape::Rectangle { width, height, .. } => {
                            p.offset().x.abs() <= width / 2.0 - BOUNDARY_MARGIN + 1e-9
                                && p.offset().y.abs() <= height / 2.0 - BOUNDARY_MARGIN + 1e-9
                        }
                        Shape::Polygon { vertices, .. } => inside_or_on_edge(p.position(), vertices),
                    };
                    assert!(ok, "{shape}: point escaped to {:?}", p.position());
                }
            }
        }
    }

    #[test]
    fn visible_positions_track_phase() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let config = SimulationConfig { max_hidden_time: 0.01, ..Default::default() };
        let area = Area::from_config(&config).unwrap();
        let mut population = PointPopulation::scatter(&area, &config, &mut rng);
        assert!(population.visible_positions().is_empty());
        population.update(&area, 0.02, &mut rng);
        assert_eq!(population.visible_positions().len(), population.len());
    }
}

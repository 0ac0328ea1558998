// THEORY:
// The `sensor` module is the heart of the engine. The `TrackingSensor` is a
// fixed-radius circular view field that has to keep a blinking point cluster in
// sight using nothing but what it can see on each step. It has memory but no
// knowledge of the area or of the hidden points' whereabouts beyond the
// loss check.
//
// Key architectural principles:
// 1.  **Loss check first**: if no point at all, visible or hidden, is within
//     the detection radius, the cluster is gone and the step fails with
//     `AreaLost`. Nothing else is updated on that step.
// 2.  **Snap, then steer**: a visible point outside the view pulls the view
//     just far enough to put the farthest such point on the rim. The view then
//     steers along a blend of the escape directions (or the last direction when
//     nothing escapes) and the pull toward the visible centroid.
// 3.  **Speed from memory**: the step length comes from a rolling window of the
//     visible centroid's displacement, the same way the old blob tracker kept
//     a bounded position history for velocity. A persistence coefficient decays
//     while nothing escapes and resets when something does, so a view that has
//     lost its reason to move slows down smoothly.
// 4.  **Geometry is optional**: the full sensor measures hull coverage after
//     moving. The slim sensor stops after moving, which isolates tracking
//     robustness from hull cost.

use crate::config::{HullMode, SensorVariant, SimulationConfig};
use crate::core_modules::cluster_detector::cluster_detector;
use crate::core_modules::enclosing_circle::Circle;
use crate::core_modules::geometry::{centroid, concave_hull, convex_hull, polygon_area};
use crate::core_modules::point::Point;
use crate::error::{Result, SimulationError};
use serde::Serialize;
use std::collections::VecDeque;

const SPEED_WINDOW_SIZE: usize = 10;
const FULL_PERSISTENCE_DECAY: f64 = 0.99;
const SLIM_PERSISTENCE_DECAY: f64 = 0.95;
/// Centroid offsets shorter than this do not steer the view.
const CENTROID_DEADBAND: f64 = 0.01;

/// How the full sensor outlines the point sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HullGeometry {
    Convex,
    Concave { k: usize },
    Clusters { eps: f64, min_points: usize },
}

impl HullGeometry {
    /// `None` for the slim sensor.
    pub fn from_config(config: &SimulationConfig) -> Option<Self> {
        match config.sensor {
            SensorVariant::Slim => None,
            SensorVariant::Full => Some(match config.hull_mode {
                HullMode::Convex => HullGeometry::Convex,
                HullMode::Concave => HullGeometry::Concave { k: config.concave_smoothing },
                HullMode::Clusters => HullGeometry::Clusters {
                    eps: config.cluster_eps,
                    min_points: config.cluster_min_points,
                },
            }),
        }
    }
}

/// Outlines of the visible points and of all points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HullResult {
    Single { visible: Vec<Point>, all: Vec<Point> },
    Clustered { visible: Vec<Vec<Point>>, all: Vec<Vec<Point>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HullMeasurement {
    pub hull_area: f64,
    pub true_hull_area: f64,
    /// Missing when the visible outline is too small to have a center.
    pub center_delay: Option<f64>,
}

impl HullMeasurement {
    /// `hull_area / true_hull_area` in percent, 0 when undefined.
    pub fn intersection_ratio(&self) -> f64 {
        if !(self.true_hull_area.is_finite() && self.true_hull_area > 0.0) {
            return 0.0;
        }
        let ratio = self.hull_area / self.true_hull_area * 100.0;
        if ratio.is_finite() { ratio } else { 0.0 }
    }
}

/// What one sensor step observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Visible points before the detection-range filter.
    pub visible_count: usize,
    pub measurement: Option<HullMeasurement>,
}

#[derive(Debug, Clone)]
pub struct TrackingSensor {
    view_center: Point,
    view_radius: f64,
    detection_radius: f64,
    /// Last steering direction.
    last_motion: Point,
    last_centroid: Option<Point>,
    /// Recent visible-centroid displacements, newest last.
    displacements: VecDeque<Point>,
    persistence: f64,
    geometry: Option<HullGeometry>,
    hulls: Option<HullResult>,
}

impl TrackingSensor {
    /// Centers the view on `view`; the detection radius is `view.radius * detection_multiplier`.
    pub fn new(view: Circle, detection_multiplier: f64, geometry: Option<HullGeometry>) -> Self {
        Self {
            view_center: view.center,
            view_radius: view.radius,
            detection_radius: view.radius * detection_multiplier,
            last_motion: Point::ZERO,
            last_centroid: None,
            displacements: VecDeque::with_capacity(SPEED_WINDOW_SIZE + 1),
            persistence: 1.0,
            geometry,
            hulls: None,
        }
    }

    pub fn from_config(view: Circle, config: &SimulationConfig) -> Self {
        Self::new(view, config.detection_multiplier, HullGeometry::from_config(config))
    }

    /// Runs one tracking step. `elapsed` is only used to stamp a loss.
    pub fn update(&mut self, visible: &[Point], all: &[Point], elapsed: f64) -> Result<SensorReading> {
        let visible_count = visible.len();

        // --- 1. Loss check ---
        if !all.iter().any(|p| self.in_detection_range(*p)) {
            return Err(SimulationError::AreaLost { elapsed });
        }

        // --- 2. Detection filter ---
        let detected: Vec<Point> = visible
            .iter()
            .copied()
            .filter(|p| self.in_detection_range(*p))
            .collect();

        // --- 3. View motion ---
        self.move_view(&detected);

        // --- 4. Geometry ---
        let measurement = match self.geometry {
            Some(geometry) => {
                let (hulls, measurement) = measure(geometry, &detected, all);
                self.hulls = Some(hulls);
                Some(measurement)
            }
            None => None,
        };

        Ok(SensorReading { visible_count, measurement })
    }

    fn in_detection_range(&self, p: Point) -> bool {
        self.view_center.distance(p) < self.detection_radius
    }

    fn move_view(&mut self, visible: &[Point]) {
        let radius = self.view_radius;

        // --- 3a. Snap ---
        // Only the farthest escaping point is used, so the view moves just
        // enough to put it on the rim.
        let farthest = visible
            .iter()
            .map(|p| (*p, self.view_center.distance(*p)))
            .filter(|(_, d)| *d > radius)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((point, distance)) = farthest {
            self.view_center += (point - self.view_center).normalized() * (distance - radius);
        }

        // --- 3b. Escape direction ---
        // Points still outside after the snap vote with unit vectors. No vote
        // means nothing pushes the view: keep the old heading and let
        // persistence fade.
        let escaping: Vec<Point> = visible
            .iter()
            .filter(|p| self.view_center.distance(**p) > radius)
            .map(|p| (*p - self.view_center).normalized())
            .collect();

        let mut direction = match Point::mean(&escaping) {
            Some(mean) => {
                self.persistence = 1.0;
                mean
            }
            None => {
                self.persistence *= self.persistence_decay();
                self.last_motion
            }
        };

        // --- 3c. Centroid pull ---
        // Half of the heading comes from the visible centroid unless the view
        // already sits on it.
        let centroid = Point::mean(visible);
        if let Some(c) = centroid {
            let pull = c - self.view_center;
            if pull.length() > CENTROID_DEADBAND {
                direction = (direction + pull.normalized()) / 2.0;
            }
        }

        // --- 3d. Speed ---
        // Step length is how far the visible centroid moved per step lately,
        // never anything the sensor cannot see.
        if let (Some(current), Some(previous)) = (centroid, self.last_centroid) {
            self.displacements.push_back(current - previous);
            if self.displacements.len() > SPEED_WINDOW_SIZE {
                self.displacements.pop_front();
            }
        }
        let speed = self.average_speed();

        // --- 3e. Move ---
        if direction.length() > 0.0 && speed > 0.0 {
            direction = direction.normalized();
            self.view_center += direction * (speed * self.persistence);
        }

        self.last_motion = direction;
        self.last_centroid = centroid;
    }

    fn persistence_decay(&self) -> f64 {
        if self.geometry.is_some() { FULL_PERSISTENCE_DECAY } else { SLIM_PERSISTENCE_DECAY }
    }

    /// Mean length of the displacement window, 0 when empty.
    pub fn average_speed(&self) -> f64 {
        if self.displacements.is_empty() {
            return 0.0;
        }
        self.displacements.iter().map(|d| d.length()).sum::<f64>() / self.displacements.len() as f64
    }

    pub fn view(&self) -> Circle {
        Circle { center: self.view_center, radius: self.view_radius }
    }

    pub fn detection_radius(&self) -> f64 {
        self.detection_radius
    }

    pub fn persistence(&self) -> f64 {
        self.persistence
    }

    pub fn speed_samples(&self) -> usize {
        self.displacements.len()
    }

    pub fn is_slim(&self) -> bool {
        self.geometry.is_none()
    }

    /// Outlines from the most recent successful step.
    pub fn hulls(&self) -> Option<&HullResult> {
        self.hulls.as_ref()
    }
}

fn measure(geometry: HullGeometry, visible: &[Point], all: &[Point]) -> (HullResult, HullMeasurement) {
    match geometry {
        HullGeometry::Convex => single(convex_hull(visible), convex_hull(all)),
        HullGeometry::Concave { k } => single(concave_hull(visible, k), concave_hull(all, k)),
        HullGeometry::Clusters { eps, min_points } => {
            let visible_clusters = cluster_detector::find_clusters(visible, eps, min_points);
            let all_clusters = cluster_detector::find_clusters(all, eps, min_points);

            let center_delay = match (
                Point::mean(&visible_clusters.concat()),
                Point::mean(&all_clusters.concat()),
            ) {
                (Some(seen), Some(truth)) => Some(seen.distance(truth)),
                _ => None,
            };

            let visible_hulls: Vec<Vec<Point>> = visible_clusters.iter().map(|c| convex_hull(c)).collect();
            let all_hulls: Vec<Vec<Point>> = all_clusters.iter().map(|c| convex_hull(c)).collect();
            let measurement = HullMeasurement {
                hull_area: visible_hulls.iter().map(|h| polygon_area(h)).sum(),
                true_hull_area: all_hulls.iter().map(|h| polygon_area(h)).sum(),
                center_delay,
            };
            (HullResult::Clustered { visible: visible_hulls, all: all_hulls }, measurement)
        }
    }
}

fn single(visible: Vec<Point>, all: Vec<Point>) -> (HullResult, HullMeasurement) {
    let center_delay = if visible.len() >= 3 {
        match (centroid(&visible), centroid(&all)) {
            (Some(seen), Some(truth)) => Some(seen.distance(truth)),
            _ => None,
        }
    } else {
        None
    };
    let measurement = HullMeasurement {
        hull_area: polygon_area(&visible),
        true_hull_area: polygon_area(&all),
        center_delay,
    };
    (HullResult::Single { visible, all }, measurement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(geometry: Option<HullGeometry>) -> TrackingSensor {
        TrackingSensor::new(Circle { center: Point::ZERO, radius: 10.0 }, 2.0, geometry)
    }

    fn square(side: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ]
    }

    #[test]
    fn loss_fires_only_without_points_in_range() {
        let mut s = sensor(Some(HullGeometry::Convex));
        let far = [Point::new(25.0, 0.0)];
        assert!(matches!(
            s.update(&far, &far, 1.25),
            Err(SimulationError::AreaLost { elapsed }) if elapsed == 1.25
        ));

        // Exactly on the detection radius is out of range.
        let edge = [Point::new(20.0, 0.0)];
        assert!(s.update(&[], &edge, 0.0).unwrap_err().is_area_lost());

        // A hidden point in range is enough.
        let hidden = [Point::new(19.0, 0.0)];
        assert!(s.update(&[], &hidden, 0.0).is_ok());
    }

    #[test]
    fn visible_count_is_taken_before_filtering() {
        let mut s = sensor(None);
        let visible = [Point::new(1.0, 0.0), Point::new(500.0, 0.0)];
        let reading = s.update(&visible, &visible, 0.0).unwrap();
        assert_eq!(reading.visible_count, 2);
        assert!(reading.measurement.is_none());
    }

    #[test]
    fn snap_puts_the_farthest_point_on_the_rim() {
        let mut s = sensor(Some(HullGeometry::Convex));
        let p = [Point::new(15.0, 0.0)];
        s.update(&p, &p, 0.0).unwrap();
        assert!((s.view().center.distance(p[0]) - 10.0).abs() < 1e-9);
        // No centroid history yet, so no extra motion.
        assert_eq!(s.speed_samples(), 0);
    }

    #[test]
    fn persistence_decays_by_variant() {
        let anchor = [Point::new(1.0, 1.0)];
        let mut full = sensor(Some(HullGeometry::Convex));
        let mut slim = sensor(None);
        for _ in 0..3 {
            full.update(&[], &anchor, 0.0).unwrap();
            slim.update(&[], &anchor, 0.0).unwrap();
        }
        assert!((full.persistence() - 0.99f64.powi(3)).abs() < 1e-12);
        assert!((slim.persistence() - 0.95f64.powi(3)).abs() < 1e-12);

        let escaping = [Point::new(15.0, 0.0), Point::new(-15.0, 0.0)];
        full.update(&escaping, &escaping, 0.0).unwrap();
        assert_eq!(full.persistence(), 1.0);
    }

    #[test]
    fn view_follows_a_drifting_cluster() {
        let mut s = sensor(None);
        let mut cluster = vec![Point::new(-2.0, 0.0), Point::new(2.0, 0.0), Point::new(0.0, 3.0)];
        for _ in 0..40 {
            for p in cluster.iter_mut() {
                *p += Point::new(1.0, 0.0);
            }
            s.update(&cluster, &cluster, 0.0).unwrap();
        }
        let centroid = Point::mean(&cluster).unwrap();
        assert!(s.view().center.distance(centroid) < 12.0);
        assert!(s.average_speed() > 0.9 && s.average_speed() < 1.1);
        assert_eq!(s.speed_samples(), SPEED_WINDOW_SIZE);
    }

    #[test]
    fn convex_measurement_compares_visible_with_all() {
        let mut s = TrackingSensor::new(Circle { center: Point::new(5.0, 5.0), radius: 10.0 }, 2.0, Some(HullGeometry::Convex));
        let all = square(10.0);
        let visible = &all[..3];
        let reading = s.update(visible, &all, 0.0).unwrap();
        let m = reading.measurement.unwrap();
        assert!((m.hull_area - 50.0).abs() < 1e-9);
        assert!((m.true_hull_area - 100.0).abs() < 1e-9);
        assert!((m.intersection_ratio() - 50.0).abs() < 1e-9);
        assert!(m.center_delay.unwrap() > 0.0);
        assert!(matches!(s.hulls(), Some(HullResult::Single { .. })));
    }

    #[test]
    fn small_outline_has_no_center_delay() {
        let mut s = TrackingSensor::new(Circle { center: Point::new(5.0, 5.0), radius: 10.0 }, 2.0, Some(HullGeometry::Concave { k: 2 }));
        let all = square(10.0);
        let m = s.update(&all[..2], &all, 0.0).unwrap().measurement.unwrap();
        assert_eq!(m.hull_area, 0.0);
        assert!(m.center_delay.is_none());
    }

    #[test]
    fn cluster_mode_sums_cluster_areas() {
        let mut left = square(4.0);
        let right: Vec<Point> = square(4.0).into_iter().map(|p| p + Point::new(10.0, 0.0)).collect();
        left.extend(right);
        let mut s = TrackingSensor::new(
            Circle { center: Point::new(7.0, 2.0), radius: 20.0 },
            2.0,
            Some(HullGeometry::Clusters { eps: 4.5, min_points: 3 }),
        );
        let m = s.update(&left, &left, 0.0).unwrap().measurement.unwrap();
        assert!((m.hull_area - 32.0).abs() < 1e-9);
        assert!((m.true_hull_area - 32.0).abs() < 1e-9);
        assert!(m.center_delay.unwrap() < 1e-9);
        match s.hulls() {
            Some(HullResult::Clustered { visible, .. }) => assert_eq!(visible.len(), 2),
            other => panic!("unexpected hulls {other:?}"),
        }
    }

    #[test]
    fn undefined_ratio_is_zero() {
        let m = HullMeasurement { hull_area: 5.0, true_hull_area: 0.0, center_delay: None };
        assert_eq!(m.intersection_ratio(), 0.0);
    }
}

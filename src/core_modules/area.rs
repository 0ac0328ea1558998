// THEORY:
// The `area` module is the moving region the whole simulation revolves around.
// An `Area` owns one `Shape` and drives it through a sequence of random walks:
// each walk picks a speed, a heading and a duration (plus a spin for the
// rectangle), and `update` integrates that motion one step at a time.
//
// Key principles:
// 1.  **One contract, three shapes**: circle, rotating rectangle and polygon
//     share `start_new_random_walk`, `update`, `frame_origin` and
//     `bounding_circle`. The differences live in `match` arms, not in types.
// 2.  **Elastic walls**: after every move the shape's effective half-extent is
//     checked against each side of the world. A violated side clamps the shape
//     back inside and negates that velocity component. The extent invariant
//     holds for any velocity because the clamp, not the velocity, decides the
//     final position.
// 3.  **Bounce ends the walk**: any reflection zeroes the remaining walk time,
//     so the driver starts a fresh walk on its next check and the area does not
//     rattle along a wall.
// 4.  **Frame**: points hang off `frame_origin` (circle and rectangle center,
//     polygon vertex mean) rotated by `angle`.

use crate::config::{ShapeKind, SimulationConfig};
use crate::core_modules::enclosing_circle::{Circle, smallest_enclosing_circle};
use crate::core_modules::geometry::Bounds;
use crate::core_modules::point::Point;
use crate::error::{Result, SimulationError};
use rand::Rng;
use serde::Serialize;
use std::f64::consts::TAU;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Circle {
        center: Point,
        radius: f64,
    },
    Rectangle {
        center: Point,
        width: f64,
        height: f64,
        /// Rotation about the center, radians.
        angle: f64,
    },
    Polygon {
        vertices: Vec<Point>,
        /// Vertex mean, kept in step with the vertices.
        anchor: Point,
    },
}

impl Shape {
    fn from_config(config: &SimulationConfig) -> Result<Self> {
        match config.shape {
            ShapeKind::Circle => Ok(Shape::Circle { center: config.center(), radius: config.radius }),
            ShapeKind::Rectangle => Ok(Shape::Rectangle {
                center: config.center(),
                width: config.width,
                height: config.height,
                angle: 0.0,
            }),
            ShapeKind::Polygon => {
                let anchor = Point::mean(&config.vertices)
                    .ok_or_else(|| SimulationError::invalid("polygon has no vertices"))?;
                Ok(Shape::Polygon { vertices: config.vertices.clone(), anchor })
            }
        }
    }

    /// Axis-aligned extent used for wall reflection.
    pub fn extent(&self) -> Bounds {
        match self {
            Shape::Circle { center, radius } => square_bounds(*center, *radius),
            Shape::Rectangle { center, width, height, .. } => {
                square_bounds(*center, width.hypot(*height) / 2.0)
            }
            Shape::Polygon { vertices, anchor } => {
                Bounds::from_points(vertices).unwrap_or(Bounds { min: *anchor, max: *anchor })
            }
        }
    }

    fn translate(&mut self, offset: Point) {
        match self {
            Shape::Circle { center, .. } | Shape::Rectangle { center, .. } => *center += offset,
            Shape::Polygon { vertices, anchor } => {
                for v in vertices.iter_mut() {
                    *v += offset;
                }
                *anchor += offset;
            }
        }
    }
}

fn square_bounds(center: Point, half: f64) -> Bounds {
    Bounds {
        min: Point::new(center.x - half, center.y - half),
        max: Point::new(center.x + half, center.y + half),
    }
}

#[derive(Debug, Clone)]
pub struct Area {
    shape: Shape,
    velocity: Point,
    /// Rectangle spin, rad/s. Always 0 for the other shapes.
    angular_velocity: f64,
    remaining_time: f64,
    world_width: f64,
    world_height: f64,
    max_speed: f64,
    max_walk_time: f64,
    max_angular_speed: f64,
}

impl Area {
    /// Builds a still area. Call `start_new_random_walk` to set it moving.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let shape = Shape::from_config(config)?;
        Ok(Self {
            shape,
            velocity: Point::ZERO,
            angular_velocity: 0.0,
            remaining_time: 0.0,
            world_width: config.world_width,
            world_height: config.world_height,
            max_speed: config.area_max_speed,
            max_walk_time: config.area_max_walk_time,
            max_angular_speed: config.area_max_angular_speed,
        })
    }

    pub fn start_new_random_walk<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let speed = rng.random_range(0.0..=self.max_speed);
        let heading = rng.random_range(0.0..TAU);
        self.velocity = Point::from_angle(heading) * speed;

        if matches!(self.shape, Shape::Rectangle { .. }) {
            let spin = rng.random_range(0.0..=self.max_angular_speed);
            self.angular_velocity = if rng.random_bool(0.5) { spin } else { -spin };
        }

        self.remaining_time = rng.random_range(0.0..=self.max_walk_time);
    }

    /// Moves the shape by one step and bounces it off the world walls.
    pub fn update(&mut self, dt: f64) {
        self.remaining_time -= dt;

        let offset = self.velocity * dt;
        self.shape.translate(offset);
        if let Shape::Rectangle { angle, .. } = &mut self.shape {
            *angle += self.angular_velocity * dt;
        }

        let extent = self.shape.extent();
        let shift = Point::new(
            bounce(extent.min.x, extent.max.x, self.world_width, &mut self.velocity.x),
            bounce(extent.min.y, extent.max.y, self.world_height, &mut self.velocity.y),
        );

        if shift != Point::ZERO {
            self.shape.translate(shift);
            if let Shape::Polygon { vertices, anchor } = &mut self.shape {
                // Recomputed rather than shifted so rounding never drifts it off the vertices.
                if let Some(mean) = Point::mean(vertices) {
                    *anchor = mean;
                }
            }
            self.remaining_time = 0.0;
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn remaining_time(&self) -> f64 {
        self.remaining_time
    }

    pub fn velocity(&self) -> Point {
        self.velocity
    }

    pub fn extent(&self) -> Bounds {
        self.shape.extent()
    }

    /// Origin of the frame points are attached to.
    pub fn frame_origin(&self) -> Point {
        match &self.shape {
            Shape::Circle { center, .. } | Shape::Rectangle { center, .. } => *center,
            Shape::Polygon { anchor, .. } => *anchor,
        }
    }

    /// Rotation of the frame points are attached to.
    pub fn angle(&self) -> f64 {
        match &self.shape {
            Shape::Rectangle { angle, .. } => *angle,
            _ => 0.0,
        }
    }

    /// Maps an offset in the area's frame to world coordinates.
    pub fn to_world(&self, local: Point) -> Point {
        self.frame_origin() + local.rotated(self.angle())
    }

    /// Circle that encloses the whole shape.
    ///
    /// Exact for circle and rectangle (half-diagonal). For a polygon it is the
    /// smallest enclosing circle of the vertices, recomputed on every call from
    /// a fresh permutation, so repeated calls may differ by rounding.
    pub fn bounding_circle<R: Rng + ?Sized>(&self, rng: &mut R) -> Circle {
        match &self.shape {
            Shape::Circle { center, radius } => Circle { center: *center, radius: *radius },
            Shape::Rectangle { center, width, height, .. } => Circle {
                center: *center,
                radius: width.hypot(*height) / 2.0,
            },
            Shape::Polygon { vertices, anchor } => {
                match smallest_enclosing_circle(vertices, rng) {
                    Some(circle) if circle.is_finite() => circle,
                    _ => {
                        warn!(vertices = vertices.len(), "degenerate polygon, enclosing its bounding box instead");
                        let bounds = self.shape.extent();
                        let center = (bounds.min + bounds.max) / 2.0;
                        let radius = vertices
                            .iter()
                            .map(|v| center.distance(*v))
                            .fold(0.0, f64::max);
                        Circle { center: if center.is_finite() { center } else { *anchor }, radius }
                    }
                }
            }
        }
    }
}

/// Clamp offset for one axis, negating `velocity` when a wall is hit.
fn bounce(low: f64, high: f64, limit: f64, velocity: &mut f64) -> f64 {
    if low < 0.0 {
        *velocity = -*velocity;
        -low
    } else if high > limit {
        *velocity = -*velocity;
        limit - high
    } else {
        0.0
    }
}

// THEORY:
// `SimulationConfig` is the single input of the engine. It describes one run
// completely: the world, the area's shape and walk limits, the point population,
// the sensor, and the repetition counts used by the batch runner. The batch
// runner clones it per repetition, so it is plain owned data with no handles.
//
// The value arrives from outside (a JSON file, the command line, a sweep that
// rebinds one field), so `validate` is the gate every run passes through before
// any simulation object is built.

use crate::core_modules::point::Point;
use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    #[default]
    Circle,
    Rectangle,
    Polygon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointMotion {
    /// Points keep a fixed offset in the area's frame.
    #[default]
    Rigid,
    /// Points wander inside the area on their own.
    RandomWalk,
}

/// Distribution of the hidden-phase duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityDistribution {
    #[default]
    Uniform,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorVariant {
    /// View tracking plus hull metrics.
    #[default]
    Full,
    /// View tracking only.
    Slim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HullMode {
    #[default]
    Convex,
    Concave,
    Clusters,
}

macro_rules! named_enum {
    ($ty:ty, $what:literal, { $($name:literal => $variant:path),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = SimulationError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(SimulationError::invalid(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

named_enum!(ShapeKind, "shape", {
    "circle" => ShapeKind::Circle,
    "rectangle" => ShapeKind::Rectangle,
    "polygon" => ShapeKind::Polygon,
});

named_enum!(PointMotion, "point motion", {
    "rigid" => PointMotion::Rigid,
    "random_walk" => PointMotion::RandomWalk,
});

named_enum!(VisibilityDistribution, "visibility distribution", {
    "uniform" => VisibilityDistribution::Uniform,
    "exponential" => VisibilityDistribution::Exponential,
});

named_enum!(SensorVariant, "sensor variant", {
    "full" => SensorVariant::Full,
    "slim" => SensorVariant::Slim,
});

named_enum!(HullMode, "hull mode", {
    "convex" => HullMode::Convex,
    "concave" => HullMode::Concave,
    "clusters" => HullMode::Clusters,
});

/// Configuration for one simulation run and for the batches built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per run.
    pub simulation_time: f64,
    /// Fixed step used by batch runs. The last step is shortened to fit.
    pub step_seconds: f64,
    pub world_width: f64,
    pub world_height: f64,

    pub shape: ShapeKind,
    /// Center of a circle or rectangle area.
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub width: f64,
    pub height: f64,
    /// Polygon vertices in world coordinates, in ring order.
    pub vertices: Vec<Point>,

    /// Vmax: upper bound of the area's walk speed.
    pub area_max_speed: f64,
    /// Tmax: upper bound of one area walk's duration.
    pub area_max_walk_time: f64,
    /// Omax: upper bound of the rectangle's angular speed, rad/s.
    pub area_max_angular_speed: f64,

    pub point_count: usize,
    pub point_motion: PointMotion,
    /// vmax: upper bound of a point's own walk speed.
    pub point_max_speed: f64,
    /// tmax: upper bound of one point walk's duration.
    pub point_max_walk_time: f64,
    pub hidden_distribution: VisibilityDistribution,
    /// TmaxVisible
    pub max_visible_time: f64,
    /// TmaxInvisible. Ignored by the exponential distribution.
    pub max_hidden_time: f64,

    pub sensor: SensorVariant,
    pub hull_mode: HullMode,
    /// k: concave hull refinement passes per hull vertex.
    pub concave_smoothing: usize,
    pub cluster_eps: f64,
    pub cluster_min_points: usize,
    /// Detection radius as a multiple of the view radius.
    pub detection_multiplier: f64,

    pub batch_runs: usize,
    pub sweep_runs_per_value: usize,
    /// Master seed. Without it every batch draws fresh seeds.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_time: 60.0,
            step_seconds: 0.016,
            world_width: 2500.0,
            world_height: 1700.0,
            shape: ShapeKind::Circle,
            center_x: 1250.0,
            center_y: 850.0,
            radius: 150.0,
            width: 300.0,
            height: 200.0,
            vertices: Vec::new(),
            area_max_speed: 50.0,
            area_max_walk_time: 5.0,
            area_max_angular_speed: 0.5,
            point_count: 20,
            point_motion: PointMotion::Rigid,
            point_max_speed: 50.0,
            point_max_walk_time: 2.0,
            hidden_distribution: VisibilityDistribution::Uniform,
            max_visible_time: 2.0,
            max_hidden_time: 5.0,
            sensor: SensorVariant::Full,
            hull_mode: HullMode::Convex,
            concave_smoothing: 1,
            cluster_eps: 50.0,
            cluster_min_points: 3,
            detection_multiplier: 2.0,
            batch_runs: 50,
            sweep_runs_per_value: 10_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }

    /// Rejects anything the engine cannot simulate.
    pub fn validate(&self) -> Result<()> {
        positive("world_width", self.world_width)?;
        positive("world_height", self.world_height)?;
        positive("simulation_time", self.simulation_time)?;
        positive("step_seconds", self.step_seconds)?;

        match self.shape {
            ShapeKind::Circle => {
                positive("radius", self.radius)?;
                self.fits_world(2.0 * self.radius, 2.0 * self.radius)?;
            }
            ShapeKind::Rectangle => {
                positive("width", self.width)?;
                positive("height", self.height)?;
                let diagonal = self.width.hypot(self.height);
                self.fits_world(diagonal, diagonal)?;
            }
            ShapeKind::Polygon => {
                if self.vertices.len() < 3 {
                    return Err(SimulationError::invalid("polygon needs at least 3 vertices"));
                }
                if self.vertices.iter().any(|v| !v.is_finite()) {
                    return Err(SimulationError::invalid("polygon vertices must be finite"));
                }
                let area = crate::core_modules::geometry::polygon_area(&self.vertices);
                if area <= 0.0 {
                    return Err(SimulationError::invalid("polygon has zero area"));
                }
                if let Some(bounds) = crate::core_modules::geometry::Bounds::from_points(&self.vertices) {
                    self.fits_world(bounds.width(), bounds.height())?;
                }
            }
        }

        non_negative("area_max_speed", self.area_max_speed)?;
        non_negative("area_max_walk_time", self.area_max_walk_time)?;
        non_negative("area_max_angular_speed", self.area_max_angular_speed)?;

        if self.point_count == 0 {
            return Err(SimulationError::invalid("point_count must be at least 1"));
        }
        non_negative("point_max_speed", self.point_max_speed)?;
        non_negative("point_max_walk_time", self.point_max_walk_time)?;
        positive("max_visible_time", self.max_visible_time)?;
        positive("max_hidden_time", self.max_hidden_time)?;
        positive("detection_multiplier", self.detection_multiplier)?;

        if self.sensor == SensorVariant::Full {
            match self.hull_mode {
                HullMode::Concave if self.concave_smoothing == 0 => {
                    return Err(SimulationError::invalid("concave_smoothing must be at least 1"));
                }
                HullMode::Clusters => {
                    positive("cluster_eps", self.cluster_eps)?;
                    if self.cluster_min_points == 0 {
                        return Err(SimulationError::invalid("cluster_min_points must be at least 1"));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn fits_world(&self, extent_x: f64, extent_y: f64) -> Result<()> {
        if extent_x > self.world_width || extent_y > self.world_height {
            return Err(SimulationError::invalid(format!(
                "{} of {extent_x:.1} x {extent_y:.1} does not fit a {} x {} world",
                self.shape, self.world_width, self.world_height
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::invalid(format!("{name} must be positive and finite, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimulationError::invalid(format!("{name} must be non-negative and finite, got {value}")))
    }
}

/// A configuration field the parameter sweep can scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepVariable {
    #[serde(rename = "radius")]
    Radius,
    #[serde(rename = "Omax")]
    AreaMaxAngularSpeed,
    #[serde(rename = "Vmax")]
    AreaMaxSpeed,
    #[serde(rename = "Tmax")]
    AreaMaxWalkTime,
    #[serde(rename = "vmax")]
    PointMaxSpeed,
    #[serde(rename = "tmax")]
    PointMaxWalkTime,
    #[serde(rename = "TmaxVisible")]
    MaxVisibleTime,
    #[serde(rename = "TmaxInvisible")]
    MaxHiddenTime,
}

impl SweepVariable {
    pub const ALL: [SweepVariable; 8] = [
        SweepVariable::Radius,
        SweepVariable::AreaMaxAngularSpeed,
        SweepVariable::AreaMaxSpeed,
        SweepVariable::AreaMaxWalkTime,
        SweepVariable::PointMaxSpeed,
        SweepVariable::PointMaxWalkTime,
        SweepVariable::MaxVisibleTime,
        SweepVariable::MaxHiddenTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepVariable::Radius => "radius",
            SweepVariable::AreaMaxAngularSpeed => "Omax",
            SweepVariable::AreaMaxSpeed => "Vmax",
            SweepVariable::AreaMaxWalkTime => "Tmax",
            SweepVariable::PointMaxSpeed => "vmax",
            SweepVariable::PointMaxWalkTime => "tmax",
            SweepVariable::MaxVisibleTime => "TmaxVisible",
            SweepVariable::MaxHiddenTime => "TmaxInvisible",
        }
    }

    /// Rebinds this field of `config` to `value`.
    pub fn apply(self, config: &mut SimulationConfig, value: f64) {
        let field = match self {
            SweepVariable::Radius => &mut config.radius,
            SweepVariable::AreaMaxAngularSpeed => &mut config.area_max_angular_speed,
            SweepVariable::AreaMaxSpeed => &mut config.area_max_speed,
            SweepVariable::AreaMaxWalkTime => &mut config.area_max_walk_time,
            SweepVariable::PointMaxSpeed => &mut config.point_max_speed,
            SweepVariable::PointMaxWalkTime => &mut config.point_max_walk_time,
            SweepVariable::MaxVisibleTime => &mut config.max_visible_time,
            SweepVariable::MaxHiddenTime => &mut config.max_hidden_time,
        };
        *field = value;
    }
}

impl FromStr for SweepVariable {
    type Err = SimulationError;

    /// Case-sensitive: `Vmax` (area) and `vmax` (points) are different fields.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        SweepVariable::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| SimulationError::invalid(format!("unknown sweep variable '{s}'")))
    }
}

impl fmt::Display for SweepVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "shape": "rectangle", "width": 120, "height": 80, "hull_mode": "clusters" }"#,
        )
        .unwrap();
        assert_eq!(config.shape, ShapeKind::Rectangle);
        assert_eq!(config.hull_mode, HullMode::Clusters);
        assert_eq!(config.point_count, 20);
        assert_eq!(config.step_seconds, 0.016);
    }

    #[test]
    fn unknown_names_are_invalid_configuration() {
        assert!(matches!(
            "hexagon".parse::<ShapeKind>(),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        assert!("concave".parse::<HullMode>().is_ok());
        assert!("Slim".parse::<SensorVariant>().is_ok());
        assert!(matches!(
            SimulationConfig::from_json_str(r#"{ "shape": "hexagon" }"#),
            Err(SimulationError::ConfigParse(_))
        ));
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let polygon = SimulationConfig {
            shape: ShapeKind::Polygon,
            vertices: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            ..Default::default()
        };
        assert!(polygon.validate().is_err());

        let flat = SimulationConfig {
            shape: ShapeKind::Polygon,
            vertices: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(20.0, 0.0)],
            ..Default::default()
        };
        assert!(flat.validate().is_err());

        let circle = SimulationConfig { radius: 0.0, ..Default::default() };
        assert!(circle.validate().is_err());

        let huge = SimulationConfig { radius: 5000.0, ..Default::default() };
        assert!(huge.validate().is_err());

        let nobody = SimulationConfig { point_count: 0, ..Default::default() };
        assert!(nobody.validate().is_err());
    }

    #[test]
    fn still_area_is_legal() {
        let still = SimulationConfig {
            area_max_speed: 0.0,
            area_max_angular_speed: 0.0,
            ..Default::default()
        };
        assert!(still.validate().is_ok());
    }

    #[test]
    fn sweep_variables_are_case_sensitive() {
        assert_eq!("Vmax".parse::<SweepVariable>().unwrap(), SweepVariable::AreaMaxSpeed);
        assert_eq!("vmax".parse::<SweepVariable>().unwrap(), SweepVariable::PointMaxSpeed);
        assert!("VMAX".parse::<SweepVariable>().is_err());

        let mut config = SimulationConfig::default();
        SweepVariable::MaxHiddenTime.apply(&mut config, 7.5);
        assert_eq!(config.max_hidden_time, 7.5);
        for variable in SweepVariable::ALL {
            assert_eq!(variable.to_string().parse::<SweepVariable>().unwrap(), variable);
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            SimulationConfig::from_json_file("/definitely/not/here.json"),
            Err(SimulationError::ConfigRead(_))
        ));
    }
}

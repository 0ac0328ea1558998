// THEORY:
// The `simulation` module is the top-level driver for one run. It wires the
// stack together in a fixed order and then steps it in lockstep:
//
//     Area -> Points -> Sensor -> (new area walk if the old one ran out)
//
// Key principles:
// 1.  **Single-threaded and synchronous**: a run is a plain loop. It owns its
//     area, population, sensor and random source outright, so any number of
//     runs can execute side by side without sharing anything.
// 2.  **Fault boundary**: `AreaLost` from the sensor ends the run and becomes
//     `seconds_until_loss`. It is a result, not an error, for everything
//     above this module.
// 3.  **Snapshots, not drawing**: a presentation layer can call `step` with its
//     own frame delta and read an immutable `SimulationSnapshot` afterwards.

use crate::config::SimulationConfig;
use crate::core_modules::area::{Area, Shape};
use crate::core_modules::enclosing_circle::Circle;
use crate::core_modules::point::Point;
use crate::core_modules::population::{PointPopulation, Visibility};
use crate::core_modules::sensor::{HullResult, TrackingSensor};
use crate::core_modules::statistics::RunStatistics;
use crate::error::{Result, SimulationError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Simulated time remains.
    Running,
    /// The sensor lost the cluster on this step or earlier.
    Lost,
    /// All simulated time was used without a loss.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointSnapshot {
    pub position: Point,
    pub visibility: Visibility,
}

/// Everything a renderer needs to draw one moment of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    pub elapsed: f64,
    pub area: Shape,
    pub points: Vec<PointSnapshot>,
    pub view: Circle,
    pub detection_radius: f64,
    pub hulls: Option<HullResult>,
}

pub struct Simulation {
    area: Area,
    population: PointPopulation,
    sensor: TrackingSensor,
    rng: ChaCha8Rng,
    step_seconds: f64,
    remaining: f64,
    elapsed: f64,
    statistics: RunStatistics,
    outcome: StepOutcome,
}

impl Simulation {
    /// Builds the area, scatters the points around it, centers the sensor on
    /// the area's bounding circle, then sets the area walking.
    pub fn new(config: &SimulationConfig, mut rng: ChaCha8Rng) -> Result<Self> {
        config.validate()?;

        let area = Area::from_config(config)?;
        let population = PointPopulation::scatter(&area, config, &mut rng);
        Ok(Self::assemble(config, area, population, rng))
    }

    fn assemble(
        config: &SimulationConfig,
        mut area: Area,
        population: PointPopulation,
        mut rng: ChaCha8Rng,
    ) -> Self {
        let sensor = TrackingSensor::from_config(area.bounding_circle(&mut rng), config);
        area.start_new_random_walk(&mut rng);

        debug!(
            shape = %config.shape,
            points = population.len(),
            view_radius = sensor.view().radius,
            "simulation ready"
        );

        Self {
            area,
            population,
            sensor,
            rng,
            step_seconds: config.step_seconds,
            remaining: config.simulation_time,
            elapsed: 0.0,
            statistics: RunStatistics::default(),
            outcome: StepOutcome::Running,
        }
    }

    /// Advances by `dt`, shortened to the time left. Does nothing once the run
    /// has ended.
    pub fn step(&mut self, dt: f64) -> Result<StepOutcome> {
        if self.outcome != StepOutcome::Running {
            return Ok(self.outcome);
        }

        let dt = dt.min(self.remaining);
        self.remaining -= dt;
        self.elapsed += dt;

        self.area.update(dt);
        self.population.update(&self.area, dt, &mut self.rng);

        let visible = self.population.visible_positions();
        let all = self.population.positions();
        match self.sensor.update(&visible, &all, self.elapsed) {
            Ok(reading) => self.statistics.record(&reading),
            Err(SimulationError::AreaLost { elapsed }) => {
                debug!(elapsed, "area lost");
                self.statistics.seconds_until_loss = elapsed;
                self.outcome = StepOutcome::Lost;
                return Ok(self.outcome);
            }
            Err(other) => return Err(other),
        }

        if self.area.remaining_time() <= 0.0 {
            self.area.start_new_random_walk(&mut self.rng);
        }

        if self.remaining <= 0.0 {
            self.outcome = StepOutcome::Finished;
        }
        Ok(self.outcome)
    }

    /// Steps with the configured fixed step until the run ends.
    pub fn run(mut self) -> Result<RunStatistics> {
        while self.step(self.step_seconds)? == StepOutcome::Running {}
        Ok(self.statistics)
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            elapsed: self.elapsed,
            area: self.area.shape().clone(),
            points: self
                .population
                .points()
                .iter()
                .map(|p| PointSnapshot { position: p.position(), visibility: p.visibility() })
                .collect(),
            view: self.sensor.view(),
            detection_radius: self.sensor.detection_radius(),
            hulls: self.sensor.hulls().cloned(),
        }
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn outcome(&self) -> StepOutcome {
        self.outcome
    }
}

/// One complete run from a seed.
pub fn run_single(config: &SimulationConfig, seed: u64) -> Result<RunStatistics> {
    Simulation::new(config, ChaCha8Rng::seed_from_u64(seed))?.run()
}

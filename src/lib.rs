// THEORY:
// This file is the entry point for the `cluster_tracker` library crate. It
// exposes three layers and keeps the building blocks in `core_modules` for
// callers that want to drive them by hand:
//
// 1.  `Simulation` / `run_single`: one run, stepped synchronously.
// 2.  `BatchRunner`: many runs on a worker pool, as a fixed batch or as a
//     parameter sweep.
// 3.  `SimulationConfig`, `SimulationError` and the statistics types that flow
//     in and out of both.

pub mod batch_runner;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod simulation;

pub use batch_runner::{BatchProgress, BatchRunner, WorkerPool, sweep_values};
pub use config::{
    HullMode, PointMotion, SensorVariant, ShapeKind, SimulationConfig, SweepVariable,
    VisibilityDistribution,
};
pub use core_modules::point::Point;
pub use core_modules::statistics::{BatchSummary, RunStatistics, RunSummary, SweepRow};
pub use error::{Result, SimulationError};
pub use simulation::{Simulation, SimulationSnapshot, StepOutcome, run_single};

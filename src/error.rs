// THEORY:
// The `error` module holds the single error type of the engine. There are only
// two conditions that matter to the simulation itself:
//
// 1.  **AreaLost**: the sensor has no point, visible or hidden, within its
//     detection radius. This is fatal to one run only. The single-run driver
//     catches it at its fault boundary and turns it into a timed failure, so it
//     never reaches a batch.
// 2.  **InvalidConfiguration**: something the engine cannot simulate (unknown
//     names, empty or degenerate geometry, nonsensical ranges). It is raised
//     before any run starts.
//
// The remaining variants only wrap the plumbing around those two: reading a
// configuration file and talking to the worker pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// No tracked point remains within the sensor's detection radius.
    #[error("area lost after {elapsed:.3}s: no point within detection range")]
    AreaLost { elapsed: f64 },

    /// The configuration cannot be simulated.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to read configuration file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A worker dropped its result channel before answering.
    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

impl SimulationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn is_area_lost(&self) -> bool {
        matches!(self, Self::AreaLost { .. })
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;

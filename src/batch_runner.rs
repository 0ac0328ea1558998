// THEORY:
// The `batch_runner` executes many independent runs at once. It keeps the shape
// of the vision engine's frame pool: a dispatcher task deals tasks round-robin
// onto one channel per worker, every worker answers over a oneshot channel, and
// the caller awaits the answers together.
//
// Key principles:
// 1.  **Nothing shared but the tally**: a `RunTask` carries its own
//     configuration handle and seed, and the worker builds a fresh `Simulation`
//     from them. The only shared mutable state is the sweep accumulator behind
//     a mutex, and each finished run is added to it exactly once.
// 2.  **Blocking workers**: a run is a tight synchronous loop, so workers live
//     on `spawn_blocking` threads and never stall the async side.
// 3.  **Pool size**: one worker per core, minus one for the caller.
// 4.  **Ordered output**: batch results come back in submission order and sweep
//     rows in range order. Repetitions inside one sweep value finish in any
//     order.
// 5.  **Coarse progress**: every 10th (batch) or 20th (sweep) completion, plus
//     the last one, is logged and published on an optional watch channel.

use crate::config::{SensorVariant, ShapeKind, SimulationConfig, SweepVariable};
use crate::core_modules::statistics::{RunStatistics, SweepAccumulator, SweepRow};
use crate::error::{Result, SimulationError};
use crate::simulation::run_single;
use futures::FutureExt;
use futures::future::join_all;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

const BATCH_PROGRESS_EVERY: usize = 10;
const SWEEP_PROGRESS_EVERY: usize = 20;
const MAX_SWEEP_VALUES: usize = 5000;
const SWEEP_RANGE_TOLERANCE: f64 = 1e-9;

/// Coarse progress of a batch or sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    /// Sweep value currently running.
    pub value: Option<f64>,
}

pub enum RunSink {
    Collect(oneshot::Sender<Result<RunStatistics>>),
    Accumulate {
        stats: Arc<Mutex<SweepAccumulator>>,
        done: oneshot::Sender<Result<()>>,
    },
}

pub struct RunTask {
    pub config: Arc<SimulationConfig>,
    pub seed: u64,
    pub sink: RunSink,
}

impl RunTask {
    fn execute(self) {
        let result = run_single(&self.config, self.seed);
        match self.sink {
            RunSink::Collect(result_sender) => {
                let _ = result_sender.send(result);
            }
            RunSink::Accumulate { stats, done } => {
                let outcome = result.map(|run| {
                    stats.lock().unwrap_or_else(PoisonError::into_inner).add(&run);
                });
                let _ = done.send(outcome);
            }
        }
    }
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<RunTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Must be called from within a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<RunTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| mpsc::unbounded_channel::<RunTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                // A dead worker drops the task, and its caller sees a closed channel.
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % size;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_id, mut worker_receiver)| {
                tokio::task::spawn_blocking(move || {
                    debug!(worker_id, "worker started");
                    while let Some(task) = worker_receiver.blocking_recv() {
                        task.execute();
                    }
                    debug!(worker_id, "worker stopped");
                })
            })
            .collect();

        Self { task_sender, workers }
    }

    /// Available hardware parallelism minus one, at least 1.
    pub fn default_size() -> usize {
        num_cpus::get().saturating_sub(1).max(1)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, task: RunTask) -> Result<()> {
        self.task_sender
            .send(task)
            .map_err(|_| SimulationError::WorkerPool("failed to send task to worker pool".into()))
    }

    /// Closes the task queue and waits for every worker to drain it.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn closed_channel<E>(_: E) -> SimulationError {
    SimulationError::WorkerPool("failed to receive result from worker".into())
}

pub struct BatchRunner {
    pool: WorkerPool,
    progress: Option<watch::Sender<BatchProgress>>,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::with_workers(WorkerPool::default_size())
    }

    pub fn with_workers(workers: usize) -> Self {
        Self { pool: WorkerPool::new(workers), progress: None }
    }

    pub fn with_progress(mut self, progress: watch::Sender<BatchProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Runs `config.batch_runs` independent repetitions and returns their
    /// statistics in submission order.
    pub async fn run_batch(&self, config: &SimulationConfig) -> Result<Vec<RunStatistics>> {
        config.validate()?;
        let total = config.batch_runs;
        info!(runs = total, workers = self.workers(), "starting batch");

        let shared = Arc::new(config.clone());
        let mut seeds = seed_source(config);
        let completed = AtomicUsize::new(0);

        let mut pending = Vec::with_capacity(total);
        for _ in 0..total {
            let (result_sender, result_receiver) = oneshot::channel();
            self.pool.submit(RunTask {
                config: Arc::clone(&shared),
                seed: seeds.random(),
                sink: RunSink::Collect(result_sender),
            })?;
            pending.push(result_receiver.map(|received| {
                self.report(&completed, total, None, BATCH_PROGRESS_EVERY);
                received
            }));
        }

        let runs = join_all(pending)
            .await
            .into_iter()
            .map(|received| received.map_err(closed_channel).and_then(|run| run))
            .collect::<Result<Vec<_>>>()?;

        let lost = runs.iter().filter(|r| r.is_lost()).count();
        info!(runs = runs.len(), lost, "batch complete");
        Ok(runs)
    }

    /// Scans `variable` over `from..=to` in steps of `step`, running
    /// `config.sweep_runs_per_value` repetitions per value.
    pub async fn run_sweep(
        &self,
        config: &SimulationConfig,
        variable: SweepVariable,
        from: f64,
        to: f64,
        step: f64,
    ) -> Result<Vec<SweepRow>> {
        if variable == SweepVariable::Radius && config.shape != ShapeKind::Circle {
            return Err(SimulationError::invalid(format!(
                "sweep variable radius has no effect on a {} area",
                config.shape
            )));
        }
        let values = sweep_values(from, to, step)?;
        let repetitions = config.sweep_runs_per_value;
        let total = values.len() * repetitions;
        info!(%variable, values = values.len(), repetitions, workers = self.workers(), "starting sweep");

        let mut seeds = seed_source(config);
        let completed = AtomicUsize::new(0);
        let mut rows = Vec::with_capacity(values.len());

        for value in values {
            let mut value_config = config.clone();
            // Sweep rows report hull metrics, which only the full sensor produces.
            value_config.sensor = SensorVariant::Full;
            variable.apply(&mut value_config, value);
            value_config.validate()?;
            let shared = Arc::new(value_config);
            let accumulator = Arc::new(Mutex::new(SweepAccumulator::default()));

            let mut pending = Vec::with_capacity(repetitions);
            for _ in 0..repetitions {
                let (done_sender, done_receiver) = oneshot::channel();
                self.pool.submit(RunTask {
                    config: Arc::clone(&shared),
                    seed: seeds.random(),
                    sink: RunSink::Accumulate { stats: Arc::clone(&accumulator), done: done_sender },
                })?;
                pending.push(done_receiver.map(|received| {
                    self.report(&completed, total, Some(value), SWEEP_PROGRESS_EVERY);
                    received
                }));
            }

            for received in join_all(pending).await {
                received.map_err(closed_channel).and_then(|done| done)?;
            }

            let row = accumulator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .to_row(variable.name(), value);
            info!(
                %variable,
                value,
                loss_probability = row.loss_probability,
                "sweep value complete"
            );
            rows.push(row);
        }

        Ok(rows)
    }

    fn report(&self, completed: &AtomicUsize, total: usize, value: Option<f64>, every: usize) {
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % every != 0 && done != total {
            return;
        }
        info!(done, total, "progress");
        if let Some(progress) = &self.progress {
            progress.send_replace(BatchProgress { completed: done, total, value });
        }
    }

    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Master source for per-run seeds: the configured seed, or a fresh one.
fn seed_source(config: &SimulationConfig) -> ChaCha8Rng {
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    ChaCha8Rng::seed_from_u64(seed)
}

/// `from, from + step, ...` up to `to` (with a small tolerance), each rounded
/// to 12 decimals.
pub fn sweep_values(from: f64, to: f64, step: f64) -> Result<Vec<f64>> {
    if !(from.is_finite() && to.is_finite() && step.is_finite()) {
        return Err(SimulationError::invalid("sweep range must be finite"));
    }
    if step <= 0.0 {
        return Err(SimulationError::invalid(format!("sweep step must be positive, got {step}")));
    }
    if from > to {
        return Err(SimulationError::invalid(format!("sweep range is empty: {from} > {to}")));
    }

    let mut values = Vec::new();
    loop {
        let value = from + step * values.len() as f64;
        if value > to + SWEEP_RANGE_TOLERANCE {
            break;
        }
        if values.len() == MAX_SWEEP_VALUES {
            return Err(SimulationError::invalid(format!(
                "sweep range has more than {MAX_SWEEP_VALUES} values"
            )));
        }
        values.push((value * 1e12).round() / 1e12);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::statistics::BatchSummary;

    fn quick_config() -> SimulationConfig {
        SimulationConfig {
            simulation_time: 0.5,
            point_count: 6,
            batch_runs: 12,
            sweep_runs_per_value: 5,
            seed: Some(99),
            ..Default::default()
        }
    }

    #[test]
    fn sweep_values_are_inclusive_and_rounded() {
        assert_eq!(sweep_values(0.0, 1.0, 0.25).unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let tenths = sweep_values(1.0, 2.0, 0.1).unwrap();
        assert_eq!(tenths.len(), 11);
        assert_eq!(tenths[3], 1.3);
        assert_eq!(*tenths.last().unwrap(), 2.0);
        assert_eq!(sweep_values(3.0, 3.0, 1.0).unwrap(), vec![3.0]);
    }

    #[test]
    fn bad_sweep_ranges_are_rejected() {
        assert!(sweep_values(0.0, 1.0, 0.0).is_err());
        assert!(sweep_values(0.0, 1.0, -0.5).is_err());
        assert!(sweep_values(2.0, 1.0, 0.5).is_err());
        assert!(sweep_values(0.0, 10_000.0, 1.0).is_err());
        assert_eq!(sweep_values(1.0, 5000.0, 1.0).unwrap().len(), 5000);
    }

    #[test]
    fn default_pool_leaves_a_core_free() {
        assert!(WorkerPool::default_size() >= 1);
        assert!(WorkerPool::default_size() <= num_cpus::get().max(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_returns_every_run() {
        let runner = BatchRunner::with_workers(3);
        let config = quick_config();
        let runs = runner.run_batch(&config).await.unwrap();
        assert_eq!(runs.len(), 12);

        let summary = BatchSummary::from_runs(&runs);
        let lost = runs.iter().filter(|r| r.seconds_until_loss > 0.0).count();
        assert_eq!(summary.loss_count, lost);
        assert_eq!(summary.loss_probability, lost as f64 * 100.0 / 12.0);
        runner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn seeded_batches_repeat() {
        let runner = BatchRunner::with_workers(2);
        let config = quick_config();
        let first = runner.run_batch(&config).await.unwrap();
        let second = runner.run_batch(&config).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_produces_one_row_per_value() {
        let (progress_sender, progress_receiver) = watch::channel(BatchProgress::default());
        let runner = BatchRunner::with_workers(2).with_progress(progress_sender);
        let rows = runner
            .run_sweep(&quick_config(), SweepVariable::AreaMaxSpeed, 0.0, 20.0, 10.0)
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(|r| r.value).collect::<Vec<_>>(), vec![0.0, 10.0, 20.0]);
        assert!(rows.iter().all(|r| r.repetitions == 5 && r.variable == "Vmax"));

        let last = *progress_receiver.borrow();
        assert_eq!(last.completed, 15);
        assert_eq!(last.total, 15);
        assert_eq!(last.value, Some(20.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_rejects_values_that_break_the_configuration() {
        let runner = BatchRunner::with_workers(1);
        let result = runner
            .run_sweep(&quick_config(), SweepVariable::Radius, 100.0, 10_000.0, 9_900.0)
            .await;
        assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_always_measures_hulls() {
        let runner = BatchRunner::with_workers(2);
        let config = SimulationConfig { sensor: SensorVariant::Slim, ..quick_config() };
        let rows = runner
            .run_sweep(&config, SweepVariable::AreaMaxSpeed, 0.0, 0.0, 1.0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].loss_count, 0);
        assert!(rows[0].average_true_hull_area > 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn radius_sweep_needs_a_circle() {
        let runner = BatchRunner::with_workers(1);
        let config = SimulationConfig { shape: ShapeKind::Rectangle, ..quick_config() };
        let result = runner
            .run_sweep(&config, SweepVariable::Radius, 50.0, 100.0, 25.0)
            .await;
        assert!(matches!(result, Err(SimulationError::InvalidConfiguration(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_batch_configuration_is_rejected() {
        let runner = BatchRunner::with_workers(1);
        let config = SimulationConfig { point_count: 0, ..quick_config() };
        assert!(runner.run_batch(&config).await.is_err());
    }
}

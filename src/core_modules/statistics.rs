// THEORY:
// The `statistics` module turns sensor readings into numbers a caller can
// compare. There are three levels:
//
// 1.  **RunStatistics**: the per-step time series of one run plus its terminal
//     `seconds_until_loss` (0 means the run was never lost).
// 2.  **BatchSummary**: a fixed batch of runs reduced to a loss probability,
//     the list of loss times and the mean of each per-run average.
// 3.  **SweepAccumulator / SweepRow**: the running totals for one scanned
//     parameter value. Workers add finished runs concurrently behind a mutex;
//     the row is read once every repetition has been counted.
//
// Every average skips NaN and infinite samples, and an average over nothing is
// 0 rather than NaN, so a summary is always printable.

use crate::core_modules::sensor::SensorReading;
use serde::Serialize;

/// Mean of the finite values, or `None` if there are none.
pub fn finite_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { None } else { Some(sum / count as f64) }
}

fn safe(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn safe_average(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { safe(sum / count as f64) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Visible points per step, before the detection filter.
    pub point_counts: Vec<usize>,
    pub hull_areas: Vec<f64>,
    pub true_hull_areas: Vec<f64>,
    /// Only steps whose visible outline had a center.
    pub center_delays: Vec<f64>,
    /// `hull / true hull * 100` per step, 0 when undefined.
    pub intersection_ratios: Vec<f64>,
    /// Simulated seconds until the cluster was lost, 0 if it never was.
    pub seconds_until_loss: f64,
}

impl RunStatistics {
    pub fn record(&mut self, reading: &SensorReading) {
        self.point_counts.push(reading.visible_count);
        if let Some(m) = reading.measurement {
            self.hull_areas.push(m.hull_area);
            self.true_hull_areas.push(m.true_hull_area);
            if let Some(delay) = m.center_delay {
                self.center_delays.push(delay);
            }
            self.intersection_ratios.push(m.intersection_ratio());
        }
    }

    pub fn is_lost(&self) -> bool {
        self.seconds_until_loss > 0.0
    }

    pub fn steps(&self) -> usize {
        self.point_counts.len()
    }

    pub fn average_point_count(&self) -> f64 {
        safe_mean(self.point_counts.iter().map(|c| *c as f64))
    }

    pub fn average_hull_area(&self) -> f64 {
        safe_mean(self.hull_areas.iter().copied())
    }

    pub fn average_true_hull_area(&self) -> f64 {
        safe_mean(self.true_hull_areas.iter().copied())
    }

    pub fn average_center_delay(&self) -> f64 {
        safe_mean(self.center_delays.iter().copied())
    }

    pub fn average_intersection_ratio(&self) -> f64 {
        safe_mean(self.intersection_ratios.iter().copied())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            lost: self.is_lost(),
            seconds_until_loss: self.seconds_until_loss,
            steps: self.steps(),
            average_point_count: self.average_point_count(),
            average_hull_area: self.average_hull_area(),
            average_true_hull_area: self.average_true_hull_area(),
            average_center_delay: self.average_center_delay(),
            average_intersection_ratio: self.average_intersection_ratio(),
        }
    }
}

fn safe_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    finite_mean(values).unwrap_or(0.0)
}

/// One run reduced to its averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub lost: bool,
    pub seconds_until_loss: f64,
    pub steps: usize,
    pub average_point_count: f64,
    pub average_hull_area: f64,
    pub average_true_hull_area: f64,
    pub average_center_delay: f64,
    pub average_intersection_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub runs: usize,
    pub loss_count: usize,
    /// Percent of runs that lost the cluster.
    pub loss_probability: f64,
    pub loss_times: Vec<f64>,
    pub average_point_count: f64,
    pub average_hull_area: f64,
    pub average_true_hull_area: f64,
    pub average_center_delay: f64,
    pub average_intersection_ratio: f64,
}

impl BatchSummary {
    /// Averages are taken over every run's own average, lost runs included.
    pub fn from_runs(runs: &[RunStatistics]) -> Self {
        let loss_times: Vec<f64> = runs
            .iter()
            .filter(|r| r.is_lost())
            .map(|r| r.seconds_until_loss)
            .collect();
        let summaries: Vec<RunSummary> = runs.iter().map(RunStatistics::summary).collect();
        let mean_of = |field: fn(&RunSummary) -> f64| safe_mean(summaries.iter().map(field));

        Self {
            runs: runs.len(),
            loss_count: loss_times.len(),
            loss_probability: safe_average(loss_times.len() as f64 * 100.0, runs.len()),
            average_point_count: mean_of(|s| s.average_point_count),
            average_hull_area: mean_of(|s| s.average_hull_area),
            average_true_hull_area: mean_of(|s| s.average_true_hull_area),
            average_center_delay: mean_of(|s| s.average_center_delay),
            average_intersection_ratio: mean_of(|s| s.average_intersection_ratio),
            loss_times,
        }
    }
}

/// Running totals for one sweep value.
///
/// Lost runs only contribute their loss time; the metric sums cover completed
/// runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepAccumulator {
    repetitions: usize,
    completed_runs: usize,
    loss_count: usize,
    sum_point_count: f64,
    sum_hull_area: f64,
    sum_true_hull_area: f64,
    sum_center_delay: f64,
    sum_loss_time: f64,
}

impl SweepAccumulator {
    pub fn add(&mut self, run: &RunStatistics) {
        self.repetitions += 1;
        if run.is_lost() {
            self.loss_count += 1;
            self.sum_loss_time += run.seconds_until_loss;
            return;
        }
        self.completed_runs += 1;
        self.sum_point_count += run.average_point_count();
        self.sum_hull_area += run.average_hull_area();
        self.sum_true_hull_area += run.average_true_hull_area();
        self.sum_center_delay += run.average_center_delay();
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn loss_count(&self) -> usize {
        self.loss_count
    }

    /// `Σ hull / Σ true hull * 100`, 0 when the denominator is not usable.
    pub fn intersection_ratio(&self) -> f64 {
        if !(self.sum_true_hull_area.is_finite() && self.sum_true_hull_area > 0.0) {
            return 0.0;
        }
        safe(self.sum_hull_area / self.sum_true_hull_area * 100.0)
    }

    pub fn to_row(&self, variable: &str, value: f64) -> SweepRow {
        SweepRow {
            variable: variable.to_string(),
            value,
            repetitions: self.repetitions,
            loss_count: self.loss_count,
            loss_probability: safe_average(self.loss_count as f64 * 100.0, self.repetitions),
            average_point_count: safe_average(self.sum_point_count, self.completed_runs),
            average_hull_area: safe_average(self.sum_hull_area, self.completed_runs),
            average_true_hull_area: safe_average(self.sum_true_hull_area, self.completed_runs),
            average_center_delay: safe_average(self.sum_center_delay, self.completed_runs),
            average_intersection_ratio: self.intersection_ratio(),
            average_loss_time: safe_average(self.sum_loss_time, self.loss_count),
        }
    }
}

/// Aggregated result of every repetition for one scanned value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub variable: String,
    pub value: f64,
    pub repetitions: usize,
    pub loss_count: usize,
    pub loss_probability: f64,
    pub average_point_count: f64,
    pub average_hull_area: f64,
    pub average_true_hull_area: f64,
    pub average_center_delay: f64,
    pub average_intersection_ratio: f64,
    /// Over lost runs only.
    pub average_loss_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::sensor::HullMeasurement;

    fn run(hull: f64, truth: f64, loss: f64) -> RunStatistics {
        let mut stats = RunStatistics::default();
        stats.record(&SensorReading {
            visible_count: 4,
            measurement: Some(HullMeasurement { hull_area: hull, true_hull_area: truth, center_delay: Some(1.0) }),
        });
        stats.seconds_until_loss = loss;
        stats
    }

    #[test]
    fn finite_mean_skips_non_finite() {
        assert_eq!(finite_mean([1.0, f64::NAN, 3.0, f64::INFINITY]), Some(2.0));
        assert_eq!(finite_mean(Vec::<f64>::new()), None);
    }

    #[test]
    fn slim_readings_only_count_points() {
        let mut stats = RunStatistics::default();
        stats.record(&SensorReading { visible_count: 3, measurement: None });
        assert_eq!(stats.point_counts, vec![3]);
        assert!(stats.hull_areas.is_empty());
        assert_eq!(stats.average_hull_area(), 0.0);
    }

    #[test]
    fn ratio_is_clamped_when_truth_is_empty() {
        let stats = run(10.0, 0.0, 0.0);
        assert_eq!(stats.intersection_ratios, vec![0.0]);
    }

    #[test]
    fn batch_loss_probability_counts_lost_runs() {
        let runs = vec![run(50.0, 100.0, 0.0), run(50.0, 100.0, 2.5), run(25.0, 100.0, 0.0), run(1.0, 2.0, 4.0)];
        let summary = BatchSummary::from_runs(&runs);
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.loss_count, 2);
        assert_eq!(summary.loss_probability, 50.0);
        assert_eq!(summary.loss_times, vec![2.5, 4.0]);
        assert!((summary.average_intersection_ratio - 43.75).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_is_all_zero() {
        let summary = BatchSummary::from_runs(&[]);
        assert_eq!(summary.loss_probability, 0.0);
        assert_eq!(summary.average_hull_area, 0.0);
    }

    #[test]
    fn sweep_row_separates_lost_and_completed_runs() {
        let mut acc = SweepAccumulator::default();
        acc.add(&run(30.0, 60.0, 0.0));
        acc.add(&run(10.0, 40.0, 0.0));
        acc.add(&run(99.0, 99.0, 3.0));
        acc.add(&run(99.0, 99.0, 5.0));

        let row = acc.to_row("Vmax", 12.5);
        assert_eq!(row.repetitions, 4);
        assert_eq!(row.loss_count, 2);
        assert_eq!(row.loss_probability, 50.0);
        assert_eq!(row.average_hull_area, 20.0);
        assert_eq!(row.average_true_hull_area, 50.0);
        assert_eq!(row.average_intersection_ratio, 40.0);
        assert_eq!(row.average_loss_time, 4.0);
        assert_eq!(row.average_point_count, 4.0);
    }
}

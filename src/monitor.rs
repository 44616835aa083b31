//! Algorithm performance tracking and alerting.
//!
//! The monitor is shared between planners and route sessions, so it is
//! internally synchronized and every method takes `&self`. Alerts go to the
//! registered sinks; the monitor itself only keeps the most recent
//! `monitor.alert_buffer` of them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use crate::config::MonitorConfig;
use crate::error::OptimizerError;
use crate::models::{Alert, AlertKind, RouteReoptimizationState, TspAlgorithm, TspAlgorithmStats};
use crate::traits::AlertSink;
use crate::tsp::{Comparison, SequenceResult};

#[derive(Default)]
struct MonitorState {
    stats: BTreeMap<TspAlgorithm, TspAlgorithmStats>,
    alerts: VecDeque<Alert>,
}

/// Tracks sequencing runs per algorithm and raises alerts when runs are
/// slow, fall behind the best algorithm, fail, or reroute a driver too often.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    sinks: Vec<Box<dyn AlertSink + Send + Sync>>,
}

impl PerformanceMonitor {
    /// Create a monitor with no alert sinks.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
            sinks: Vec::new(),
        }
    }

    /// Also deliver alerts to `sink`.
    pub fn with_sink(mut self, sink: impl AlertSink + Send + Sync + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        // Stats stay usable even if a recording thread panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one successful sequencing run.
    pub fn record_run(&self, result: &SequenceResult) {
        let alert = {
            let mut state = self.state();
            let stats = state
                .stats
                .entry(result.algorithm)
                .or_insert_with(|| TspAlgorithmStats::new(result.algorithm));
            let cost = result.evaluation.cost;

            stats.runs += 1;
            let runs = stats.runs as f64;
            stats.mean_cost += (cost - stats.mean_cost) / runs;
            stats.mean_runtime_ms += (result.runtime_ms - stats.mean_runtime_ms) / runs;
            stats.max_runtime_ms = stats.max_runtime_ms.max(result.runtime_ms);
            stats.best_cost = Some(stats.best_cost.map_or(cost, |best| best.min(cost)));

            (result.runtime_ms > self.config.max_runtime_ms).then(|| Alert {
                kind: AlertKind::SlowSolve,
                algorithm: Some(result.algorithm),
                message: format!(
                    "{} took {:.1} ms for {} stops",
                    result.algorithm.name(),
                    result.runtime_ms,
                    result.stops.len()
                ),
                value: result.runtime_ms,
                threshold: self.config.max_runtime_ms,
            })
        };

        if let Some(alert) = alert {
            self.raise(alert);
        }
    }

    /// Record a run that produced no route.
    pub fn record_failure(&self, algorithm: TspAlgorithm, error: &OptimizerError) {
        if !matches!(error, OptimizerError::NoFeasibleSequence) {
            return;
        }
        {
            let mut state = self.state();
            let stats = state
                .stats
                .entry(algorithm)
                .or_insert_with(|| TspAlgorithmStats::new(algorithm));
            stats.runs += 1;
            stats.infeasible_runs += 1;
        }
        self.raise(Alert {
            kind: AlertKind::Infeasible,
            algorithm: Some(algorithm),
            message: format!("{} found no feasible sequence", algorithm.name()),
            value: 1.0,
            threshold: 0.0,
        });
    }

    /// Record every run of a comparison, credit the winner and flag
    /// algorithms that fall too far behind it.
    pub fn record_comparison(&self, comparison: &Comparison) {
        let best_cost = comparison.best_result().map(|best| best.evaluation.cost);

        for (index, (algorithm, result)) in comparison.results.iter().enumerate() {
            let result = match result {
                Ok(result) => result,
                Err(err) => {
                    self.record_failure(*algorithm, err);
                    continue;
                }
            };
            self.record_run(result);

            let Some(best_cost) = best_cost else {
                continue;
            };
            let gap = gap_pct(result.evaluation.cost, best_cost);
            {
                let mut state = self.state();
                if let Some(stats) = state.stats.get_mut(algorithm) {
                    stats.last_gap_pct = Some(gap);
                    if comparison.best == Some(index) {
                        stats.wins += 1;
                    }
                }
            }

            if gap > self.config.max_gap_pct {
                self.raise(Alert {
                    kind: AlertKind::QualityGap,
                    algorithm: Some(*algorithm),
                    message: format!(
                        "{} is {:.1}% worse than the best algorithm",
                        algorithm.name(),
                        gap
                    ),
                    value: gap,
                    threshold: self.config.max_gap_pct,
                });
            }
        }
    }

    /// Flag a route re-optimized more often than allowed in the last hour.
    pub fn record_reoptimization(&self, state: &RouteReoptimizationState, now: i64) {
        let recent = state.reroutes_within_window(now);

        if recent > self.config.max_reoptimizations_per_hour {
            self.raise(Alert {
                kind: AlertKind::ExcessiveReoptimization,
                algorithm: None,
                message: format!("route re-optimized {} times in the last hour", recent),
                value: recent as f64,
                threshold: self.config.max_reoptimizations_per_hour as f64,
            });
        }
    }

    /// Snapshot of one algorithm's figures, if it has run.
    pub fn stats(&self, algorithm: TspAlgorithm) -> Option<TspAlgorithmStats> {
        self.state().stats.get(&algorithm).cloned()
    }

    /// Snapshot of every algorithm that has run, in algorithm order.
    pub fn all_stats(&self) -> Vec<TspAlgorithmStats> {
        self.state().stats.values().cloned().collect()
    }

    /// Buffered alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state().alerts.iter().cloned().collect()
    }

    /// Take the buffered alerts, leaving the buffer empty.
    pub fn drain_alerts(&self) -> Vec<Alert> {
        self.state().alerts.drain(..).collect()
    }

    fn raise(&self, alert: Alert) {
        warn!(kind = ?alert.kind, value = alert.value, threshold = alert.threshold, "{}", alert.message);
        for sink in &self.sinks {
            sink.raise(&alert);
        }
        let limit = self.config.alert_buffer;
        if limit == 0 {
            return;
        }
        let mut state = self.state();
        while state.alerts.len() >= limit {
            state.alerts.pop_front();
        }
        state.alerts.push_back(alert);
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

/// Relative gap of `cost` over `best`, in percent.
fn gap_pct(cost: f64, best: f64) -> f64 {
    if best.abs() < f64::EPSILON {
        if cost.abs() < f64::EPSILON { 0.0 } else { 100.0 }
    } else {
        (cost - best) / best * 100.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SolverConfig;
    use crate::cost::tests::{line_problem, order};
    use crate::models::{ReoptimizationRecord, ReoptimizationTrigger};
    use crate::tsp::{compare, solve};

    #[derive(Default, Clone)]
    struct CollectingSink(Arc<Mutex<Vec<AlertKind>>>);

    impl AlertSink for CollectingSink {
        fn raise(&self, alert: &Alert) {
            self.0.lock().unwrap().push(alert.kind);
        }
    }

    fn fast_result() -> SequenceResult {
        let problem = line_problem(vec![order(1.0, 2.0)]);
        solve(&problem, TspAlgorithm::NearestNeighbor, &SolverConfig::default()).unwrap()
    }

    #[test]
    fn test_record_run_updates_means() {
        let monitor = PerformanceMonitor::default();
        let mut result = fast_result();
        result.runtime_ms = 2.0;
        monitor.record_run(&result);
        result.runtime_ms = 4.0;
        monitor.record_run(&result);

        let stats = monitor.stats(TspAlgorithm::NearestNeighbor).unwrap();
        assert_eq!(stats.runs, 2);
        assert!((stats.mean_runtime_ms - 3.0).abs() < 1e-9);
        assert_eq!(stats.max_runtime_ms, 4.0);
        assert_eq!(stats.best_cost, Some(result.evaluation.cost));
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_slow_solve_alert_reaches_sink() {
        let sink = CollectingSink::default();
        let monitor = PerformanceMonitor::new(MonitorConfig {
            max_runtime_ms: 10.0,
            ..MonitorConfig::default()
        })
        .with_sink(sink.clone());

        let mut result = fast_result();
        result.runtime_ms = 25.0;
        monitor.record_run(&result);

        assert_eq!(*sink.0.lock().unwrap(), vec![AlertKind::SlowSolve]);
        assert_eq!(monitor.drain_alerts().len(), 1);
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_comparison_credits_winner() {
        let problem = line_problem(vec![order(5.0, 1.0), order(2.0, 6.0), order(4.0, 3.0)]);
        let comparison = compare(
            &problem,
            &[TspAlgorithm::NearestNeighbor, TspAlgorithm::Exhaustive],
            &SolverConfig::default(),
        );
        let monitor = PerformanceMonitor::default();
        monitor.record_comparison(&comparison);

        let exhaustive = monitor.stats(TspAlgorithm::Exhaustive).unwrap();
        assert_eq!(exhaustive.runs, 1);
        assert_eq!(exhaustive.last_gap_pct, Some(0.0));
        let wins: u64 = monitor.all_stats().iter().map(|s| s.wins).sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_infeasible_alert() {
        let monitor = PerformanceMonitor::default();
        monitor.record_failure(TspAlgorithm::Genetic, &OptimizerError::NoFeasibleSequence);
        let stats = monitor.stats(TspAlgorithm::Genetic).unwrap();
        assert_eq!(stats.infeasible_runs, 1);
        assert_eq!(monitor.alerts()[0].kind, AlertKind::Infeasible);
    }

    #[test]
    fn test_too_many_stops_is_not_a_failure() {
        let monitor = PerformanceMonitor::default();
        monitor.record_failure(
            TspAlgorithm::Exhaustive,
            &OptimizerError::TooManyStops {
                algorithm: TspAlgorithm::Exhaustive,
                stops: 20,
                max: 8,
            },
        );
        assert!(monitor.stats(TspAlgorithm::Exhaustive).is_none());
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_excessive_reoptimization() {
        let monitor = PerformanceMonitor::new(MonitorConfig {
            max_reoptimizations_per_hour: 2,
            ..MonitorConfig::default()
        });
        let record = |at| ReoptimizationRecord {
            at,
            trigger: ReoptimizationTrigger::TrafficIncident,
            previous_cost: Some(10.0),
            new_cost: 8.0,
            improvement_pct: 20.0,
            accepted: true,
        };
        let mut state = RouteReoptimizationState::default();
        for at in [100, 4000, 4100] {
            state.record_reroute(at);
        }
        monitor.record_reoptimization(&state, 4200);
        assert!(monitor.alerts().is_empty());

        // The bounded history does not hide reroutes from the rate check.
        state.history = vec![record(4150)];
        state.record_reroute(4150);
        monitor.record_reoptimization(&state, 4200);
        assert_eq!(monitor.alerts()[0].kind, AlertKind::ExcessiveReoptimization);
    }

    #[test]
    fn test_alert_buffer_is_bounded() {
        let sink = CollectingSink::default();
        let monitor = PerformanceMonitor::new(MonitorConfig {
            max_runtime_ms: 1.0,
            alert_buffer: 2,
            ..MonitorConfig::default()
        })
        .with_sink(sink.clone());

        let mut result = fast_result();
        for runtime_ms in [10.0, 20.0, 30.0] {
            result.runtime_ms = runtime_ms;
            monitor.record_run(&result);
        }

        assert_eq!(sink.0.lock().unwrap().len(), 3);
        let buffered: Vec<f64> = monitor.alerts().iter().map(|alert| alert.value).collect();
        assert_eq!(buffered, vec![20.0, 30.0]);
    }

    #[test]
    fn test_gap_pct() {
        assert!((gap_pct(12.0, 10.0) - 20.0).abs() < 1e-9);
        assert_eq!(gap_pct(0.0, 0.0), 0.0);
        assert_eq!(gap_pct(1.0, 0.0), 100.0);
    }
}

//! Pickup-and-delivery stop sequencing.
//!
//! Each algorithm turns a [`RoutingProblem`] into an ordered list of stops.
//! Results are always re-evaluated through [`RoutingProblem::evaluate`], so an
//! algorithm can only return sequences that respect precedence and capacity.

pub mod annealing;
pub mod exhaustive;
pub mod genetic;
pub mod local_search;
pub mod nearest_neighbor;

use std::time::Instant;

use rayon::prelude::*;

use crate::config::SolverConfig;
use crate::cost::{Evaluation, RoutingProblem, Stop};
use crate::error::{OptimizerError, Result};
use crate::models::TspAlgorithm;

/// Outcome of one sequencing run.
#[derive(Debug, Clone)]
pub struct SequenceResult {
    pub stops: Vec<Stop>,
    pub evaluation: Evaluation,
    /// Concrete algorithm that ran.
    pub algorithm: TspAlgorithm,
    /// Algorithm-specific work count (passes, moves, generations, nodes).
    pub iterations: usize,
    pub runtime_ms: f64,
}

/// Map `Auto` to a concrete algorithm for a problem with `stops` stops.
pub fn resolve_algorithm(algorithm: TspAlgorithm, stops: usize, config: &SolverConfig) -> TspAlgorithm {
    match algorithm {
        TspAlgorithm::Auto if stops <= config.max_exact_stops => TspAlgorithm::Exhaustive,
        TspAlgorithm::Auto if stops <= config.large_route_stops => TspAlgorithm::LocalSearch,
        TspAlgorithm::Auto => TspAlgorithm::SimulatedAnnealing,
        concrete => concrete,
    }
}

/// Sequence the problem's stops with `algorithm`.
pub fn solve(problem: &RoutingProblem, algorithm: TspAlgorithm, config: &SolverConfig) -> Result<SequenceResult> {
    let stop_count = problem.required_stops().len();
    let algorithm = resolve_algorithm(algorithm, stop_count, config);
    let started = Instant::now();

    let (stops, iterations) = match algorithm {
        TspAlgorithm::NearestNeighbor => nearest_neighbor::construct(problem).map(|stops| (stops, 1)),
        TspAlgorithm::LocalSearch | TspAlgorithm::Auto => nearest_neighbor::construct(problem)
            .map(|initial| local_search::improve(problem, initial, config.local_search_iterations)),
        TspAlgorithm::SimulatedAnnealing => nearest_neighbor::construct(problem)
            .map(|initial| annealing::anneal(problem, initial, &config.annealing, config.seed)),
        TspAlgorithm::Genetic => genetic::evolve(problem, &config.genetic, config.seed),
        TspAlgorithm::Exhaustive => {
            if stop_count > config.max_exact_stops {
                return Err(OptimizerError::TooManyStops {
                    algorithm,
                    stops: stop_count,
                    max: config.max_exact_stops,
                });
            }
            exhaustive::search(problem)
        }
    }
    .ok_or(OptimizerError::NoFeasibleSequence)?;

    let evaluation = problem
        .evaluate(&stops)
        .ok_or(OptimizerError::NoFeasibleSequence)?;
    let runtime_ms = started.elapsed().as_secs_f64() * 1000.0;

    tracing::debug!(
        algorithm = algorithm.name(),
        stops = stop_count,
        cost = evaluation.cost,
        iterations,
        runtime_ms,
        "sequenced route"
    );

    Ok(SequenceResult {
        stops,
        evaluation,
        algorithm,
        iterations,
        runtime_ms,
    })
}

/// Results of running several algorithms on the same problem.
#[derive(Debug)]
pub struct Comparison {
    /// One entry per requested algorithm, in request order.
    pub results: Vec<(TspAlgorithm, Result<SequenceResult>)>,
    /// Index into `results` of the cheapest successful run.
    pub best: Option<usize>,
}

impl Comparison {
    /// The cheapest successful run, if any succeeded.
    pub fn best_result(&self) -> Option<&SequenceResult> {
        self.best
            .and_then(|index| self.results[index].1.as_ref().ok())
    }
}

/// Run `algorithms` in parallel on the same problem.
pub fn compare(problem: &RoutingProblem, algorithms: &[TspAlgorithm], config: &SolverConfig) -> Comparison {
    let results: Vec<(TspAlgorithm, Result<SequenceResult>)> = algorithms
        .par_iter()
        .map(|algorithm| (*algorithm, solve(problem, *algorithm, config)))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (index, (_, result)) in results.iter().enumerate() {
        if let Ok(result) = result {
            let cost = result.evaluation.cost;
            if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                best = Some((index, cost));
            }
        }
    }

    Comparison {
        results,
        best: best.map(|(index, _)| index),
    }
}

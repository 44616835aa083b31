//! First-improvement local search over a single route.
//!
//! Operators: 2-opt segment reversal and single-stop relocation. Candidates
//! that break precedence or capacity simply fail evaluation and are skipped.

use crate::cost::{RoutingProblem, Stop};

/// Improve `stops` until no operator finds a cheaper sequence or
/// `max_iterations` passes have run. Returns the sequence and passes used.
pub fn improve(problem: &RoutingProblem, mut stops: Vec<Stop>, max_iterations: usize) -> (Vec<Stop>, usize) {
    let mut cost = problem.cost_of(&stops);
    let mut passes = 0;

    while passes < max_iterations {
        passes += 1;
        let improved = two_opt_improve(problem, &mut stops, &mut cost)
            || relocate_improve(problem, &mut stops, &mut cost);
        if !improved {
            break;
        }
    }

    (stops, passes)
}

/// 2-opt: reverse a segment to reduce cost.
/// Returns true if an improvement was made.
pub fn two_opt_improve(problem: &RoutingProblem, stops: &mut [Stop], cost: &mut f64) -> bool {
    let n = stops.len();
    if n < 2 {
        return false;
    }

    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = stops.to_vec();
            candidate[i..=j].reverse();

            let candidate_cost = problem.cost_of(&candidate);
            if candidate_cost < *cost - 1e-9 {
                stops[i..=j].reverse();
                *cost = candidate_cost;
                return true;
            }
        }
    }

    false
}

/// Relocate: move one stop to another position.
/// Returns true if an improvement was made.
pub fn relocate_improve(problem: &RoutingProblem, stops: &mut Vec<Stop>, cost: &mut f64) -> bool {
    let n = stops.len();
    if n < 2 {
        return false;
    }

    for from in 0..n {
        for to in 0..n {
            if to == from {
                continue;
            }

            let mut candidate = stops.clone();
            let stop = candidate.remove(from);
            candidate.insert(to, stop);

            let candidate_cost = problem.cost_of(&candidate);
            if candidate_cost < *cost - 1e-9 {
                *stops = candidate;
                *cost = candidate_cost;
                return true;
            }
        }
    }

    false
}

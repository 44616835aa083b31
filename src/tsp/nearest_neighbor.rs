//! Greedy construction: always go to the cheapest allowed next stop.

use crate::cost::{RoutingProblem, Stop};

/// Build a complete sequence, or `None` if the greedy walk gets stuck.
pub fn construct(problem: &RoutingProblem) -> Option<Vec<Stop>> {
    let mut cursor = problem.cursor();
    let mut stops = Vec::with_capacity(problem.required_stops().len());

    while !cursor.is_complete() {
        let mut best: Option<(Stop, f64, i64)> = None;

        for candidate in cursor.candidates() {
            let mut next = cursor.clone();
            next.visit(candidate);
            let cost = next.cost();
            let time = next.time();
            // Ties go to the stop we can leave earliest.
            let better = match best {
                None => true,
                Some((_, best_cost, best_time)) => {
                    cost < best_cost - f64::EPSILON
                        || ((cost - best_cost).abs() <= f64::EPSILON && time < best_time)
                }
            };
            if better {
                best = Some((candidate, cost, time));
            }
        }

        let (stop, _, _) = best?;
        cursor.visit(stop);
        stops.push(stop);
    }

    Some(stops)
}

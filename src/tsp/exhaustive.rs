//! Depth-first branch-and-bound over all valid sequences.
//!
//! Cost only grows along a prefix, so a prefix already as expensive as the
//! best complete sequence is pruned.

use crate::cost::{Cursor, RoutingProblem, Stop};

/// Optimal sequence and number of search nodes expanded.
pub fn search(problem: &RoutingProblem) -> Option<(Vec<Stop>, usize)> {
    let mut search = Search {
        best: None,
        best_cost: f64::INFINITY,
        expanded: 0,
    };
    let mut prefix = Vec::with_capacity(problem.required_stops().len());
    search.descend(problem.cursor(), &mut prefix);

    let expanded = search.expanded;
    search.best.map(|stops| (stops, expanded))
}

struct Search {
    best: Option<Vec<Stop>>,
    best_cost: f64,
    expanded: usize,
}

impl Search {
    fn descend(&mut self, cursor: Cursor<'_>, prefix: &mut Vec<Stop>) {
        self.expanded += 1;

        if cursor.is_complete() {
            let cost = cursor.cost();
            if cost < self.best_cost {
                self.best_cost = cost;
                self.best = Some(prefix.clone());
            }
            return;
        }

        for candidate in cursor.candidates() {
            let mut next = cursor.clone();
            next.visit(candidate);
            if next.cost() >= self.best_cost {
                continue;
            }
            prefix.push(candidate);
            self.descend(next, prefix);
            prefix.pop();
        }
    }
}

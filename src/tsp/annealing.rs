//! Simulated annealing over stop sequences.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::AnnealingConfig;
use crate::cost::{RoutingProblem, Stop};

/// Anneal from `initial`, returning the best sequence seen and the number of
/// moves tried. The result is never worse than `initial`.
pub fn anneal(problem: &RoutingProblem, initial: Vec<Stop>, config: &AnnealingConfig, seed: u64) -> (Vec<Stop>, usize) {
    let n = initial.len();
    if n < 2 {
        return (initial, 0);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut current_cost = problem.cost_of(&initial);
    let mut current = initial;
    let mut best = current.clone();
    let mut best_cost = current_cost;

    let mut temperature = config.initial_temperature;
    let mut stalled = 0;
    let mut moves = 0;

    while temperature > config.min_temperature && stalled < config.stall_limit {
        let mut improved_best = false;

        for _ in 0..config.moves_per_temperature {
            moves += 1;
            let candidate = random_move(&current, &mut rng);
            let candidate_cost = problem.cost_of(&candidate);
            if !candidate_cost.is_finite() {
                continue;
            }

            let delta = candidate_cost - current_cost;
            if delta <= 0.0 || rng.r#gen::<f64>() < (-delta / temperature).exp() {
                current = candidate;
                current_cost = candidate_cost;

                if current_cost < best_cost - 1e-9 {
                    best = current.clone();
                    best_cost = current_cost;
                    improved_best = true;
                }
            }
        }

        stalled = if improved_best { 0 } else { stalled + 1 };
        temperature *= config.cooling_rate;
    }

    tracing::debug!(moves, best_cost, final_temperature = temperature, "annealing finished");
    (best, moves)
}

/// Relocate, swap or reverse, chosen uniformly.
fn random_move(stops: &[Stop], rng: &mut StdRng) -> Vec<Stop> {
    let n = stops.len();
    let mut candidate = stops.to_vec();
    let i = rng.gen_range(0..n);
    let mut j = rng.gen_range(0..n - 1);
    if j >= i {
        j += 1;
    }

    match rng.gen_range(0..3) {
        0 => {
            let stop = candidate.remove(i);
            candidate.insert(j, stop);
        }
        1 => candidate.swap(i, j),
        _ => {
            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            candidate[lo..=hi].reverse();
        }
    }

    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::tests::{line_problem, order};

    fn scrambled() -> Vec<Stop> {
        vec![
            Stop::pickup(2),
            Stop::dropoff(2),
            Stop::pickup(0),
            Stop::dropoff(0),
            Stop::pickup(1),
            Stop::dropoff(1),
        ]
    }

    #[test]
    fn test_never_worse_than_initial() {
        let problem = line_problem(vec![order(1.0, 2.0), order(3.0, 4.0), order(5.0, 6.0)]);
        let initial = scrambled();
        let initial_cost = problem.cost_of(&initial);
        let (best, moves) = anneal(&problem, initial, &AnnealingConfig::default(), 7);
        assert!(moves > 0);
        assert!(problem.cost_of(&best) <= initial_cost);
        assert!(problem.evaluate(&best).is_some());
    }

    #[test]
    fn test_deterministic_for_seed() {
        let problem = line_problem(vec![order(1.0, 2.0), order(3.0, 4.0), order(5.0, 6.0)]);
        let config = AnnealingConfig::default();
        let (a, _) = anneal(&problem, scrambled(), &config, 11);
        let (b, _) = anneal(&problem, scrambled(), &config, 11);
        assert_eq!(a, b);
    }

    #[test]
    fn test_finds_straight_run() {
        let problem = line_problem(vec![order(1.0, 2.0), order(3.0, 4.0), order(5.0, 6.0)]);
        let (best, _) = anneal(&problem, scrambled(), &AnnealingConfig::default(), 3);
        assert_eq!(problem.evaluate(&best).unwrap().total_distance_m, 6000);
    }

    #[test]
    fn test_single_stop_untouched() {
        let mut o = order(1.0, 2.0);
        o.on_board = true;
        let problem = line_problem(vec![o]);
        let (best, moves) = anneal(&problem, vec![Stop::dropoff(0)], &AnnealingConfig::default(), 1);
        assert_eq!(best, vec![Stop::dropoff(0)]);
        assert_eq!(moves, 0);
    }
}

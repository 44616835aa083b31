//! Genetic algorithm over stop sequences.
//!
//! Population is seeded with the nearest-neighbor tour plus random
//! permutations. Offspring come from order crossover and swap mutation, each
//! followed by precedence repair. Capacity violations are left to evaluation
//! (infinite cost) and die out through selection.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::GeneticConfig;
use crate::cost::{RoutingProblem, Stop, repair_precedence};
use crate::tsp::nearest_neighbor;

#[derive(Debug, Clone)]
struct Individual {
    stops: Vec<Stop>,
    cost: f64,
}

impl Individual {
    fn new(problem: &RoutingProblem, stops: Vec<Stop>) -> Self {
        let cost = problem.cost_of(&stops);
        Self { stops, cost }
    }
}

/// Evolve a sequence. Returns the best feasible sequence and the number of
/// generations run, or `None` if no feasible individual ever appeared.
pub fn evolve(problem: &RoutingProblem, config: &GeneticConfig, seed: u64) -> Option<(Vec<Stop>, usize)> {
    let required = problem.required_stops();
    if required.len() < 2 {
        return problem.evaluate(&required).map(|_| (required, 0));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut population = initial_population(problem, &required, config.population_size, &mut rng);
    sort_by_cost(&mut population);

    let mut best = population[0].clone();
    let mut stalled = 0;
    let mut generations = 0;

    while generations < config.generations && stalled < config.stall_generations {
        generations += 1;

        let elite = config.elite_count.min(population.len());
        let mut next: Vec<Individual> = population[..elite].to_vec();

        while next.len() < config.population_size {
            let first = tournament(&population, config.tournament_size, &mut rng);
            let second = tournament(&population, config.tournament_size, &mut rng);
            let mut child = order_crossover(&first.stops, &second.stops, &mut rng);
            if rng.r#gen::<f64>() < config.mutation_rate {
                swap_mutation(&mut child, &mut rng);
            }
            repair_precedence(&mut child);
            next.push(Individual::new(problem, child));
        }

        sort_by_cost(&mut next);
        population = next;

        if population[0].cost < best.cost - 1e-9 {
            best = population[0].clone();
            stalled = 0;
        } else {
            stalled += 1;
        }
    }

    tracing::debug!(generations, best_cost = best.cost, "genetic search finished");

    if best.cost.is_finite() {
        Some((best.stops, generations))
    } else {
        None
    }
}

fn initial_population(
    problem: &RoutingProblem,
    required: &[Stop],
    size: usize,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let mut population = Vec::with_capacity(size);
    if let Some(greedy) = nearest_neighbor::construct(problem) {
        population.push(Individual::new(problem, greedy));
    }
    while population.len() < size.max(1) {
        let mut stops = required.to_vec();
        stops.shuffle(rng);
        repair_precedence(&mut stops);
        population.push(Individual::new(problem, stops));
    }
    population
}

fn sort_by_cost(population: &mut [Individual]) {
    population.sort_by(|a, b| a.cost.total_cmp(&b.cost));
}

fn tournament<'p>(population: &'p [Individual], size: usize, rng: &mut StdRng) -> &'p Individual {
    let mut winner = &population[rng.gen_range(0..population.len())];
    for _ in 1..size {
        let contender = &population[rng.gen_range(0..population.len())];
        if contender.cost < winner.cost {
            winner = contender;
        }
    }
    winner
}

/// OX: keep a slice of `first`, fill the rest in `second`'s order.
fn order_crossover(first: &[Stop], second: &[Stop], rng: &mut StdRng) -> Vec<Stop> {
    let n = first.len();
    let a = rng.gen_range(0..n);
    let b = rng.gen_range(a..n);

    let kept = &first[a..=b];
    let mut rest = second.iter().filter(|stop| !kept.contains(stop));

    let mut child = Vec::with_capacity(n);
    for position in 0..n {
        if position >= a && position <= b {
            child.push(first[position]);
        } else if let Some(stop) = rest.next() {
            child.push(*stop);
        }
    }
    child
}

fn swap_mutation(stops: &mut [Stop], rng: &mut StdRng) {
    let i = rng.gen_range(0..stops.len());
    let j = rng.gen_range(0..stops.len());
    stops.swap(i, j);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::tests::{line_problem, order};

    #[test]
    fn test_crossover_is_permutation() {
        let mut rng = StdRng::seed_from_u64(5);
        let first = vec![Stop::pickup(0), Stop::dropoff(0), Stop::pickup(1), Stop::dropoff(1)];
        let second = vec![Stop::pickup(1), Stop::pickup(0), Stop::dropoff(1), Stop::dropoff(0)];
        for _ in 0..20 {
            let mut child = order_crossover(&first, &second, &mut rng);
            assert_eq!(child.len(), 4);
            child.sort_by_key(|stop| stop.node());
            assert_eq!(child, first);
        }
    }

    #[test]
    fn test_evolve_finds_feasible_route() {
        let problem = line_problem(vec![order(1.0, 2.0), order(3.0, 4.0), order(5.0, 6.0)]);
        let (stops, generations) = evolve(&problem, &GeneticConfig::default(), 9).unwrap();
        assert!(generations > 0);
        assert_eq!(problem.evaluate(&stops).unwrap().total_distance_m, 6000);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let problem = line_problem(vec![order(4.0, 1.0), order(3.0, 6.0), order(2.0, 5.0)]);
        let config = GeneticConfig::default();
        let a = evolve(&problem, &config, 21).unwrap();
        let b = evolve(&problem, &config, 21).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_infeasible_problem() {
        let mut problem = line_problem(vec![order(1.0, 2.0), order(3.0, 4.0)]);
        problem.capacity = 0;
        assert!(evolve(&problem, &GeneticConfig::default(), 1).is_none());
    }
}

//! Route simulation and multi-criteria cost evaluation.
//!
//! A [`RoutingProblem`] lays out travel nodes as `[start, p0, d0, p1, d1, ...]`
//! where `pi`/`di` are the pickup and drop-off of order `i`. Sequences are lists
//! of [`Stop`]s; a [`Cursor`] walks a sequence stop by stop, enforcing
//! pickup-before-drop-off and capacity while accumulating time and cost.

use serde::{Deserialize, Serialize};

use crate::config::ServiceTimes;
use crate::error::MatrixError;
use crate::models::{OptimizationCriteria, ScoreBreakdown, WaypointKind};
use crate::traits::{DistanceMatrixProvider, TrafficProvider, TravelMatrix};

/// One order as seen by the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrder {
    pub pickup: (f64, f64),
    pub dropoff: (f64, f64),
    /// When the vendor has the food ready.
    pub ready_at: i64,
    pub window: Option<(i64, i64)>,
    /// Already collected; only the drop-off remains.
    pub on_board: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stop {
    pub order: usize,
    pub kind: WaypointKind,
}

impl Stop {
    pub fn pickup(order: usize) -> Self {
        Self {
            order,
            kind: WaypointKind::Pickup,
        }
    }

    pub fn dropoff(order: usize) -> Self {
        Self {
            order,
            kind: WaypointKind::Dropoff,
        }
    }

    /// Index of this stop in the travel matrix.
    pub fn node(&self) -> usize {
        match self.kind {
            WaypointKind::Pickup => 1 + 2 * self.order,
            WaypointKind::Dropoff => 2 + 2 * self.order,
        }
    }
}

/// Per-unit cost weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub distance_per_km: f64,
    pub preparation_per_min: f64,
    pub traffic_per_min: f64,
    pub lateness_per_min: f64,
}

impl From<&OptimizationCriteria> for CostWeights {
    fn from(criteria: &OptimizationCriteria) -> Self {
        Self {
            distance_per_km: criteria.distance_weight,
            preparation_per_min: criteria.preparation_time_weight,
            traffic_per_min: criteria.traffic_weight,
            lateness_per_min: criteria.delivery_window_weight,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingProblem {
    pub start: (f64, f64),
    pub start_time: i64,
    pub orders: Vec<StopOrder>,
    pub matrix: TravelMatrix,
    /// Traffic multipliers in node layout; empty means free flow.
    pub traffic: Vec<Vec<f64>>,
    pub service: ServiceTimes,
    pub capacity: usize,
    pub weights: CostWeights,
}

impl RoutingProblem {
    /// Build a problem, fetching the travel matrix from `provider`.
    pub fn build<M>(
        start: (f64, f64),
        start_time: i64,
        orders: Vec<StopOrder>,
        provider: &M,
        service: ServiceTimes,
        capacity: usize,
        criteria: &OptimizationCriteria,
    ) -> Result<Self, MatrixError>
    where
        M: DistanceMatrixProvider + ?Sized,
    {
        let locations = node_locations(start, &orders);
        let matrix = provider.matrix_for(&locations)?;
        matrix.check_shape(locations.len())?;

        Ok(Self {
            start,
            start_time,
            orders,
            matrix,
            traffic: Vec::new(),
            service,
            capacity,
            weights: CostWeights::from(criteria),
        })
    }

    /// Sample `traffic` for every node pair.
    pub fn with_traffic<T>(mut self, traffic: &T) -> Self
    where
        T: TrafficProvider + ?Sized,
    {
        let locations = self.locations();
        self.traffic = locations
            .iter()
            .map(|from| {
                locations
                    .iter()
                    .map(|to| traffic.factor(*from, *to).max(1.0))
                    .collect()
            })
            .collect();
        self
    }

    pub fn locations(&self) -> Vec<(f64, f64)> {
        node_locations(self.start, &self.orders)
    }

    /// Coordinates of the node a stop visits.
    pub fn location_of(&self, stop: Stop) -> (f64, f64) {
        let order = &self.orders[stop.order];
        match stop.kind {
            WaypointKind::Pickup => order.pickup,
            WaypointKind::Dropoff => order.dropoff,
        }
    }

    /// Every stop a complete sequence must contain.
    pub fn required_stops(&self) -> Vec<Stop> {
        let mut stops = Vec::with_capacity(self.orders.len() * 2);
        for (index, order) in self.orders.iter().enumerate() {
            if !order.on_board {
                stops.push(Stop::pickup(index));
            }
            stops.push(Stop::dropoff(index));
        }
        stops
    }

    /// Capacity never below what is already on board.
    pub fn effective_capacity(&self) -> usize {
        let on_board = self.orders.iter().filter(|order| order.on_board).count();
        self.capacity.max(on_board)
    }

    /// A simulation positioned at the driver, before any stop.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Simulate a complete sequence. `None` if it is invalid or incomplete.
    pub fn evaluate(&self, stops: &[Stop]) -> Option<Evaluation> {
        let mut cursor = self.cursor();
        for stop in stops {
            if !cursor.visit(*stop) {
                return None;
            }
        }
        cursor.finish()
    }

    /// Cost of a complete sequence, `f64::INFINITY` when invalid.
    pub fn cost_of(&self, stops: &[Stop]) -> f64 {
        self.evaluate(stops).map_or(f64::INFINITY, |evaluation| evaluation.cost)
    }

    fn traffic_factor(&self, from: usize, to: usize) -> f64 {
        self.traffic
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(1.0)
    }
}

fn node_locations(start: (f64, f64), orders: &[StopOrder]) -> Vec<(f64, f64)> {
    let mut locations = Vec::with_capacity(1 + orders.len() * 2);
    locations.push(start);
    for order in orders {
        locations.push(order.pickup);
        locations.push(order.dropoff);
    }
    locations
}

/// Simulated timing at one stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTiming {
    pub arrival: i64,
    pub departure: i64,
    pub wait_secs: i64,
    pub lateness_secs: i64,
    pub distance_m: i64,
}

/// Result of simulating a complete sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub cost: f64,
    pub score: ScoreBreakdown,
    pub timings: Vec<StopTiming>,
    pub total_distance_m: i64,
    pub completion_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderStatus {
    Waiting,
    OnBoard,
    Delivered,
}

/// Incremental route simulation.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    problem: &'a RoutingProblem,
    node: usize,
    time: i64,
    load: usize,
    capacity: usize,
    status: Vec<OrderStatus>,
    remaining: usize,
    distance_m: i64,
    preparation_wait_secs: i64,
    traffic_delay_secs: i64,
    lateness_secs: i64,
    timings: Vec<StopTiming>,
}

impl<'a> Cursor<'a> {
    fn new(problem: &'a RoutingProblem) -> Self {
        let status: Vec<OrderStatus> = problem
            .orders
            .iter()
            .map(|order| {
                if order.on_board {
                    OrderStatus::OnBoard
                } else {
                    OrderStatus::Waiting
                }
            })
            .collect();
        let load = status.iter().filter(|s| **s == OrderStatus::OnBoard).count();
        let remaining = problem.required_stops().len();

        Self {
            problem,
            node: 0,
            time: problem.start_time,
            load,
            capacity: problem.effective_capacity(),
            status,
            remaining,
            distance_m: 0,
            preparation_wait_secs: 0,
            traffic_delay_secs: 0,
            lateness_secs: 0,
            timings: Vec::with_capacity(remaining),
        }
    }

    /// True if `stop` may come next under precedence and capacity.
    pub fn can_visit(&self, stop: Stop) -> bool {
        match (self.status.get(stop.order), stop.kind) {
            (Some(OrderStatus::Waiting), WaypointKind::Pickup) => self.load < self.capacity,
            (Some(OrderStatus::OnBoard), WaypointKind::Dropoff) => true,
            _ => false,
        }
    }

    /// Stops that may come next.
    pub fn candidates(&self) -> Vec<Stop> {
        let mut stops = Vec::new();
        for order in 0..self.status.len() {
            for stop in [Stop::pickup(order), Stop::dropoff(order)] {
                if self.can_visit(stop) {
                    stops.push(stop);
                }
            }
        }
        stops
    }

    /// Advance to `stop`. Returns false, leaving the cursor unchanged, if the
    /// stop is not allowed here.
    pub fn visit(&mut self, stop: Stop) -> bool {
        if !self.can_visit(stop) {
            return false;
        }

        let problem = self.problem;
        let target = stop.node();
        let base = i64::from(problem.matrix.duration(self.node, target));
        let factor = problem.traffic_factor(self.node, target);
        let travel = (base as f64 * factor).round() as i64;
        let leg_m = i64::from(problem.matrix.distance(self.node, target));

        self.traffic_delay_secs += (travel - base).max(0);
        self.distance_m += leg_m;
        let arrival = self.time + travel;
        let order = &problem.orders[stop.order];

        let (start_service, wait, lateness, service) = match stop.kind {
            WaypointKind::Pickup => {
                let ready = order.ready_at.max(arrival);
                let wait = ready - arrival;
                self.preparation_wait_secs += wait;
                self.status[stop.order] = OrderStatus::OnBoard;
                self.load += 1;
                (ready, wait, 0, problem.service.pickup_secs)
            }
            WaypointKind::Dropoff => {
                let (start, lateness) = match order.window {
                    Some((open, close)) => (arrival.max(open), (arrival - close).max(0)),
                    None => (arrival, 0),
                };
                self.lateness_secs += lateness;
                self.status[stop.order] = OrderStatus::Delivered;
                self.load -= 1;
                (start, start - arrival, lateness, problem.service.dropoff_secs)
            }
        };

        self.time = start_service + service;
        self.node = target;
        self.remaining -= 1;
        self.timings.push(StopTiming {
            arrival,
            departure: self.time,
            wait_secs: wait,
            lateness_secs: lateness,
            distance_m: leg_m,
        });
        true
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn score(&self) -> ScoreBreakdown {
        let weights = self.problem.weights;
        let distance_km = self.distance_m as f64 / 1000.0;
        let preparation_wait_min = self.preparation_wait_secs as f64 / 60.0;
        let traffic_delay_min = self.traffic_delay_secs as f64 / 60.0;
        let lateness_min = self.lateness_secs as f64 / 60.0;

        let total = distance_km * weights.distance_per_km
            + preparation_wait_min * weights.preparation_per_min
            + traffic_delay_min * weights.traffic_per_min
            + lateness_min * weights.lateness_per_min;

        ScoreBreakdown {
            distance_km,
            preparation_wait_min,
            traffic_delay_min,
            lateness_min,
            total,
        }
    }

    /// Cost accumulated so far. Never decreases as stops are added.
    pub fn cost(&self) -> f64 {
        self.score().total
    }

    /// Evaluation of the finished walk, or `None` if stops remain.
    pub fn finish(self) -> Option<Evaluation> {
        if !self.is_complete() {
            return None;
        }
        let score = self.score();
        Some(Evaluation {
            cost: score.total,
            score,
            total_distance_m: self.distance_m,
            completion_at: self.time,
            timings: self.timings,
        })
    }
}

/// Swap pickup/drop-off positions of any order whose drop-off comes first.
pub fn repair_precedence(stops: &mut [Stop]) {
    let mut pickup_at: Vec<Option<usize>> = Vec::new();
    let mut dropoff_at: Vec<Option<usize>> = Vec::new();
    for (position, stop) in stops.iter().enumerate() {
        if stop.order >= pickup_at.len() {
            pickup_at.resize(stop.order + 1, None);
            dropoff_at.resize(stop.order + 1, None);
        }
        match stop.kind {
            WaypointKind::Pickup => pickup_at[stop.order] = Some(position),
            WaypointKind::Dropoff => dropoff_at[stop.order] = Some(position),
        }
    }
    for (pickup, dropoff) in pickup_at.into_iter().zip(dropoff_at) {
        if let (Some(p), Some(d)) = (pickup, dropoff) {
            if d < p {
                stops.swap(p, d);
            }
        }
    }
}

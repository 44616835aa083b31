//! Serializable planner models shared with the client apps.
//!
//! Coordinates are `(lat, lng)` degrees, times are unix seconds, distances are
//! meters and durations seconds unless a field name says otherwise.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::polyline::Polyline;

/// Route sequencing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TspAlgorithm {
    NearestNeighbor,
    LocalSearch,
    SimulatedAnnealing,
    Genetic,
    Exhaustive,
    /// Pick a concrete algorithm from the problem size.
    Auto,
}

impl TspAlgorithm {
    /// Every concrete algorithm, in comparison order.
    pub const CONCRETE: [TspAlgorithm; 5] = [
        TspAlgorithm::NearestNeighbor,
        TspAlgorithm::LocalSearch,
        TspAlgorithm::SimulatedAnnealing,
        TspAlgorithm::Genetic,
        TspAlgorithm::Exhaustive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TspAlgorithm::NearestNeighbor => "nearest_neighbor",
            TspAlgorithm::LocalSearch => "local_search",
            TspAlgorithm::SimulatedAnnealing => "simulated_annealing",
            TspAlgorithm::Genetic => "genetic",
            TspAlgorithm::Exhaustive => "exhaustive",
            TspAlgorithm::Auto => "auto",
        }
    }
}

/// Weights and batching limits used to score and build routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationCriteria {
    /// Cost per kilometer driven.
    pub distance_weight: f64,
    /// Cost per minute spent waiting for a vendor to finish preparing.
    pub preparation_time_weight: f64,
    /// Cost per minute of traffic delay over free-flow travel.
    pub traffic_weight: f64,
    /// Cost per minute delivered after the promised window.
    pub delivery_window_weight: f64,
    pub max_orders_per_batch: usize,
    /// Maximum distance a batched order's pickup/drop-off may deviate.
    pub max_deviation_km: f64,
    /// Maximum spread of vendor ready times inside one batch.
    pub max_ready_gap_secs: i64,
    pub algorithm: TspAlgorithm,
}

impl Default for OptimizationCriteria {
    fn default() -> Self {
        Self {
            distance_weight: 1.0,
            preparation_time_weight: 0.5,
            traffic_weight: 1.0,
            delivery_window_weight: 3.0,
            max_orders_per_batch: 3,
            max_deviation_km: 2.0,
            max_ready_gap_secs: 600,
            algorithm: TspAlgorithm::Auto,
        }
    }
}

impl OptimizationCriteria {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("criteria.distance_weight", self.distance_weight),
            ("criteria.preparation_time_weight", self.preparation_time_weight),
            ("criteria.traffic_weight", self.traffic_weight),
            ("criteria.delivery_window_weight", self.delivery_window_weight),
        ];
        for (field, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("weight must be a finite non-negative number, got {}", weight),
                });
            }
        }
        if weights.iter().all(|(_, weight)| *weight == 0.0) {
            return Err(ConfigError::Invalid {
                field: "criteria",
                reason: "at least one weight must be positive".to_string(),
            });
        }
        if self.max_orders_per_batch == 0 {
            return Err(ConfigError::Invalid {
                field: "criteria.max_orders_per_batch",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.max_deviation_km > 0.0) {
            return Err(ConfigError::Invalid {
                field: "criteria.max_deviation_km",
                reason: format!("must be positive, got {}", self.max_deviation_km),
            });
        }
        if self.max_ready_gap_secs < 0 {
            return Err(ConfigError::Invalid {
                field: "criteria.max_ready_gap_secs",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    Pickup,
    Dropoff,
}

/// One stop of an optimized route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteWaypoint<OrderId> {
    pub order_id: OrderId,
    pub kind: WaypointKind,
    pub location: (f64, f64),
    pub sequence: usize,
    /// Set for pickups.
    pub vendor_id: Option<String>,
    /// Estimated arrival.
    pub eta: i64,
    /// Estimated departure after waiting and service.
    pub departure: i64,
    /// Time spent waiting for food or for the delivery window to open.
    pub wait_secs: i64,
    /// Arrival past the end of the delivery window (drop-offs only).
    pub lateness_secs: i64,
    pub distance_from_previous_m: i64,
}

/// Weighted cost components of a route.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_km: f64,
    pub preparation_wait_min: f64,
    pub traffic_delay_min: f64,
    pub lateness_min: f64,
    /// Weighted sum of the components.
    pub total: f64,
}

/// An ordered waypoint sequence with ETAs for one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRoute<DriverId, OrderId> {
    pub driver_id: DriverId,
    pub waypoints: Vec<RouteWaypoint<OrderId>>,
    pub total_distance_m: i64,
    pub total_duration_secs: i64,
    pub completion_at: i64,
    pub score: ScoreBreakdown,
    /// Concrete algorithm that produced the sequence.
    pub algorithm: TspAlgorithm,
    pub computed_at: i64,
    pub version: u32,
    pub geometry: Polyline,
}

impl<DriverId, OrderId: PartialEq> OptimizedRoute<DriverId, OrderId> {
    /// Order ids in the sequence they are visited, without duplicates.
    pub fn order_ids(&self) -> Vec<&OrderId> {
        let mut ids: Vec<&OrderId> = Vec::new();
        for waypoint in &self.waypoints {
            if !ids.contains(&&waypoint.order_id) {
                ids.push(&waypoint.order_id);
            }
        }
        ids
    }

    /// The stop the driver is heading to, if any.
    pub fn next_waypoint(&self) -> Option<&RouteWaypoint<OrderId>> {
        self.waypoints.first()
    }
}

/// What caused a route recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReoptimizationTrigger {
    TrafficIncident,
    PreparationDelay,
    OrderCancelled,
    OrderAdded,
    OffRoute,
    WaypointCompleted,
    /// Triggers held back by the cooldown and folded into a later recompute.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReoptimizationRecord {
    pub at: i64,
    pub trigger: ReoptimizationTrigger,
    /// Cost of the kept sequence under new conditions; `None` when the old
    /// sequence no longer covers the route's orders.
    pub previous_cost: Option<f64>,
    pub new_cost: f64,
    pub improvement_pct: f64,
    pub accepted: bool,
}

/// Re-optimization bookkeeping for a live route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteReoptimizationState {
    pub version: u32,
    pub reoptimization_count: u32,
    pub last_reoptimized_at: Option<i64>,
    /// Triggers deferred by the cooldown since the last recompute.
    pub pending_events: u32,
    /// Recent recomputes, bounded by `reoptimization.history_limit`.
    pub history: Vec<ReoptimizationRecord>,
    /// Times of accepted reroutes within the last [`REROUTE_WINDOW_SECS`],
    /// independent of the history bound.
    #[serde(default)]
    pub recent_reroutes: Vec<i64>,
}

/// Window over which reroute frequency is tracked.
pub const REROUTE_WINDOW_SECS: i64 = 3600;

impl RouteReoptimizationState {
    /// Note an accepted reroute at `at` and forget reroutes older than the window.
    pub fn record_reroute(&mut self, at: i64) {
        self.recent_reroutes.push(at);
        self.recent_reroutes.retain(|&time| time > at - REROUTE_WINDOW_SECS);
    }

    /// Accepted reroutes in the window ending at `now`.
    pub fn reroutes_within_window(&self, now: i64) -> usize {
        self.recent_reroutes
            .iter()
            .filter(|&&time| time > now - REROUTE_WINDOW_SECS && time <= now)
            .count()
    }
}

/// Running performance figures for one sequencing algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TspAlgorithmStats {
    pub algorithm: TspAlgorithm,
    pub runs: u64,
    /// Comparisons in which this algorithm found the cheapest route.
    pub wins: u64,
    pub best_cost: Option<f64>,
    pub mean_cost: f64,
    pub mean_runtime_ms: f64,
    pub max_runtime_ms: f64,
    /// Gap to the best algorithm in the latest comparison, in percent.
    pub last_gap_pct: Option<f64>,
    pub infeasible_runs: u64,
}

impl TspAlgorithmStats {
    pub fn new(algorithm: TspAlgorithm) -> Self {
        Self {
            algorithm,
            runs: 0,
            wins: 0,
            best_cost: None,
            mean_cost: 0.0,
            mean_runtime_ms: 0.0,
            max_runtime_ms: 0.0,
            last_gap_pct: None,
            infeasible_runs: 0,
        }
    }
}

/// Orders grouped to be carried by one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryBatch<OrderId> {
    pub id: usize,
    pub order_ids: Vec<OrderId>,
    pub pickup_centroid: (f64, f64),
    /// Latest vendor ready time in the batch.
    pub ready_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    InvalidLocation,
    NoDriverAvailable,
    InfeasibleRoute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedOrder<OrderId> {
    pub order_id: OrderId,
    pub reason: UnassignedReason,
}

/// Sent to the driver app when an accepted re-optimization changes the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChangeNotice<OrderId> {
    pub version: u32,
    pub trigger: ReoptimizationTrigger,
    pub improvement_pct: f64,
    pub next_waypoint: Option<RouteWaypoint<OrderId>>,
    pub completion_at: i64,
    pub removed_orders: Vec<OrderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SlowSolve,
    QualityGap,
    Infeasible,
    ExcessiveReoptimization,
}

/// Monitoring alert about algorithm or route behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub algorithm: Option<TspAlgorithm>,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

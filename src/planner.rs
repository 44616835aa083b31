//! Dispatch planning: batch pending orders and hand each batch to a driver.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::batching::form_batches;
use crate::config::OptimizerConfig;
use crate::cost::{RoutingProblem, StopOrder};
use crate::error::{OptimizerError, Result};
use crate::haversine::{HaversineMatrix, haversine_km};
use crate::models::{
    DeliveryBatch, OptimizedRoute, RouteWaypoint, UnassignedOrder, UnassignedReason, WaypointKind,
};
use crate::polyline::Polyline;
use crate::traits::{DistanceMatrixProvider, Driver, Order, TrafficProvider};
use crate::tsp::{self, SequenceResult};

#[derive(Debug, Clone)]
pub struct PlanResult<DriverId, OrderId> {
    pub routes: Vec<OptimizedRoute<DriverId, OrderId>>,
    pub batches: Vec<DeliveryBatch<OrderId>>,
    pub unassigned: Vec<UnassignedOrder<OrderId>>,
}

/// Batch `orders` and assign each batch to one of the free `drivers`.
///
/// Every driver takes at most one batch. Batches are served earliest-ready
/// first; for each, the nearest `planner.candidate_drivers` free drivers are
/// sequenced and the cheapest route wins. Drivers with room for the whole
/// batch are preferred. When none is free, a smaller driver still takes the
/// batch and delivers in several rounds, since capacity bounds the load on
/// board rather than the batch size.
pub fn plan<O, D, M, T>(
    orders: &[O],
    drivers: &[D],
    matrix_provider: &M,
    traffic: &T,
    config: &OptimizerConfig,
    now: i64,
) -> Result<PlanResult<D::Id, O::Id>>
where
    O: Order + Sync,
    D: Driver + Sync,
    M: DistanceMatrixProvider + Sync,
    T: TrafficProvider + Sync,
{
    config.validate()?;

    let outcome = form_batches(orders, &config.criteria);
    let mut unassigned = outcome.rejected;
    let mut batches = outcome.batches;
    batches.sort_by_key(|batch| batch.ready_at);

    let by_id: HashMap<&O::Id, &O> = orders.iter().map(|order| (order.id(), order)).collect();
    let mut driver_free = vec![true; drivers.len()];
    let mut routes = Vec::new();

    for batch in &batches {
        let batch_orders: Vec<&O> = batch
            .order_ids
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();

        let mut candidates: Vec<(usize, f64)> = drivers
            .iter()
            .enumerate()
            .filter(|(index, driver)| driver_free[*index] && driver.capacity() > 0)
            .map(|(index, driver)| (index, haversine_km(driver.location(), batch.pickup_centroid)))
            .collect();
        if candidates.iter().any(|(index, _)| drivers[*index].capacity() >= batch_orders.len()) {
            candidates.retain(|(index, _)| drivers[*index].capacity() >= batch_orders.len());
        }
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates.truncate(config.planner.candidate_drivers);

        if candidates.is_empty() {
            warn!(batch = batch.id, "no free driver for batch");
            unassign(&mut unassigned, batch, UnassignedReason::NoDriverAvailable);
            continue;
        }

        let attempts: Vec<(usize, Result<(RoutingProblem, SequenceResult)>)> = candidates
            .par_iter()
            .map(|&(index, _)| {
                let driver = &drivers[index];
                let attempt = prepare_problem(
                    driver.location(),
                    now,
                    stop_orders(&batch_orders, &[]),
                    driver.capacity(),
                    matrix_provider,
                    traffic,
                    config,
                )
                .and_then(|problem| {
                    let result = tsp::solve(&problem, config.criteria.algorithm, &config.solver)?;
                    Ok((problem, result))
                });
                (index, attempt)
            })
            .collect();

        let mut best: Option<(usize, RoutingProblem, SequenceResult)> = None;
        for (index, attempt) in attempts {
            match attempt {
                Ok((problem, result)) => {
                    let cheaper = best
                        .as_ref()
                        .is_none_or(|(_, _, current)| result.evaluation.cost < current.evaluation.cost);
                    if cheaper {
                        best = Some((index, problem, result));
                    }
                }
                Err(err) => warn!(batch = batch.id, driver = index, error = %err, "driver cannot serve batch"),
            }
        }

        let Some((index, problem, result)) = best else {
            unassign(&mut unassigned, batch, UnassignedReason::InfeasibleRoute);
            continue;
        };

        driver_free[index] = false;
        let route = route_from_sequence(drivers[index].id().clone(), &batch_orders, &problem, &result, now, 1);
        info!(
            batch = batch.id,
            driver = index,
            orders = batch_orders.len(),
            cost = route.score.total,
            algorithm = route.algorithm.name(),
            "batch assigned"
        );
        routes.push(route);
    }

    Ok(PlanResult {
        routes,
        batches,
        unassigned,
    })
}

fn unassign<OrderId: Clone>(
    unassigned: &mut Vec<UnassignedOrder<OrderId>>,
    batch: &DeliveryBatch<OrderId>,
    reason: UnassignedReason,
) {
    unassigned.extend(batch.order_ids.iter().map(|id| UnassignedOrder {
        order_id: id.clone(),
        reason,
    }));
}

/// Convert orders to sequencer input; orders at positions in `on_board`
/// only need their drop-off.
pub fn stop_orders<O: Order>(orders: &[&O], on_board: &[bool]) -> Vec<StopOrder> {
    orders
        .iter()
        .enumerate()
        .map(|(index, order)| StopOrder {
            pickup: order.pickup_location(),
            dropoff: order.dropoff_location(),
            ready_at: order.ready_at(),
            window: order.delivery_window(),
            on_board: on_board.get(index).copied().unwrap_or(false),
        })
        .collect()
}

/// Build a routing problem, falling back to haversine estimates if the
/// matrix provider fails.
pub fn prepare_problem<M, T>(
    start: (f64, f64),
    start_time: i64,
    orders: Vec<StopOrder>,
    capacity: usize,
    matrix_provider: &M,
    traffic: &T,
    config: &OptimizerConfig,
) -> Result<RoutingProblem>
where
    M: DistanceMatrixProvider + ?Sized,
    T: TrafficProvider + ?Sized,
{
    let problem = match RoutingProblem::build(
        start,
        start_time,
        orders.clone(),
        matrix_provider,
        config.service,
        capacity,
        &config.criteria,
    ) {
        Ok(problem) => problem,
        Err(err) => {
            warn!(error = %err, "matrix provider failed, using haversine estimates");
            let fallback = HaversineMatrix::new(config.planner.fallback_speed_kmh);
            RoutingProblem::build(
                start,
                start_time,
                orders,
                &fallback,
                config.service,
                capacity,
                &config.criteria,
            )
            .map_err(OptimizerError::from)?
        }
    };

    Ok(problem.with_traffic(traffic))
}

/// Turn a solved sequence into the client-facing route.
///
/// `orders[i]` must be the order behind `problem.orders[i]`.
pub fn route_from_sequence<O, DriverId>(
    driver_id: DriverId,
    orders: &[&O],
    problem: &RoutingProblem,
    result: &SequenceResult,
    computed_at: i64,
    version: u32,
) -> OptimizedRoute<DriverId, O::Id>
where
    O: Order,
{
    let evaluation = &result.evaluation;
    let mut points = Vec::with_capacity(result.stops.len() + 1);
    points.push(problem.start);

    let waypoints: Vec<RouteWaypoint<O::Id>> = result
        .stops
        .iter()
        .zip(&evaluation.timings)
        .enumerate()
        .map(|(sequence, (stop, timing))| {
            let order = orders[stop.order];
            let location = problem.location_of(*stop);
            points.push(location);
            RouteWaypoint {
                order_id: order.id().clone(),
                kind: stop.kind,
                location,
                sequence,
                vendor_id: match stop.kind {
                    WaypointKind::Pickup => Some(order.vendor_id().to_string()),
                    WaypointKind::Dropoff => None,
                },
                eta: timing.arrival,
                departure: timing.departure,
                wait_secs: timing.wait_secs,
                lateness_secs: timing.lateness_secs,
                distance_from_previous_m: timing.distance_m,
            }
        })
        .collect();

    OptimizedRoute {
        driver_id,
        waypoints,
        total_distance_m: evaluation.total_distance_m,
        total_duration_secs: evaluation.completion_at - problem.start_time,
        completion_at: evaluation.completion_at,
        score: evaluation.score,
        algorithm: result.algorithm,
        computed_at,
        version,
        geometry: Polyline::new(points),
    }
}

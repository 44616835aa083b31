//! Live route re-optimization.
//!
//! A [`RouteSession`] owns one driver's route while it is being driven. Live
//! events update the session's view of the world; each event is classified by
//! impact and may trigger a recompute. A recomputed sequence only replaces the
//! current one when it is clearly better, so drivers are not bounced between
//! near-identical routes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::cost::{Evaluation, RoutingProblem, Stop};
use crate::error::{OptimizerError, Result};
use crate::haversine::{path_distance_km, point_segment_km};
use crate::models::{
    OptimizedRoute, ReoptimizationRecord, ReoptimizationTrigger, RouteChangeNotice, RouteReoptimizationState,
    WaypointKind,
};
use crate::monitor::PerformanceMonitor;
use crate::planner::{prepare_problem, route_from_sequence, stop_orders};
use crate::traits::{DistanceMatrixProvider, Driver, DriverNotifier, Order, TrafficProvider};
use crate::tsp::{self, SequenceResult};

/// A slowdown reported around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficIncident {
    pub location: (f64, f64),
    pub radius_km: f64,
    /// Travel time multiplier inside the radius.
    pub delay_factor: f64,
    pub expires_at: i64,
}

impl TrafficIncident {
    fn touches(&self, from: (f64, f64), to: (f64, f64)) -> bool {
        point_segment_km(self.location, from, to) <= self.radius_km
    }
}

/// Traffic model built from active incidents.
#[derive(Debug, Clone, Default)]
pub struct IncidentTraffic {
    pub incidents: Vec<TrafficIncident>,
}

impl TrafficProvider for IncidentTraffic {
    fn factor(&self, from: (f64, f64), to: (f64, f64)) -> f64 {
        self.incidents
            .iter()
            .filter(|incident| incident.touches(from, to))
            .map(|incident| incident.delay_factor)
            .fold(1.0, f64::max)
    }
}

/// Something that happened while the route is being driven.
#[derive(Debug, Clone)]
pub enum RouteEvent<O: Order> {
    TrafficIncident(TrafficIncident),
    /// The vendor now expects the order to be ready at `new_ready_at`.
    PreparationDelay { order_id: O::Id, new_ready_at: i64 },
    OrderCancelled { order_id: O::Id },
    LocationUpdate { location: (f64, f64) },
    WaypointCompleted { order_id: O::Id, kind: WaypointKind },
    OrderAdded { order: O },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventImpact {
    /// Nothing to do.
    None,
    /// ETAs change, the sequence probably does not.
    Minor,
    /// The sequence may no longer be the best one.
    Major,
    /// The set of stops changed.
    Critical,
}

/// What the session did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReoptimizationAction {
    Ignored,
    EtasRefreshed,
    /// Recompute held back by the cooldown.
    Deferred,
    /// A new sequence was computed and adopted.
    Rerouted { improvement_pct: f64 },
    /// A new sequence was computed but did not clear the improvement bar.
    Kept { improvement_pct: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub impact: EventImpact,
    pub action: ReoptimizationAction,
    /// Route version after handling the event.
    pub version: u32,
}

#[derive(Debug, Clone)]
struct SessionOrder<O> {
    order: O,
    on_board: bool,
    /// Latest known ready time, moved by preparation delays.
    ready_at: i64,
}

impl<O: Order> SessionOrder<O> {
    fn waiting(order: O) -> Self {
        let ready_at = order.ready_at();
        Self {
            order,
            on_board: false,
            ready_at,
        }
    }
}

/// An event's effect on the session, before any recompute.
struct Applied<O: Order> {
    impact: EventImpact,
    trigger: ReoptimizationTrigger,
    removed: Vec<O::Id>,
    undo: Undo<O>,
}

/// Enough of the pre-event state to take the event back.
struct Undo<O: Order> {
    location: (f64, f64),
    sequence: Vec<(O::Id, WaypointKind)>,
    change: Change<O>,
}

enum Change<O> {
    Unchanged,
    IncidentAdded,
    ReadyAt { index: usize, ready_at: i64 },
    Removed { index: usize, entry: SessionOrder<O> },
    Added,
    PickedUp { index: usize },
}

/// A driver's live route.
pub struct RouteSession<O, DriverId>
where
    O: Order,
{
    driver_id: DriverId,
    capacity: usize,
    location: (f64, f64),
    orders: Vec<SessionOrder<O>>,
    incidents: Vec<TrafficIncident>,
    /// Remaining stops in planned order.
    sequence: Vec<(O::Id, WaypointKind)>,
    route: OptimizedRoute<DriverId, O::Id>,
    state: RouteReoptimizationState,
    config: OptimizerConfig,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl<O, DriverId> RouteSession<O, DriverId>
where
    O: Order,
    DriverId: Clone,
{
    /// Plan an initial route for `driver` carrying `orders`, none picked up yet.
    pub fn start<D, M>(driver: &D, orders: Vec<O>, matrix: &M, config: OptimizerConfig, now: i64) -> Result<Self>
    where
        D: Driver<Id = DriverId>,
        M: DistanceMatrixProvider + ?Sized,
    {
        config.validate()?;
        let mut session = Self {
            driver_id: driver.id().clone(),
            capacity: driver.capacity(),
            location: driver.location(),
            orders: orders.into_iter().map(SessionOrder::waiting).collect(),
            incidents: Vec::new(),
            sequence: Vec::new(),
            route: OptimizedRoute {
                driver_id: driver.id().clone(),
                waypoints: Vec::new(),
                total_distance_m: 0,
                total_duration_secs: 0,
                completion_at: now,
                score: Default::default(),
                algorithm: config.criteria.algorithm,
                computed_at: now,
                version: 0,
                geometry: Default::default(),
            },
            state: RouteReoptimizationState::default(),
            config,
            monitor: None,
        };

        let problem = session.problem(matrix, now)?;
        let result = session.solve(&problem)?;
        session.state.version = 1;
        session.adopt(&problem, &result, now);
        Ok(session)
    }

    /// Report solver runs and reroute frequency to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// The route the driver is currently following.
    pub fn route(&self) -> &OptimizedRoute<DriverId, O::Id> {
        &self.route
    }

    /// Version, recompute history and pending deferred events.
    pub fn state(&self) -> &RouteReoptimizationState {
        &self.state
    }

    /// Last known driver position.
    pub fn location(&self) -> (f64, f64) {
        self.location
    }

    /// Incidents that had not expired at the last event.
    pub fn active_incidents(&self) -> &[TrafficIncident] {
        &self.incidents
    }

    /// True once every order has been delivered or cancelled.
    pub fn is_finished(&self) -> bool {
        self.orders.is_empty()
    }

    /// Apply `event`, recomputing the route if its impact calls for it.
    ///
    /// If the route cannot be brought up to date the event is rolled back and
    /// the error returned, leaving the session as it was before the call.
    pub fn handle_event<M, N>(
        &mut self,
        event: RouteEvent<O>,
        now: i64,
        matrix: &M,
        notifier: &N,
    ) -> Result<EventOutcome>
    where
        M: DistanceMatrixProvider + ?Sized,
        N: DriverNotifier<DriverId, O::Id> + ?Sized,
    {
        self.incidents.retain(|incident| incident.expires_at > now);

        let Applied {
            impact,
            trigger,
            removed,
            undo,
        } = self.apply(event)?;
        debug!(?impact, ?trigger, "classified route event");

        let action = match self.respond(impact, trigger, removed, matrix, notifier, now) {
            Ok(action) => action,
            Err(err) => {
                warn!(?trigger, error = %err, "route update failed, rolling back event");
                self.revert(undo);
                return Err(err);
            }
        };

        Ok(EventOutcome {
            impact,
            action,
            version: self.state.version,
        })
    }

    fn respond<M, N>(
        &mut self,
        impact: EventImpact,
        trigger: ReoptimizationTrigger,
        removed: Vec<O::Id>,
        matrix: &M,
        notifier: &N,
        now: i64,
    ) -> Result<ReoptimizationAction>
    where
        M: DistanceMatrixProvider + ?Sized,
        N: DriverNotifier<DriverId, O::Id> + ?Sized,
    {
        let in_cooldown = self
            .state
            .last_reoptimized_at
            .is_some_and(|last| now - last < self.config.reoptimization.cooldown_secs);

        let action = match impact {
            EventImpact::Critical => self.recompute(trigger, removed, matrix, notifier, now)?,
            EventImpact::Major if in_cooldown => {
                self.refresh(matrix, now)?;
                self.state.pending_events += 1;
                ReoptimizationAction::Deferred
            }
            EventImpact::Major => self.recompute(trigger, removed, matrix, notifier, now)?,
            EventImpact::Minor | EventImpact::None if self.state.pending_events > 0 && !in_cooldown => {
                self.recompute(ReoptimizationTrigger::Deferred, removed, matrix, notifier, now)?
            }
            EventImpact::Minor => {
                if self.refresh(matrix, now)? {
                    ReoptimizationAction::EtasRefreshed
                } else {
                    // The kept sequence broke under the new conditions.
                    self.recompute(trigger, removed, matrix, notifier, now)?
                }
            }
            EventImpact::None => ReoptimizationAction::Ignored,
        };
        Ok(action)
    }

    /// Update session state for `event` and classify it.
    fn apply(&mut self, event: RouteEvent<O>) -> Result<Applied<O>> {
        let reopt = self.config.reoptimization.clone();
        let location = self.location;
        let sequence = self.sequence.clone();
        let applied = |impact: EventImpact, trigger: ReoptimizationTrigger, removed: Vec<O::Id>, change: Change<O>| Applied {
            impact,
            trigger,
            removed,
            undo: Undo {
                location,
                sequence,
                change,
            },
        };

        match event {
            RouteEvent::TrafficIncident(incident) => {
                let on_route = path_distance_km(incident.location, &self.planned_path()) <= incident.radius_km;
                let impact = if !on_route || self.sequence.is_empty() {
                    EventImpact::None
                } else if incident.delay_factor >= reopt.major_traffic_factor {
                    EventImpact::Major
                } else {
                    EventImpact::Minor
                };
                self.incidents.push(incident);
                Ok(applied(
                    impact,
                    ReoptimizationTrigger::TrafficIncident,
                    Vec::new(),
                    Change::IncidentAdded,
                ))
            }
            RouteEvent::PreparationDelay { order_id, new_ready_at } => {
                let index = self.index_of(&order_id)?;
                let entry = &mut self.orders[index];
                if entry.on_board {
                    return Ok(applied(
                        EventImpact::None,
                        ReoptimizationTrigger::PreparationDelay,
                        Vec::new(),
                        Change::Unchanged,
                    ));
                }
                let ready_at = entry.ready_at;
                let shift = (new_ready_at - ready_at).abs();
                entry.ready_at = new_ready_at;
                let impact = if shift >= reopt.major_delay_secs {
                    EventImpact::Major
                } else if shift > 0 {
                    EventImpact::Minor
                } else {
                    EventImpact::None
                };
                Ok(applied(
                    impact,
                    ReoptimizationTrigger::PreparationDelay,
                    Vec::new(),
                    Change::ReadyAt { index, ready_at },
                ))
            }
            RouteEvent::OrderCancelled { order_id } => {
                let index = self.index_of(&order_id)?;
                let entry = self.orders.remove(index);
                self.sequence.retain(|(id, _)| *id != order_id);
                Ok(applied(
                    EventImpact::Critical,
                    ReoptimizationTrigger::OrderCancelled,
                    vec![order_id],
                    Change::Removed { index, entry },
                ))
            }
            RouteEvent::OrderAdded { order } => {
                if self.index_of(order.id()).is_ok() {
                    warn!(order = ?order.id(), "order already on this route");
                    return Ok(applied(
                        EventImpact::None,
                        ReoptimizationTrigger::OrderAdded,
                        Vec::new(),
                        Change::Unchanged,
                    ));
                }
                self.orders.push(SessionOrder::waiting(order));
                Ok(applied(
                    EventImpact::Critical,
                    ReoptimizationTrigger::OrderAdded,
                    Vec::new(),
                    Change::Added,
                ))
            }
            RouteEvent::LocationUpdate { location } => {
                let deviation = path_distance_km(location, &self.planned_path());
                self.location = location;
                let impact = if self.sequence.is_empty() || deviation <= reopt.off_route_km {
                    EventImpact::None
                } else {
                    EventImpact::Major
                };
                Ok(applied(impact, ReoptimizationTrigger::OffRoute, Vec::new(), Change::Unchanged))
            }
            RouteEvent::WaypointCompleted { order_id, kind } => {
                let index = self.index_of(&order_id)?;
                let order = &self.orders[index].order;
                self.location = match kind {
                    WaypointKind::Pickup => order.pickup_location(),
                    WaypointKind::Dropoff => order.dropoff_location(),
                };
                let change = match kind {
                    WaypointKind::Pickup => {
                        self.orders[index].on_board = true;
                        Change::PickedUp { index }
                    }
                    WaypointKind::Dropoff => Change::Removed {
                        index,
                        entry: self.orders.remove(index),
                    },
                };
                self.sequence
                    .retain(|(id, stop_kind)| !(*id == order_id && *stop_kind == kind));
                Ok(applied(
                    EventImpact::Minor,
                    ReoptimizationTrigger::WaypointCompleted,
                    Vec::new(),
                    change,
                ))
            }
        }
    }

    /// Take back an applied event.
    fn revert(&mut self, undo: Undo<O>) {
        self.location = undo.location;
        self.sequence = undo.sequence;
        match undo.change {
            Change::Unchanged => {}
            Change::IncidentAdded => {
                self.incidents.pop();
            }
            Change::ReadyAt { index, ready_at } => self.orders[index].ready_at = ready_at,
            Change::Removed { index, entry } => self.orders.insert(index, entry),
            Change::Added => {
                self.orders.pop();
            }
            Change::PickedUp { index } => self.orders[index].on_board = false,
        }
    }

    /// Re-evaluate the kept sequence from the current position and time.
    /// Returns false if the kept sequence is no longer valid.
    fn refresh<M>(&mut self, matrix: &M, now: i64) -> Result<bool>
    where
        M: DistanceMatrixProvider + ?Sized,
    {
        let problem = self.problem(matrix, now)?;
        let Some((stops, evaluation)) = self.evaluate_current(&problem) else {
            return Ok(false);
        };
        let result = self.kept(stops, evaluation);
        self.adopt(&problem, &result, now);
        Ok(true)
    }

    /// Wrap the current sequence so it can be adopted like a solver result.
    fn kept(&self, stops: Vec<Stop>, evaluation: Evaluation) -> SequenceResult {
        SequenceResult {
            stops,
            evaluation,
            algorithm: self.route.algorithm,
            iterations: 0,
            runtime_ms: 0.0,
        }
    }

    fn recompute<M, N>(
        &mut self,
        trigger: ReoptimizationTrigger,
        removed: Vec<O::Id>,
        matrix: &M,
        notifier: &N,
        now: i64,
    ) -> Result<ReoptimizationAction>
    where
        M: DistanceMatrixProvider + ?Sized,
        N: DriverNotifier<DriverId, O::Id> + ?Sized,
    {
        let problem = self.problem(matrix, now)?;
        let current = self.evaluate_current(&problem);
        let previous_cost = current.as_ref().map(|(_, evaluation)| evaluation.cost);

        let candidate = match self.solve(&problem) {
            Ok(result) => result,
            Err(err) => {
                // Keep driving the current sequence if there is one.
                let Some((stops, evaluation)) = current.clone() else {
                    return Err(err);
                };
                self.kept(stops, evaluation)
            }
        };
        let new_cost = candidate.evaluation.cost;

        let (accepted, improvement_pct) = match previous_cost {
            None => (true, 0.0),
            Some(previous) => {
                let saved = previous - new_cost;
                let pct = if previous > 0.0 { saved / previous * 100.0 } else { 0.0 };
                let reopt = &self.config.reoptimization;
                (
                    pct >= reopt.min_improvement_pct && saved >= reopt.min_improvement_cost,
                    pct,
                )
            }
        };

        self.state.last_reoptimized_at = Some(now);
        self.state.pending_events = 0;
        self.state.history.push(ReoptimizationRecord {
            at: now,
            trigger,
            previous_cost,
            new_cost,
            improvement_pct,
            accepted,
        });
        let limit = self.config.reoptimization.history_limit;
        if self.state.history.len() > limit {
            let excess = self.state.history.len() - limit;
            self.state.history.drain(..excess);
        }

        let route_changed = accepted || !removed.is_empty();
        if route_changed {
            self.state.version += 1;
        }
        if accepted {
            self.state.reoptimization_count += 1;
            self.state.record_reroute(now);
            self.adopt(&problem, &candidate, now);
        } else if let Some((stops, evaluation)) = current {
            let kept = self.kept(stops, evaluation);
            self.adopt(&problem, &kept, now);
        }

        info!(
            ?trigger,
            accepted,
            improvement_pct,
            new_cost,
            version = self.state.version,
            "route recomputed"
        );

        if route_changed {
            let notice = RouteChangeNotice {
                version: self.state.version,
                trigger,
                improvement_pct,
                next_waypoint: self.route.next_waypoint().cloned(),
                completion_at: self.route.completion_at,
                removed_orders: removed,
            };
            notifier.notify(&self.driver_id, &notice);
        }
        if let Some(monitor) = &self.monitor {
            monitor.record_reoptimization(&self.state, now);
        }

        Ok(if accepted {
            ReoptimizationAction::Rerouted { improvement_pct }
        } else {
            ReoptimizationAction::Kept { improvement_pct }
        })
    }

    fn solve(&self, problem: &RoutingProblem) -> Result<SequenceResult> {
        let algorithm = self.config.criteria.algorithm;
        let result = tsp::solve(problem, algorithm, &self.config.solver);
        if let Some(monitor) = &self.monitor {
            match &result {
                Ok(result) => monitor.record_run(result),
                Err(err) => {
                    let concrete =
                        tsp::resolve_algorithm(algorithm, problem.required_stops().len(), &self.config.solver);
                    monitor.record_failure(concrete, err);
                }
            }
        }
        result
    }

    fn problem<M>(&self, matrix: &M, now: i64) -> Result<RoutingProblem>
    where
        M: DistanceMatrixProvider + ?Sized,
    {
        let orders: Vec<&O> = self.orders.iter().map(|entry| &entry.order).collect();
        let on_board: Vec<bool> = self.orders.iter().map(|entry| entry.on_board).collect();
        let mut stops = stop_orders(&orders, &on_board);
        for (stop, entry) in stops.iter_mut().zip(&self.orders) {
            stop.ready_at = entry.ready_at;
        }
        let traffic = IncidentTraffic {
            incidents: self.incidents.clone(),
        };
        prepare_problem(
            self.location,
            now,
            stops,
            self.capacity,
            matrix,
            &traffic,
            &self.config,
        )
    }

    /// The kept sequence as problem stops, if it still covers every order.
    fn evaluate_current(&self, problem: &RoutingProblem) -> Option<(Vec<Stop>, Evaluation)> {
        let stops = self
            .sequence
            .iter()
            .map(|(id, kind)| self.index_of(id).ok().map(|order| Stop { order, kind: *kind }))
            .collect::<Option<Vec<Stop>>>()?;
        let evaluation = problem.evaluate(&stops)?;
        Some((stops, evaluation))
    }

    fn adopt(&mut self, problem: &RoutingProblem, result: &SequenceResult, now: i64) {
        let orders: Vec<&O> = self.orders.iter().map(|entry| &entry.order).collect();
        self.sequence = result
            .stops
            .iter()
            .map(|stop| (orders[stop.order].id().clone(), stop.kind))
            .collect();
        self.route = route_from_sequence(
            self.driver_id.clone(),
            &orders,
            problem,
            result,
            now,
            self.state.version,
        );
    }

    /// Where the driver is expected to drive: current position, then the
    /// remaining waypoints.
    fn planned_path(&self) -> Vec<(f64, f64)> {
        let mut path = Vec::with_capacity(self.route.waypoints.len() + 1);
        path.push(self.location);
        path.extend(self.route.waypoints.iter().map(|waypoint| waypoint.location));
        path
    }

    fn index_of(&self, order_id: &O::Id) -> Result<usize> {
        self.orders
            .iter()
            .position(|entry| entry.order.id() == order_id)
            .ok_or_else(|| OptimizerError::UnknownOrder(format!("{:?}", order_id)))
    }

}

//! Core domain traits for the delivery planner.
//!
//! These are intentionally minimal. The host application implements them for
//! its own order/driver records and backend clients.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::MatrixError;
use crate::models::{Alert, RouteChangeNotice};

/// Unique identifier for planner entities.
pub trait Id: Clone + Eq + Hash + Debug {}

impl<T> Id for T where T: Clone + Eq + Hash + Debug {}

/// A customer order to be picked up at a vendor and dropped off.
pub trait Order {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Vendor (restaurant) preparing the order.
    fn vendor_id(&self) -> &str;

    /// Vendor location (lat, lng).
    fn pickup_location(&self) -> (f64, f64);

    /// Customer location (lat, lng).
    fn dropoff_location(&self) -> (f64, f64);

    /// When the vendor expects the food to be ready (unix seconds).
    fn ready_at(&self) -> i64;

    /// Promised delivery window (unix seconds), if any.
    fn delivery_window(&self) -> Option<(i64, i64)>;

    /// When the customer placed the order (unix seconds).
    fn placed_at(&self) -> i64;
}

/// A driver able to carry orders.
pub trait Driver {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Current location (lat, lng).
    fn location(&self) -> (f64, f64);

    /// Maximum number of orders on board at once.
    fn capacity(&self) -> usize;
}

/// Square travel matrix indexed by the order of the requested locations.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrix {
    /// Travel durations in seconds.
    pub durations: Vec<Vec<i32>>,
    /// Travel distances in meters.
    pub distances: Vec<Vec<i32>>,
}

impl TravelMatrix {
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn duration(&self, from: usize, to: usize) -> i32 {
        self.durations[from][to]
    }

    pub fn distance(&self, from: usize, to: usize) -> i32 {
        self.distances[from][to]
    }

    /// Check both tables are `expected` x `expected`.
    pub fn check_shape(&self, expected: usize) -> Result<(), MatrixError> {
        let square = |table: &[Vec<i32>]| {
            table.len() == expected && table.iter().all(|row| row.len() == expected)
        };
        if square(&self.durations) && square(&self.distances) {
            Ok(())
        } else {
            Err(MatrixError::Shape {
                expected,
                rows: self.durations.len().min(self.distances.len()),
            })
        }
    }
}

/// Provides a travel matrix for a set of locations.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Result<TravelMatrix, MatrixError>;
}

/// Multiplier applied to free-flow travel time between two points.
///
/// Implementations return values >= 1.0.
pub trait TrafficProvider {
    fn factor(&self, from: (f64, f64), to: (f64, f64)) -> f64;
}

/// Free-flow traffic everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTraffic;

impl TrafficProvider for NoTraffic {
    fn factor(&self, _from: (f64, f64), _to: (f64, f64)) -> f64 {
        1.0
    }
}

/// Delivers route changes to the driver app.
pub trait DriverNotifier<DriverId, OrderId> {
    fn notify(&self, driver_id: &DriverId, notice: &RouteChangeNotice<OrderId>);
}

/// Receives monitoring alerts.
pub trait AlertSink {
    fn raise(&self, alert: &Alert);
}

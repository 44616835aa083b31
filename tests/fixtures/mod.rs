//! Shared fixtures for dispatch-planner integration tests.
//!
//! - Real Las Vegas / Henderson places
//! - Builders for orders and drivers
//! - Deterministic matrix providers and a collecting notifier

#![allow(dead_code)]

pub mod las_vegas_locations;

use std::sync::Mutex;

pub use las_vegas_locations::*;

use dispatch_planner::error::MatrixError;
use dispatch_planner::models::RouteChangeNotice;
use dispatch_planner::traits::{DistanceMatrixProvider, Driver, DriverNotifier, Order, TravelMatrix};

/// Builder for test orders with sensible defaults.
#[derive(Debug, Clone)]
pub struct TestOrder {
    pub id: String,
    pub vendor: String,
    pub pickup: (f64, f64),
    pub dropoff: (f64, f64),
    pub ready_at: i64,
    pub placed_at: i64,
    pub window: Option<(i64, i64)>,
}

impl TestOrder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            vendor: "vendor".to_string(),
            pickup: (0.0, 0.0),
            dropoff: (0.0, 0.0),
            ready_at: 0,
            placed_at: 0,
            window: None,
        }
    }

    pub fn from_place(mut self, place: &Place) -> Self {
        self.vendor = place.name.to_string();
        self.pickup = place.coords();
        self
    }

    pub fn to_place(mut self, place: &Place) -> Self {
        self.dropoff = place.coords();
        self
    }

    pub fn pickup(mut self, lat: f64, lng: f64) -> Self {
        self.pickup = (lat, lng);
        self
    }

    pub fn dropoff(mut self, lat: f64, lng: f64) -> Self {
        self.dropoff = (lat, lng);
        self
    }

    pub fn ready_at(mut self, secs: i64) -> Self {
        self.ready_at = secs;
        self
    }

    pub fn placed_at(mut self, secs: i64) -> Self {
        self.placed_at = secs;
        self
    }

    pub fn window(mut self, start: i64, end: i64) -> Self {
        self.window = Some((start, end));
        self
    }
}

impl Order for TestOrder {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn vendor_id(&self) -> &str {
        &self.vendor
    }

    fn pickup_location(&self) -> (f64, f64) {
        self.pickup
    }

    fn dropoff_location(&self) -> (f64, f64) {
        self.dropoff
    }

    fn ready_at(&self) -> i64 {
        self.ready_at
    }

    fn delivery_window(&self) -> Option<(i64, i64)> {
        self.window
    }

    fn placed_at(&self) -> i64 {
        self.placed_at
    }
}

#[derive(Debug, Clone)]
pub struct TestDriver {
    pub id: String,
    pub location: (f64, f64),
    pub capacity: usize,
}

impl TestDriver {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            location: (0.0, 0.0),
            capacity: 3,
        }
    }

    pub fn at(mut self, place: &Place) -> Self {
        self.location = place.coords();
        self
    }

    pub fn location(mut self, lat: f64, lng: f64) -> Self {
        self.location = (lat, lng);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl Driver for TestDriver {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }

    fn location(&self) -> (f64, f64) {
        self.location
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Manhattan distance in degrees: 1 degree is 60 s and 1 km.
pub struct LineMatrix;

impl DistanceMatrixProvider for LineMatrix {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Result<TravelMatrix, MatrixError> {
        let degrees = |a: &(f64, f64), b: &(f64, f64)| (a.0 - b.0).abs() + (a.1 - b.1).abs();
        let table = |scale: f64| {
            locations
                .iter()
                .map(|a| locations.iter().map(|b| (degrees(a, b) * scale) as i32).collect())
                .collect()
        };
        Ok(TravelMatrix {
            durations: table(60.0),
            distances: table(1000.0),
        })
    }
}

/// Always fails, like an unreachable routing backend.
pub struct FailingMatrix;

impl DistanceMatrixProvider for FailingMatrix {
    fn matrix_for(&self, _locations: &[(f64, f64)]) -> Result<TravelMatrix, MatrixError> {
        Err(MatrixError::Backend {
            code: "NoTable".to_string(),
            message: "routing backend unavailable".to_string(),
        })
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    pub notices: Mutex<Vec<(String, RouteChangeNotice<String>)>>,
}

impl CollectingNotifier {
    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<RouteChangeNotice<String>> {
        self.notices.lock().unwrap().last().map(|(_, notice)| notice.clone())
    }
}

impl DriverNotifier<String, String> for CollectingNotifier {
    fn notify(&self, driver_id: &String, notice: &RouteChangeNotice<String>) {
        self.notices
            .lock()
            .unwrap()
            .push((driver_id.clone(), notice.clone()));
    }
}

//! dispatch-planner core
//!
//! Batching, pickup-and-delivery sequencing and live re-optimization of
//! multi-order delivery routes for drivers.

pub mod batching;
pub mod config;
pub mod cost;
pub mod error;
pub mod haversine;
pub mod models;
pub mod monitor;
pub mod osrm;
pub mod planner;
pub mod polyline;
pub mod reoptimize;
pub mod traits;
pub mod tsp;

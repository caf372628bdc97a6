//! Live, incremental vehicle routing.
//!
//! A depot, vehicles and visits arrive and leave while a background local
//! search keeps the routes good. Edits made while solving reach the search
//! as fact changes, so it never restarts from scratch.
//!
//! # Domain Model
//!
//! - [`Location`](domain::Location): Geographic point with haversine distance
//! - [`Visit`](domain::Visit): Customer stop with a demand, chained into a route
//! - [`Vehicle`](domain::Vehicle): Delivery vehicle with capacity, heading its chain
//! - [`VehicleRoutePlan`](domain::VehicleRoutePlan): Complete planning solution
//!
//! # Constraints
//!
//! - **Vehicle capacity** (hard): Total demand must not exceed vehicle capacity
//! - **Distance** (soft): Minimize total travel cost, depot to depot
//!
//! # Solving
//!
//! - [`RouteOptimizer`](optimizer::RouteOptimizer): Turns domain events into
//!   plan edits or fact changes
//! - [`SolverManager`](solver::SolverManager): Owns the solver thread and its
//!   fact-change queue

pub mod api;
pub mod arena;
pub mod config;
pub mod console;
pub mod constraints;
pub mod construction;
pub mod director;
pub mod distance;
pub mod domain;
pub mod dto;
pub mod error;
pub mod fact_change;
pub mod local_search;
pub mod moves;
pub mod optimizer;
pub mod score;
pub mod snapshot;
pub mod solver;

//! Constraint definitions for the vehicle routing problem.
//!
//! # Constraints
//!
//! - **Vehicle capacity** (hard): total routed demand must not exceed capacity
//! - **Minimize distance** (soft): reduce total travel cost over all routes
//!
//! Everything here is a full recomputation. The incremental path lives in
//! [`ScoreDirector`](crate::director::ScoreDirector) and reuses
//! [`tally_vehicle`] for the vehicles a move touches.

use serde::Serialize;

use crate::distance::DistanceOracle;
use crate::domain::{LocationId, VehicleIdx, VehicleRoutePlan};
use crate::error::{ConsistencyError, EngineFailure, LookupError};
use crate::score::HardSoftScore;

pub const VEHICLE_CAPACITY: &str = "vehicleCapacity";
pub const MINIMIZE_DISTANCE: &str = "minimizeDistance";

/// Hard penalty for a vehicle carrying `demand` with room for `capacity`.
#[inline]
pub fn capacity_penalty(demand: u64, capacity: u32) -> i64 {
    demand.saturating_sub(u64::from(capacity)) as i64
}

/// Cost of one leg; a location to itself is free.
#[inline]
pub fn leg(oracle: &dyn DistanceOracle, from: LocationId, to: LocationId) -> Result<i64, LookupError> {
    if from == to {
        Ok(0)
    } else {
        oracle.distance(from, to)
    }
}

/// Aggregates of one vehicle's route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleTally {
    pub demand: u64,
    pub distance: i64,
}

impl VehicleTally {
    #[inline]
    pub fn score(&self, capacity: u32) -> HardSoftScore {
        HardSoftScore::of(-capacity_penalty(self.demand, capacity), -self.distance)
    }
}

/// Walks one route: depot → first → … → last → depot.
pub fn tally_vehicle(
    plan: &VehicleRoutePlan,
    vehicle: VehicleIdx,
    oracle: &dyn DistanceOracle,
) -> Result<VehicleTally, EngineFailure> {
    let mut route = plan.route(vehicle).peekable();
    if route.peek().is_none() {
        return Ok(VehicleTally::default());
    }
    let Some(depot) = plan.depot().map(|d| d.id()) else {
        let first = route.next().map_or(-1, |v| plan[v].id());
        return Err(ConsistencyError::NoDepot(first).into());
    };

    let mut tally = VehicleTally::default();
    let mut at = depot;
    for visit in route {
        let visit = &plan[visit];
        tally.demand += u64::from(visit.demand());
        tally.distance += leg(oracle, at, visit.id())?;
        at = visit.id();
    }
    tally.distance += leg(oracle, at, depot)?;
    Ok(tally)
}

/// Full score of a plan from scratch.
pub fn calculate_score(
    plan: &VehicleRoutePlan,
    oracle: &dyn DistanceOracle,
) -> Result<HardSoftScore, EngineFailure> {
    let mut score = HardSoftScore::ZERO;
    for (idx, vehicle) in plan.vehicles() {
        score += tally_vehicle(plan, idx, oracle)?.score(vehicle.capacity());
    }
    Ok(score)
}

/// Per-constraint breakdown of a plan's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintTotal {
    pub name: &'static str,
    pub score: HardSoftScore,
    pub match_count: usize,
}

/// Breaks the full score down by constraint. Matches are the vehicles that
/// contribute a non-zero penalty.
pub fn explain(
    plan: &VehicleRoutePlan,
    oracle: &dyn DistanceOracle,
) -> Result<Vec<ConstraintTotal>, EngineFailure> {
    let mut capacity = ConstraintTotal {
        name: VEHICLE_CAPACITY,
        score: HardSoftScore::ZERO,
        match_count: 0,
    };
    let mut distance = ConstraintTotal {
        name: MINIMIZE_DISTANCE,
        score: HardSoftScore::ZERO,
        match_count: 0,
    };

    for (idx, vehicle) in plan.vehicles() {
        let tally = tally_vehicle(plan, idx, oracle)?;
        let excess = capacity_penalty(tally.demand, vehicle.capacity());
        if excess > 0 {
            capacity.score += HardSoftScore::of_hard(-excess);
            capacity.match_count += 1;
        }
        if tally.distance != 0 {
            distance.score += HardSoftScore::of_soft(-tally.distance);
            distance.match_count += 1;
        }
    }
    Ok(vec![capacity, distance])
}

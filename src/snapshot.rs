//! Route snapshots handed to the outside world.

use serde::Serialize;

use crate::domain::{LocationId, VehicleId, VehicleRoutePlan};
use crate::score::HardSoftScore;

/// One vehicle's route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub vehicle_id: VehicleId,
    pub depot_id: Option<LocationId>,
    pub visit_ids: Vec<LocationId>,
}

/// Immutable, serializable view of a plan.
///
/// Holds one route per known vehicle, ordered by vehicle id, including
/// vehicles with an empty route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    /// Total travel cost, the negated soft score.
    pub total_cost: i64,
    pub score: HardSoftScore,
    pub vehicle_ids: Vec<VehicleId>,
    pub depot_id: Option<LocationId>,
    /// Every visit id, sorted.
    pub visit_ids: Vec<LocationId>,
    pub unassigned_visit_ids: Vec<LocationId>,
    pub routes: Vec<RouteEntry>,
}

impl RouteSnapshot {
    /// Snapshot of an empty plan.
    pub fn empty() -> Self {
        Self::extract(&VehicleRoutePlan::new())
    }

    /// Extracts a snapshot. Deterministic: the same plan always yields an
    /// equal snapshot.
    pub fn extract(plan: &VehicleRoutePlan) -> Self {
        let depot_id = plan.depot().map(|d| d.id());
        let vehicles = plan.vehicles_by_id();

        let routes: Vec<RouteEntry> = vehicles
            .iter()
            .map(|&v| RouteEntry {
                vehicle_id: plan[v].id(),
                depot_id,
                visit_ids: plan.route(v).map(|x| plan[x].id()).collect(),
            })
            .collect();

        let mut visit_ids: Vec<LocationId> = plan.visits().map(|(_, v)| v.id()).collect();
        visit_ids.sort_unstable();

        Self {
            total_cost: -plan.score().soft(),
            score: plan.score(),
            vehicle_ids: routes.iter().map(|r| r.vehicle_id).collect(),
            depot_id,
            visit_ids,
            unassigned_visit_ids: plan.unassigned_visits().into_iter().map(|v| plan[v].id()).collect(),
            routes,
        }
    }
}

//! Neighbourhood moves over the visit chains.
//!
//! Every move is a small value type naming arena indices. It can be applied
//! to a plan, and its exact inverse can be computed beforehand, so a plateau
//! excursion can always be rolled back step by step.

use crate::domain::{LocationId, Standstill, VehicleIdx, VehicleRoutePlan, VisitIdx};
use crate::error::ConsistencyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    /// Moves `visit` to right after `after`, possibly on another vehicle.
    Relocate { visit: VisitIdx, after: Standstill },
    /// Exchanges the positions of two visits, possibly across vehicles.
    Swap { left: VisitIdx, right: VisitIdx },
    /// Reverses the sub-route `first..=last` of `vehicle` (2-opt).
    Reverse {
        vehicle: VehicleIdx,
        first: VisitIdx,
        last: VisitIdx,
    },
}

impl Move {
    /// Whether applying the move would change anything.
    pub fn is_doable(&self, plan: &VehicleRoutePlan) -> bool {
        match *self {
            Move::Relocate { visit, after } => {
                after != Standstill::Visit(visit)
                    && plan.visit(visit).and_then(|v| v.previous()) != Some(after)
                    && plan.vehicle_of(after).is_some()
            }
            Move::Swap { left, right } => left != right,
            Move::Reverse { first, last, .. } => first != last,
        }
    }

    pub fn apply(&self, plan: &mut VehicleRoutePlan) -> Result<(), ConsistencyError> {
        match *self {
            Move::Relocate { visit, after } => {
                plan.unlink(visit)?;
                plan.link_after(visit, after)
            }
            Move::Swap { left, right } => plan.swap_visits(left, right),
            Move::Reverse { first, last, .. } => plan.reverse_segment(first, last),
        }
    }

    /// The move that undoes `self`. Must be computed before `self` is applied.
    pub fn undo(&self, plan: &VehicleRoutePlan) -> Result<Move, ConsistencyError> {
        match *self {
            Move::Relocate { visit, .. } => {
                let previous = plan.visit(visit).and_then(|v| v.previous()).ok_or_else(|| {
                    ConsistencyError::BrokenChain(format!("relocated visit at slot {} is not routed", visit.0))
                })?;
                Ok(Move::Relocate {
                    visit,
                    after: previous,
                })
            }
            Move::Swap { .. } => Ok(*self),
            Move::Reverse {
                vehicle,
                first,
                last,
            } => Ok(Move::Reverse {
                vehicle,
                first: last,
                last: first,
            }),
        }
    }

    /// Visits whose position the move changes.
    pub fn moved_visits(&self, plan: &VehicleRoutePlan) -> Vec<VisitIdx> {
        match *self {
            Move::Relocate { visit, .. } => vec![visit],
            Move::Swap { left, right } => vec![left, right],
            Move::Reverse { first, last, .. } => {
                plan.segment(first, last).unwrap_or_else(|_| vec![first, last])
            }
        }
    }

    /// Sum of the ids of the moved visits, used to break delta ties.
    pub fn id_sum(&self, plan: &VehicleRoutePlan) -> LocationId {
        let id = |v: VisitIdx| plan.visit(v).map_or(0, |v| v.id());
        match *self {
            Move::Relocate { visit, .. } => id(visit),
            Move::Swap { left, right } => id(left) + id(right),
            Move::Reverse { first, last, .. } => plan
                .segment(first, last)
                .map(|segment| segment.into_iter().map(id).sum())
                .unwrap_or_else(|_| id(first) + id(last)),
        }
    }

    /// Vehicles whose routes the move changes (one or two).
    pub fn touched_vehicles(&self, plan: &VehicleRoutePlan) -> (Option<VehicleIdx>, Option<VehicleIdx>) {
        let distinct = |a: Option<VehicleIdx>, b: Option<VehicleIdx>| if a == b { (a, None) } else { (a, b) };
        match *self {
            Move::Relocate { visit, after } => {
                distinct(plan.vehicle_of(Standstill::Visit(visit)), plan.vehicle_of(after))
            }
            Move::Swap { left, right } => distinct(
                plan.vehicle_of(Standstill::Visit(left)),
                plan.vehicle_of(Standstill::Visit(right)),
            ),
            Move::Reverse { vehicle, .. } => (Some(vehicle), None),
        }
    }
}

/// All doable moves over routed visits, in a deterministic order.
///
/// Routes are visited by vehicle id and visits in route order. Relocations
/// come first, then swaps, then reversals.
pub fn enumerate_moves(plan: &VehicleRoutePlan) -> Vec<Move> {
    let vehicles = plan.vehicles_by_id();
    let routes: Vec<(VehicleIdx, Vec<VisitIdx>)> = vehicles
        .iter()
        .map(|&v| (v, plan.route(v).collect()))
        .collect();
    let routed: Vec<VisitIdx> = routes.iter().flat_map(|(_, r)| r.iter().copied()).collect();

    let mut anchors: Vec<Standstill> = Vec::with_capacity(vehicles.len() + routed.len());
    for (vehicle, route) in &routes {
        anchors.push(Standstill::Vehicle(*vehicle));
        anchors.extend(route.iter().map(|&v| Standstill::Visit(v)));
    }

    let mut moves = Vec::new();

    for &visit in &routed {
        for &after in &anchors {
            let mv = Move::Relocate { visit, after };
            if mv.is_doable(plan) {
                moves.push(mv);
            }
        }
    }

    for (i, &left) in routed.iter().enumerate() {
        for &right in &routed[i + 1..] {
            moves.push(Move::Swap { left, right });
        }
    }

    for (vehicle, route) in &routes {
        for (i, &first) in route.iter().enumerate() {
            for &last in &route[i + 1..] {
                moves.push(Move::Reverse {
                    vehicle: *vehicle,
                    first,
                    last,
                });
            }
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::{Depot, Location, Vehicle, VehicleInfo, Visit};

    fn plan(routes: &[&[LocationId]]) -> VehicleRoutePlan {
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(Arc::new(Location::new(0, 0.0, 0.0).unwrap())))
            .unwrap();
        for (k, route) in routes.iter().enumerate() {
            let v = plan
                .add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(k as i64 + 1, "V")), 10))
                .unwrap();
            let mut anchor = Standstill::Vehicle(v);
            for &id in route.iter() {
                let loc = Arc::new(Location::new(id, 0.0, 0.0).unwrap());
                let idx = plan.add_visit(Visit::new(loc, 1)).unwrap();
                plan.link_after(idx, anchor).unwrap();
                anchor = Standstill::Visit(idx);
            }
        }
        plan
    }

    fn routes(plan: &VehicleRoutePlan) -> Vec<Vec<LocationId>> {
        plan.vehicles_by_id()
            .into_iter()
            .map(|v| plan.route(v).map(|x| plan[x].id()).collect())
            .collect()
    }

    #[test]
    fn enumeration_skips_no_op_relocations() {
        let plan = plan(&[&[1, 2, 3]]);
        let moves = enumerate_moves(&plan);
        // 3 visits × 4 anchors, minus self and current predecessor for each.
        let relocations = moves
            .iter()
            .filter(|m| matches!(m, Move::Relocate { .. }))
            .count();
        assert_eq!(relocations, 3 * 4 - 3 * 2);
        assert!(moves.iter().all(|m| m.is_doable(&plan)));
        assert_eq!(moves.iter().filter(|m| matches!(m, Move::Swap { .. })).count(), 3);
        assert_eq!(moves.iter().filter(|m| matches!(m, Move::Reverse { .. })).count(), 3);
    }

    #[test]
    fn every_move_is_undone_by_its_inverse() {
        let original = plan(&[&[1, 2, 3, 4], &[5, 6]]);
        for mv in enumerate_moves(&original) {
            let mut plan = original.clone();
            let undo = mv.undo(&plan).unwrap();
            mv.apply(&mut plan).unwrap();
            plan.validate().unwrap();
            assert_ne!(routes(&plan), routes(&original), "{mv:?} changed nothing");
            undo.apply(&mut plan).unwrap();
            plan.validate().unwrap();
            assert_eq!(routes(&plan), routes(&original), "{mv:?} was not undone");
        }
    }

    #[test]
    fn relocation_across_vehicles_touches_both() {
        let plan = plan(&[&[1], &[2]]);
        let one = plan.find_visit(1).unwrap();
        let two = plan.find_visit(2).unwrap();
        let mv = Move::Relocate {
            visit: one,
            after: Standstill::Visit(two),
        };
        let (a, b) = mv.touched_vehicles(&plan);
        assert_eq!(a, plan.find_vehicle(1));
        assert_eq!(b, plan.find_vehicle(2));
        assert_eq!(mv.id_sum(&plan), 1);
    }
}

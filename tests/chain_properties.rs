//! Random edit sequences keep the chains consistent and the incremental
//! score equal to a full recalculation.

mod common;

use std::sync::Arc;

use common::{location, oracle, KNOWN};
use proptest::prelude::*;
use route_optimizer::constraints::calculate_score;
use route_optimizer::construction::construct;
use route_optimizer::director::ScoreDirector;
use route_optimizer::domain::{Depot, LocationId, Vehicle, VehicleId, VehicleInfo, VehicleRoutePlan, Visit};
use route_optimizer::moves::enumerate_moves;

#[derive(Debug, Clone)]
enum Op {
    AddVisit(LocationId, u32),
    RemoveVisit(LocationId),
    AddVehicle(VehicleId, u32),
    RemoveVehicle(VehicleId),
    SetCapacity(VehicleId, u32),
    Construct,
    Move(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1..KNOWN, 0u32..6).prop_map(|(id, demand)| Op::AddVisit(id, demand)),
        (1..KNOWN).prop_map(Op::RemoveVisit),
        (1i64..4, 0u32..12).prop_map(|(id, capacity)| Op::AddVehicle(id, capacity)),
        (1i64..4).prop_map(Op::RemoveVehicle),
        (1i64..4, 0u32..12).prop_map(|(id, capacity)| Op::SetCapacity(id, capacity)),
        Just(Op::Construct),
        any::<usize>().prop_map(Op::Move),
        any::<usize>().prop_map(Op::Move),
    ]
}

fn apply(director: &mut ScoreDirector, op: &Op) {
    let plan = director.working_solution();
    match *op {
        Op::AddVisit(id, demand) => {
            if plan.find_visit(id).is_none() {
                director.add_visit(Visit::new(location(id), demand)).unwrap();
            }
        }
        Op::RemoveVisit(id) => {
            if let Some(idx) = plan.find_visit(id) {
                let location = plan[idx].location().clone();
                director.remove_visit(&location).unwrap();
            }
        }
        Op::AddVehicle(id, capacity) => {
            if plan.find_vehicle(id).is_none() {
                let info = Arc::new(VehicleInfo::new(id, format!("Vehicle {}", id)));
                director.add_vehicle(Vehicle::new(info, capacity)).unwrap();
            }
        }
        Op::RemoveVehicle(id) => {
            if let Some(idx) = plan.find_vehicle(id) {
                let info = plan[idx].info().clone();
                director.remove_vehicle(&info).unwrap();
            }
        }
        Op::SetCapacity(id, capacity) => {
            if let Some(idx) = plan.find_vehicle(id) {
                let info = plan[idx].info().clone();
                director.set_capacity(&info, capacity).unwrap();
            }
        }
        Op::Construct => {
            construct(director).unwrap();
        }
        Op::Move(pick) => {
            let moves = enumerate_moves(plan);
            if moves.is_empty() {
                return;
            }
            let mv = moves[pick % moves.len()];
            let expected = director.score() + director.delta(&mv).unwrap();
            director.do_move(&mv).unwrap();
            assert_eq!(director.score(), expected);
        }
    }
    director.refresh_dirty().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chains_stay_consistent_under_random_edits(ops in prop::collection::vec(op(), 1..40)) {
        let oracle = oracle();
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(location(0))).unwrap();
        let mut director = ScoreDirector::new(plan, oracle.clone()).unwrap();

        for op in &ops {
            apply(&mut director, op);
            let plan = director.working_solution();
            prop_assert!(plan.validate().is_ok(), "{:?} after {:?}", plan.validate(), op);
            prop_assert_eq!(director.score(), calculate_score(plan, oracle.as_ref()).unwrap());

            let routed: usize = plan.vehicles_by_id().into_iter().map(|v| plan.route(v).count()).sum();
            prop_assert_eq!(routed + plan.unassigned_visits().len(), plan.visit_count());
        }
    }
}

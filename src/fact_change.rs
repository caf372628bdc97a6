//! Live edits to a running solver's working copy.

use std::fmt;
use std::sync::Arc;

use crate::director::ScoreDirector;
use crate::domain::{Location, Vehicle, VehicleInfo, Visit};
use crate::error::FactChangeError;

/// A unit of live mutation, queued while the solver runs and applied in
/// submission order between search steps.
///
/// Targets are looked up by id in the working copy and must be the very
/// `Arc` instance recorded at submission, otherwise the change fails with
/// [`FactChangeError::WorkingCopyMismatch`].
#[derive(Debug, Clone)]
pub enum FactChange {
    AddVisit(Visit),
    RemoveVisit(Arc<Location>),
    AddVehicle(Vehicle),
    RemoveVehicle(Arc<VehicleInfo>),
    ChangeCapacity(Arc<VehicleInfo>, u32),
}

impl FactChange {
    /// Applies the change to the working copy. The touched vehicles are left
    /// for `ScoreDirector::refresh_dirty`.
    pub fn apply(&self, director: &mut ScoreDirector) -> Result<(), FactChangeError> {
        match self {
            FactChange::AddVisit(visit) => director.add_visit(visit.clone()).map(drop),
            FactChange::RemoveVisit(location) => director.remove_visit(location),
            FactChange::AddVehicle(vehicle) => director.add_vehicle(vehicle.clone()).map(drop),
            FactChange::RemoveVehicle(info) => director.remove_vehicle(info),
            FactChange::ChangeCapacity(info, capacity) => director.set_capacity(info, *capacity),
        }
        .map_err(FactChangeError::from)
    }
}

impl fmt::Display for FactChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactChange::AddVisit(visit) => write!(f, "add visit {}", visit.id()),
            FactChange::RemoveVisit(location) => write!(f, "remove visit {}", location.id),
            FactChange::AddVehicle(vehicle) => write!(f, "add vehicle {}", vehicle.id()),
            FactChange::RemoveVehicle(info) => write!(f, "remove vehicle {}", info.id),
            FactChange::ChangeCapacity(info, capacity) => {
                write!(f, "change vehicle {} capacity to {}", info.id, capacity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::constraints::calculate_score;
    use crate::distance::{DistanceMatrix, DistanceOracle};
    use crate::domain::{Depot, Standstill, VehicleRoutePlan};
    use crate::error::{ConsistencyError, EntityKind};

    fn location(id: i64) -> Arc<Location> {
        Arc::new(Location::new(id, 0.0, id as f64 / 10.0).unwrap())
    }

    fn director() -> (ScoreDirector, Vec<Arc<Location>>, Arc<VehicleInfo>) {
        let matrix = DistanceMatrix::new(|a: &Location, b: &Location| (a.id - b.id).abs() * 7);
        let locations: Vec<_> = (0..5).map(location).collect();
        for loc in &locations {
            matrix.add_location(loc.clone());
        }
        let info = Arc::new(VehicleInfo::new(1, "V1"));
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(locations[0].clone())).unwrap();
        let v = plan.add_vehicle(Vehicle::new(info.clone(), 10)).unwrap();
        let mut anchor = Standstill::Vehicle(v);
        for loc in &locations[1..3] {
            let idx = plan.add_visit(Visit::new(loc.clone(), 4)).unwrap();
            plan.link_after(idx, anchor).unwrap();
            anchor = Standstill::Visit(idx);
        }
        let oracle: Arc<dyn DistanceOracle> = Arc::new(matrix);
        (ScoreDirector::new(plan, oracle).unwrap(), locations, info)
    }

    #[test]
    fn batch_applies_in_order_and_rescoring_is_exact() {
        let (mut director, locations, info) = director();
        let batch = [
            FactChange::AddVisit(Visit::new(locations[3].clone(), 2)),
            FactChange::RemoveVisit(locations[1].clone()),
            FactChange::ChangeCapacity(info.clone(), 3),
            FactChange::AddVehicle(Vehicle::new(Arc::new(VehicleInfo::new(2, "V2")), 5)),
        ];
        for change in &batch {
            change.apply(&mut director).unwrap();
        }
        director.refresh_dirty().unwrap();

        let plan = director.working_solution();
        assert_eq!(plan.visit_count(), 2);
        assert_eq!(plan.vehicle_count(), 2);
        assert_eq!(plan.unassigned_visits().len(), 1);
        assert_eq!(director.score(), calculate_score(plan, director.oracle()).unwrap());
        assert_eq!(director.score().hard(), -1);
    }

    #[test]
    fn different_instance_is_a_working_copy_mismatch() {
        let (mut director, _, _) = director();
        let impostor = Arc::new(VehicleInfo::new(1, "V1"));
        assert_eq!(
            FactChange::RemoveVehicle(impostor).apply(&mut director),
            Err(FactChangeError::WorkingCopyMismatch {
                kind: EntityKind::Vehicle,
                id: 1
            })
        );
        assert_eq!(
            FactChange::RemoveVisit(location(2)).apply(&mut director),
            Err(FactChangeError::WorkingCopyMismatch {
                kind: EntityKind::Visit,
                id: 2
            })
        );
        assert_eq!(director.working_solution().visit_count(), 2);
    }

    #[test]
    fn unknown_targets_are_consistency_errors() {
        let (mut director, _, _) = director();
        assert_eq!(
            FactChange::RemoveVisit(location(9)).apply(&mut director),
            Err(FactChangeError::Consistency(ConsistencyError::NotFound {
                kind: EntityKind::Visit,
                id: 9
            }))
        );
    }

    #[test]
    fn display_names_the_target() {
        let change = FactChange::ChangeCapacity(Arc::new(VehicleInfo::new(4, "V4")), 12);
        assert_eq!(change.to_string(), "change vehicle 4 capacity to 12");
    }
}

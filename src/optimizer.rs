//! Route optimizer: turns domain events into plan edits or fact changes.
//!
//! The optimizer keeps its own copy of the facts (depot, vehicles and
//! visits) apart from the solver's working copy. While the solver runs,
//! every edit goes to the solver as a [`FactChange`] first and is committed
//! to the own copy only once the solver accepted it. Otherwise the routes of
//! the last finished run are adopted into the own copy, the edit lands there,
//! and solving restarts from it when there is something to route.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::constraints::calculate_score;
use crate::distance::DistanceOracle;
use crate::domain::{Depot, Location, LocationId, Vehicle, VehicleId, VehicleInfo, VehicleRoutePlan, Visit};
use crate::error::{
    ConsistencyError, EngineFailure, EntityKind, FactChangeError, OptimizerError, SolverError, ValidationError,
};
use crate::fact_change::FactChange;
use crate::snapshot::RouteSnapshot;
use crate::solver::{SolverConfig, SolverListener, SolverManager, SolverStatus};

/// Receives route snapshots and failure signals.
///
/// Called from the solver thread as well as from the optimizer's callers.
pub trait RoutePublisher: Send + Sync {
    fn publish(&self, snapshot: RouteSnapshot);

    /// Emitted once per abnormal solver termination.
    fn publish_failure(&self, cause: &str);
}

/// Forwards engine events to the publisher. Never touches the optimizer's
/// own copy, so it cannot deadlock against a caller waiting in `stop_solver`.
struct PublishingListener {
    publisher: Arc<dyn RoutePublisher>,
}

impl SolverListener for PublishingListener {
    fn best_solution_changed(&self, solution: &VehicleRoutePlan) {
        self.publisher.publish(RouteSnapshot::extract(solution));
    }

    fn solver_failed(&self, failure: &EngineFailure) {
        self.publisher.publish_failure(&failure.to_string());
    }

    fn fact_change_failed(&self, change: &FactChange, error: &FactChangeError) {
        warn!(change = %change, error = %error, "Solver rejected a fact change");
    }
}

/// Converts a signed quantity from the outside into a capacity or demand.
fn quantity(value: i64, negative: impl FnOnce() -> ValidationError) -> Result<u32, ValidationError> {
    if value < 0 {
        return Err(negative());
    }
    u32::try_from(value).map_err(|_| ValidationError::QuantityOverflow(value))
}

/// Orchestrates the live routing session.
///
/// All operations are serialized; each accepted mutation results in exactly
/// one publish, either directly or through the solver's callback.
pub struct RouteOptimizer {
    oracle: Arc<dyn DistanceOracle>,
    publisher: Arc<dyn RoutePublisher>,
    solver: SolverManager,
    plan: Mutex<VehicleRoutePlan>,
}

impl RouteOptimizer {
    pub fn new(config: SolverConfig, oracle: Arc<dyn DistanceOracle>, publisher: Arc<dyn RoutePublisher>) -> Self {
        let listener = Arc::new(PublishingListener {
            publisher: publisher.clone(),
        });
        Self {
            solver: SolverManager::new(config, oracle.clone(), listener),
            oracle,
            publisher,
            plan: Mutex::new(VehicleRoutePlan::new()),
        }
    }

    pub fn solver_status(&self) -> SolverStatus {
        self.solver.status()
    }

    /// Current snapshot of the optimizer's own copy.
    ///
    /// Routes are those of the last run collected; while a run is active
    /// they lag behind the published ones.
    pub fn facts(&self) -> RouteSnapshot {
        RouteSnapshot::extract(&self.plan.lock())
    }

    /// Adds a location: the first one becomes the depot, later ones visits.
    pub fn add_location(&self, location: Arc<Location>, demand: i64) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();

        let id = location.id;
        if plan.depot().is_none() {
            plan.set_depot(Depot::new(location))?;
            info!(depot = id, "Depot added");
            return self.publish_direct(&mut plan);
        }

        let demand = quantity(demand, || ValidationError::NegativeDemand { visit: id, demand })?;
        check_new_visit(&plan, id)?;
        let visit = Visit::new(location.clone(), demand);

        if self.offer(FactChange::AddVisit(visit.clone()))? {
            plan.add_visit(visit)?;
            return Ok(());
        }

        self.settle(&mut plan)?;
        plan.add_visit(visit)?;
        self.solve_or_publish(&mut plan, |plan| plan.remove_visit(&location).map(drop))
    }

    /// Removes the depot or a visit by location id.
    pub fn remove_location(&self, id: LocationId) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();

        if let Some(depot) = plan.depot().filter(|d| d.id() == id).map(|d| d.location().clone()) {
            if plan.visit_count() > 0 {
                return Err(OptimizerError::DepotRemoval {
                    visits: plan.visit_count(),
                });
            }
            plan.remove_depot(&depot)?;
            info!(depot = id, "Depot removed");
            return self.publish_direct(&mut plan);
        }

        let location = self.location_arc(&plan, id)?;
        // The last visit is never handed to the solver: it stops instead.
        if plan.visit_count() > 1 && self.offer(FactChange::RemoveVisit(location.clone()))? {
            plan.remove_visit(&location)?;
            return Ok(());
        }

        self.settle(&mut plan)?;
        let (removed, _) = plan.remove_visit(&location)?;
        self.solve_or_publish(&mut plan, move |plan| plan.add_visit(removed).map(drop))
    }

    pub fn add_vehicle(&self, info: Arc<VehicleInfo>, capacity: i64) -> Result<(), OptimizerError> {
        let id = info.id;
        let capacity = quantity(capacity, || ValidationError::NegativeCapacity { vehicle: id, capacity })?;
        let mut plan = self.plan.lock();
        if plan.find_vehicle(id).is_some() {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Vehicle,
                id,
            }
            .into());
        }
        let vehicle = Vehicle::new(info.clone(), capacity);

        if self.offer(FactChange::AddVehicle(vehicle.clone()))? {
            plan.add_vehicle(vehicle)?;
            return Ok(());
        }

        self.settle(&mut plan)?;
        plan.add_vehicle(vehicle)?;
        self.solve_or_publish(&mut plan, |plan| plan.remove_vehicle(&info).map(drop))
    }

    pub fn remove_vehicle(&self, id: VehicleId) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();
        let info = self.vehicle_arc(&plan, id)?;

        // As with visits, the last vehicle stops the solver.
        if plan.vehicle_count() > 1 && self.offer(FactChange::RemoveVehicle(info.clone()))? {
            plan.remove_vehicle(&info)?;
            return Ok(());
        }

        self.settle(&mut plan)?;
        let (removed, _) = plan.remove_vehicle(&info)?;
        self.solve_or_publish(&mut plan, move |plan| plan.add_vehicle(removed).map(drop))
    }

    pub fn change_capacity(&self, id: VehicleId, capacity: i64) -> Result<(), OptimizerError> {
        let capacity = quantity(capacity, || ValidationError::NegativeCapacity { vehicle: id, capacity })?;
        let mut plan = self.plan.lock();
        let info = self.vehicle_arc(&plan, id)?;

        if self.offer(FactChange::ChangeCapacity(info.clone(), capacity))? {
            plan.set_capacity(&info, capacity)?;
            return Ok(());
        }

        self.settle(&mut plan)?;
        let previous = plan[plan.resolve_vehicle(&info)?].capacity();
        plan.set_capacity(&info, capacity)?;
        self.solve_or_publish(&mut plan, move |plan| plan.set_capacity(&info, previous).map(drop))
    }

    /// Stops the solver and drops the depot and every visit.
    pub fn remove_all_locations(&self) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();
        self.settle(&mut plan)?;
        plan.clear_visits();
        if let Some(depot) = plan.depot().map(|d| d.location().clone()) {
            plan.remove_depot(&depot)?;
        }
        info!("All locations removed");
        self.publish_direct(&mut plan)
    }

    /// Stops the solver and drops every vehicle; visits stay, unassigned.
    pub fn remove_all_vehicles(&self) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();
        self.settle(&mut plan)?;
        plan.clear_vehicles();
        info!("All vehicles removed");
        self.publish_direct(&mut plan)
    }

    /// Stops the solver if it is running, keeping its routes in the own copy.
    pub fn shutdown(&self) -> Result<(), OptimizerError> {
        let mut plan = self.plan.lock();
        self.settle(&mut plan)
    }

    /// Queues `change` on a running solver.
    ///
    /// Returns `false` when no run accepts changes: it is idle, it already
    /// failed, or a bounded run is just ending.
    fn offer(&self, change: FactChange) -> Result<bool, OptimizerError> {
        match self.solver.add_fact_change(change) {
            Ok(()) => Ok(true),
            Err(SolverError::NotRunning | SolverError::Died(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stops any run still active and adopts the routes of the last finished
    /// run into the own copy.
    ///
    /// A failed run leaves the own copy as it is; its failure was published
    /// when it happened.
    fn settle(&self, plan: &mut VehicleRoutePlan) -> Result<(), OptimizerError> {
        match self.solver.stop_solver() {
            Ok(Some(outcome)) => {
                let routed = plan.adopt_routes(&outcome)?;
                debug!(routed, unassigned = plan.visit_count() - routed, "Adopted solver routes");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(SolverError::Died(failure)) => {
                debug!(error = %failure, "Last run failed, keeping the own copy");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restarts solving from the own copy, or publishes it when there is
    /// nothing to solve. `undo` reverts the edit if the solver cannot start.
    fn solve_or_publish(
        &self,
        plan: &mut VehicleRoutePlan,
        undo: impl FnOnce(&mut VehicleRoutePlan) -> Result<(), ConsistencyError>,
    ) -> Result<(), OptimizerError> {
        if !should_solve(plan) {
            return self.publish_direct(plan);
        }
        if let Err(e) = self.solver.start_solver(plan.clone()) {
            revert(undo(plan));
            return Err(e.into());
        }
        Ok(())
    }

    fn location_arc(&self, plan: &VehicleRoutePlan, id: LocationId) -> Result<Arc<Location>, ConsistencyError> {
        plan.find_visit(id)
            .map(|idx| plan[idx].location().clone())
            .ok_or(ConsistencyError::NotFound {
                kind: EntityKind::Visit,
                id,
            })
    }

    fn vehicle_arc(&self, plan: &VehicleRoutePlan, id: VehicleId) -> Result<Arc<VehicleInfo>, ConsistencyError> {
        plan.find_vehicle(id)
            .map(|idx| plan[idx].info().clone())
            .ok_or(ConsistencyError::NotFound {
                kind: EntityKind::Vehicle,
                id,
            })
    }

    /// Scores the own copy and hands it to the publisher.
    fn publish_direct(&self, plan: &mut VehicleRoutePlan) -> Result<(), OptimizerError> {
        let score = calculate_score(plan, self.oracle.as_ref())?;
        plan.set_score(score);
        self.publisher.publish(RouteSnapshot::extract(plan));
        Ok(())
    }
}

impl Drop for RouteOptimizer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Solver did not stop cleanly");
        }
    }
}

fn check_new_visit(plan: &VehicleRoutePlan, id: LocationId) -> Result<(), ConsistencyError> {
    if plan.depot().is_some_and(|d| d.id() == id) {
        return Err(ConsistencyError::Duplicate {
            kind: EntityKind::Depot,
            id,
        });
    }
    if plan.find_visit(id).is_some() {
        return Err(ConsistencyError::Duplicate {
            kind: EntityKind::Visit,
            id,
        });
    }
    Ok(())
}

/// The solver needs a depot, a vehicle and something to visit.
fn should_solve(plan: &VehicleRoutePlan) -> bool {
    plan.depot().is_some() && plan.vehicle_count() > 0 && plan.visit_count() > 0
}

/// Undo of an edit that was just made; it cannot fail on a consistent copy.
fn revert(result: Result<(), ConsistencyError>) {
    if let Err(e) = result {
        error!(error = %e, "Could not revert an edit after the solver refused it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMatrix;

    #[derive(Default)]
    struct Sink {
        snapshots: Mutex<Vec<RouteSnapshot>>,
    }

    impl RoutePublisher for Sink {
        fn publish(&self, snapshot: RouteSnapshot) {
            self.snapshots.lock().push(snapshot);
        }

        fn publish_failure(&self, _cause: &str) {}
    }

    fn optimizer() -> (RouteOptimizer, Arc<Sink>) {
        let matrix = DistanceMatrix::new(|a: &Location, b: &Location| (a.id - b.id).abs());
        for id in 0..5 {
            matrix.add_location(Arc::new(Location::new(id, 0.0, 0.0).unwrap()));
        }
        let sink = Arc::new(Sink::default());
        let optimizer = RouteOptimizer::new(SolverConfig::default(), Arc::new(matrix), sink.clone());
        (optimizer, sink)
    }

    fn location(id: LocationId) -> Arc<Location> {
        Arc::new(Location::new(id, 0.0, 0.0).unwrap())
    }

    #[test]
    fn negative_quantities_are_rejected_before_anything_changes() {
        let (optimizer, sink) = optimizer();
        optimizer.add_location(location(0), 0).unwrap();
        assert!(matches!(
            optimizer.add_location(location(1), -1),
            Err(OptimizerError::Validation(ValidationError::NegativeDemand { visit: 1, demand: -1 }))
        ));
        assert!(matches!(
            optimizer.add_vehicle(Arc::new(VehicleInfo::new(1, "V")), -5),
            Err(OptimizerError::Validation(ValidationError::NegativeCapacity { .. }))
        ));
        assert!(matches!(
            optimizer.add_vehicle(Arc::new(VehicleInfo::new(1, "V")), i64::from(u32::MAX) + 1),
            Err(OptimizerError::Validation(ValidationError::QuantityOverflow(_)))
        ));
        assert_eq!(sink.snapshots.lock().len(), 1);
        assert!(optimizer.facts().visit_ids.is_empty());
    }

    #[test]
    fn duplicate_locations_are_consistency_errors() {
        let (optimizer, _) = optimizer();
        optimizer.add_location(location(0), 0).unwrap();
        optimizer.add_location(location(1), 1).unwrap();
        assert!(matches!(
            optimizer.add_location(location(1), 1),
            Err(OptimizerError::Consistency(ConsistencyError::Duplicate { .. }))
        ));
        assert!(matches!(
            optimizer.add_location(location(0), 1),
            Err(OptimizerError::Consistency(ConsistencyError::Duplicate { .. }))
        ));
        assert!(matches!(
            optimizer.remove_location(7),
            Err(OptimizerError::Consistency(ConsistencyError::NotFound { .. }))
        ));
    }

    #[test]
    fn idle_capacity_change_publishes_directly() {
        let (optimizer, sink) = optimizer();
        optimizer.add_vehicle(Arc::new(VehicleInfo::new(1, "V")), 3).unwrap();
        optimizer.change_capacity(1, 8).unwrap();
        assert_eq!(sink.snapshots.lock().len(), 2);
        assert_eq!(optimizer.solver_status(), SolverStatus::Idle);
    }
}

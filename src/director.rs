//! Incremental score calculation.
//!
//! [`ScoreDirector`] owns one working plan and keeps a score contribution per
//! vehicle. Moves are evaluated with [`ScoreDirector::delta`] without touching
//! the plan; applying one refreshes only the vehicles it changed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::constraints::{capacity_penalty, leg, tally_vehicle, VehicleTally};
use crate::distance::DistanceOracle;
use crate::domain::{
    Location, LocationId, Standstill, Vehicle, VehicleIdx, VehicleInfo, VehicleRoutePlan, Visit,
    VisitIdx,
};
use crate::error::{ConsistencyError, EngineFailure};
use crate::moves::Move;
use crate::score::HardSoftScore;

#[derive(Debug, Clone, Copy)]
struct Contribution {
    tally: VehicleTally,
    score: HardSoftScore,
}

/// Owns the working solution and its incrementally maintained score.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use route_optimizer::director::ScoreDirector;
/// use route_optimizer::distance::DistanceMatrix;
/// use route_optimizer::domain::*;
/// use route_optimizer::moves::Move;
///
/// let matrix = Arc::new(DistanceMatrix::new(|a: &Location, b: &Location| (a.id - b.id).abs()));
/// let mut plan = VehicleRoutePlan::new();
/// for id in 0..3 {
///     matrix.add_location(Arc::new(Location::new(id, 0.0, 0.0).unwrap()));
/// }
/// plan.set_depot(Depot::new(Arc::new(Location::new(0, 0.0, 0.0).unwrap()))).unwrap();
/// let truck = plan.add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(1, "T")), 5)).unwrap();
/// let a = plan.add_visit(Visit::new(Arc::new(Location::new(2, 0.0, 0.0).unwrap()), 1)).unwrap();
/// let b = plan.add_visit(Visit::new(Arc::new(Location::new(1, 0.0, 0.0).unwrap()), 1)).unwrap();
/// plan.link_after(a, Standstill::Vehicle(truck)).unwrap();
/// plan.link_after(b, Standstill::Visit(a)).unwrap();
///
/// let mut director = ScoreDirector::new(plan, matrix).unwrap();
/// assert_eq!(director.score().soft(), -4);
///
/// let swap = Move::Swap { left: a, right: b };
/// let delta = director.delta(&swap).unwrap();
/// director.do_move(&swap).unwrap();
/// assert_eq!(director.score().soft(), -4 + delta.soft());
/// ```
pub struct ScoreDirector {
    plan: VehicleRoutePlan,
    oracle: Arc<dyn DistanceOracle>,
    contributions: Vec<Option<Contribution>>,
    dirty: BTreeSet<VehicleIdx>,
    score: HardSoftScore,
}

impl fmt::Debug for ScoreDirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreDirector")
            .field("score", &self.score)
            .field("vehicles", &self.plan.vehicle_count())
            .field("visits", &self.plan.visit_count())
            .finish()
    }
}

impl ScoreDirector {
    /// Takes ownership of `plan` and scores it from scratch.
    pub fn new(plan: VehicleRoutePlan, oracle: Arc<dyn DistanceOracle>) -> Result<Self, EngineFailure> {
        let mut director = Self {
            plan,
            oracle,
            contributions: Vec::new(),
            dirty: BTreeSet::new(),
            score: HardSoftScore::ZERO,
        };
        director.recalculate()?;
        Ok(director)
    }

    #[inline]
    pub fn score(&self) -> HardSoftScore {
        self.score
    }

    #[inline]
    pub fn working_solution(&self) -> &VehicleRoutePlan {
        &self.plan
    }

    /// A copy of the working solution with its score filled in.
    pub fn clone_solution(&self) -> VehicleRoutePlan {
        let mut plan = self.plan.clone();
        plan.set_score(self.score);
        plan
    }

    pub fn into_solution(mut self) -> VehicleRoutePlan {
        self.plan.set_score(self.score);
        self.plan
    }

    #[inline]
    pub fn oracle(&self) -> &dyn DistanceOracle {
        self.oracle.as_ref()
    }

    /// Routed demand of a vehicle as of the last refresh.
    pub fn vehicle_demand(&self, vehicle: VehicleIdx) -> u64 {
        self.contribution(vehicle).map_or(0, |c| c.tally.demand)
    }

    /// Rebuilds every contribution from scratch.
    pub fn recalculate(&mut self) -> Result<HardSoftScore, EngineFailure> {
        self.contributions = vec![None; self.plan.vehicle_slots()];
        self.score = HardSoftScore::ZERO;
        self.dirty.clear();
        let vehicles: Vec<VehicleIdx> = self.plan.vehicles().map(|(idx, _)| idx).collect();
        for vehicle in vehicles {
            self.refresh_vehicle(vehicle)?;
        }
        Ok(self.score)
    }

    fn contribution(&self, vehicle: VehicleIdx) -> Option<&Contribution> {
        self.contributions.get(vehicle.0).and_then(Option::as_ref)
    }

    /// Recomputes one vehicle's contribution. A vehicle no longer in the plan
    /// just loses its contribution.
    pub fn refresh_vehicle(&mut self, vehicle: VehicleIdx) -> Result<(), EngineFailure> {
        if self.contributions.len() <= vehicle.0 {
            self.contributions.resize(vehicle.0 + 1, None);
        }
        if let Some(old) = self.contributions[vehicle.0].take() {
            self.score = self.score - old.score;
        }
        if let Some(capacity) = self.plan.vehicle(vehicle).map(Vehicle::capacity) {
            let tally = tally_vehicle(&self.plan, vehicle, self.oracle.as_ref())?;
            let score = tally.score(capacity);
            self.score += score;
            self.contributions[vehicle.0] = Some(Contribution { tally, score });
        }
        Ok(())
    }

    /// Refreshes every vehicle touched by fact edits since the last refresh.
    pub fn refresh_dirty(&mut self) -> Result<(), EngineFailure> {
        while let Some(vehicle) = self.dirty.pop_first() {
            self.refresh_vehicle(vehicle)?;
        }
        Ok(())
    }

    #[inline]
    pub fn has_pending_refresh(&self) -> bool {
        !self.dirty.is_empty()
    }

    // =========================================================================
    // Leg helpers
    // =========================================================================

    fn depot_id(&self) -> Result<LocationId, EngineFailure> {
        self.plan
            .depot()
            .map(|d| d.id())
            .ok_or_else(|| ConsistencyError::BrokenChain("routed standstill without a depot".to_owned()).into())
    }

    fn location(&self, standstill: Standstill) -> Result<LocationId, EngineFailure> {
        match standstill {
            Standstill::Vehicle(_) => self.depot_id(),
            Standstill::Visit(idx) => self.visit_id(idx),
        }
    }

    fn visit_id(&self, visit: VisitIdx) -> Result<LocationId, EngineFailure> {
        self.plan
            .visit(visit)
            .map(Visit::id)
            .ok_or_else(|| ConsistencyError::BrokenChain(format!("no visit at slot {}", visit.0)).into())
    }

    /// Where the vehicle heads after `standstill`: the next visit or back to the depot.
    fn successor(&self, standstill: Standstill) -> Result<LocationId, EngineFailure> {
        match self.plan.next_of(standstill) {
            Some(next) => self.visit_id(next),
            None => self.depot_id(),
        }
    }

    fn predecessor(&self, visit: VisitIdx) -> Result<Standstill, EngineFailure> {
        self.plan.visit(visit).and_then(Visit::previous).ok_or_else(|| {
            ConsistencyError::BrokenChain(format!("visit at slot {} is not routed", visit.0)).into()
        })
    }

    fn d(&self, from: LocationId, to: LocationId) -> Result<i64, EngineFailure> {
        Ok(leg(self.oracle.as_ref(), from, to)?)
    }

    fn vehicle_capacity(&self, vehicle: VehicleIdx) -> Result<u32, EngineFailure> {
        self.plan
            .vehicle(vehicle)
            .map(Vehicle::capacity)
            .ok_or_else(|| ConsistencyError::BrokenChain(format!("no vehicle at slot {}", vehicle.0)).into())
    }

    fn vehicle_of(&self, standstill: Standstill) -> Result<VehicleIdx, EngineFailure> {
        self.plan.vehicle_of(standstill).ok_or_else(|| {
            ConsistencyError::BrokenChain(format!("{standstill:?} is not part of any route")).into()
        })
    }

    /// Hard delta of changing a vehicle's routed demand by `change`.
    fn hard_delta(&self, vehicle: VehicleIdx, change: i64) -> Result<i64, EngineFailure> {
        if change == 0 {
            return Ok(0);
        }
        let capacity = self.vehicle_capacity(vehicle)?;
        let before = self.vehicle_demand(vehicle);
        let after = (before as i64 + change).max(0) as u64;
        Ok(capacity_penalty(before, capacity) - capacity_penalty(after, capacity))
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Score change `do_move(mv)` would cause.
    pub fn delta(&self, mv: &Move) -> Result<HardSoftScore, EngineFailure> {
        match *mv {
            Move::Relocate { visit, after } => self.relocate_delta(visit, after),
            Move::Swap { left, right } => self.swap_delta(left, right),
            Move::Reverse { first, last, .. } => self.reverse_delta(first, last),
        }
    }

    fn relocate_delta(&self, visit: VisitIdx, after: Standstill) -> Result<HardSoftScore, EngineFailure> {
        let here = self.visit_id(visit)?;
        let previous = self.predecessor(visit)?;
        if previous == after || after == Standstill::Visit(visit) {
            return Ok(HardSoftScore::ZERO);
        }
        let p = self.location(previous)?;
        let n = self.successor(Standstill::Visit(visit))?;
        let removal = self.d(p, n)? - self.d(p, here)? - self.d(here, n)?;

        let a = self.location(after)?;
        let an = self.successor(after)?;
        let insertion = self.d(a, here)? + self.d(here, an)? - self.d(a, an)?;

        let from = self.vehicle_of(Standstill::Visit(visit))?;
        let to = self.vehicle_of(after)?;
        let hard = if from == to {
            0
        } else {
            let demand = i64::from(self.plan[visit].demand());
            self.hard_delta(from, -demand)? + self.hard_delta(to, demand)?
        };
        Ok(HardSoftScore::of(hard, -(removal + insertion)))
    }

    fn swap_delta(&self, left: VisitIdx, right: VisitIdx) -> Result<HardSoftScore, EngineFailure> {
        if left == right {
            return Ok(HardSoftScore::ZERO);
        }
        let (a, b) = (self.visit_id(left)?, self.visit_id(right)?);
        let prev_left = self.predecessor(left)?;
        let prev_right = self.predecessor(right)?;

        let distance = if prev_right == Standstill::Visit(left) {
            self.adjacent_swap(prev_left, a, b, self.successor(Standstill::Visit(right))?)?
        } else if prev_left == Standstill::Visit(right) {
            self.adjacent_swap(prev_right, b, a, self.successor(Standstill::Visit(left))?)?
        } else {
            let (pa, na) = (self.location(prev_left)?, self.successor(Standstill::Visit(left))?);
            let (pb, nb) = (self.location(prev_right)?, self.successor(Standstill::Visit(right))?);
            self.d(pa, b)? + self.d(b, na)? - self.d(pa, a)? - self.d(a, na)? + self.d(pb, a)?
                + self.d(a, nb)?
                - self.d(pb, b)?
                - self.d(b, nb)?
        };

        let vl = self.vehicle_of(Standstill::Visit(left))?;
        let vr = self.vehicle_of(Standstill::Visit(right))?;
        let hard = if vl == vr {
            0
        } else {
            let change = i64::from(self.plan[right].demand()) - i64::from(self.plan[left].demand());
            self.hard_delta(vl, change)? + self.hard_delta(vr, -change)?
        };
        Ok(HardSoftScore::of(hard, -distance))
    }

    /// Distance change of `p → a → b → n` becoming `p → b → a → n`.
    fn adjacent_swap(
        &self,
        previous: Standstill,
        a: LocationId,
        b: LocationId,
        n: LocationId,
    ) -> Result<i64, EngineFailure> {
        let p = self.location(previous)?;
        Ok(self.d(p, b)? + self.d(b, a)? + self.d(a, n)? - self.d(p, a)? - self.d(a, b)? - self.d(b, n)?)
    }

    fn reverse_delta(&self, first: VisitIdx, last: VisitIdx) -> Result<HardSoftScore, EngineFailure> {
        if first == last {
            return Ok(HardSoftScore::ZERO);
        }
        let segment = self.plan.segment(first, last)?;
        let p = self.location(self.predecessor(first)?)?;
        let n = self.successor(Standstill::Visit(last))?;
        let (f, l) = (self.visit_id(first)?, self.visit_id(last)?);

        let mut distance = self.d(p, l)? + self.d(f, n)? - self.d(p, f)? - self.d(l, n)?;
        for pair in segment.windows(2) {
            let (x, y) = (self.visit_id(pair[0])?, self.visit_id(pair[1])?);
            distance += self.d(y, x)? - self.d(x, y)?;
        }
        Ok(HardSoftScore::of(0, -distance))
    }

    /// Applies a move and refreshes the vehicles it touched.
    pub fn do_move(&mut self, mv: &Move) -> Result<(), EngineFailure> {
        let (a, b) = mv.touched_vehicles(&self.plan);
        mv.apply(&mut self.plan)?;
        for vehicle in [a, b].into_iter().flatten() {
            self.refresh_vehicle(vehicle)?;
        }
        Ok(())
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Score change of routing the unassigned `visit` right after `after`.
    pub fn insertion_delta(&self, visit: VisitIdx, after: Standstill) -> Result<HardSoftScore, EngineFailure> {
        let here = self.visit_id(visit)?;
        let a = self.location(after)?;
        let an = self.successor(after)?;
        let distance = self.d(a, here)? + self.d(here, an)? - self.d(a, an)?;
        let vehicle = self.vehicle_of(after)?;
        let hard = self.hard_delta(vehicle, i64::from(self.plan[visit].demand()))?;
        Ok(HardSoftScore::of(hard, -distance))
    }

    pub fn insert_visit(&mut self, visit: VisitIdx, after: Standstill) -> Result<(), EngineFailure> {
        let vehicle = self.vehicle_of(after)?;
        self.plan.link_after(visit, after)?;
        self.refresh_vehicle(vehicle)
    }

    // =========================================================================
    // Fact edits
    // =========================================================================
    //
    // These only edit the plan and record the touched vehicles; call
    // `refresh_dirty` once the batch is applied.

    pub fn add_visit(&mut self, visit: Visit) -> Result<VisitIdx, ConsistencyError> {
        self.plan.add_visit(visit)
    }

    pub fn remove_visit(&mut self, location: &Arc<Location>) -> Result<(), ConsistencyError> {
        let (_, vehicle) = self.plan.remove_visit(location)?;
        self.dirty.extend(vehicle);
        Ok(())
    }

    pub fn add_vehicle(&mut self, vehicle: Vehicle) -> Result<VehicleIdx, ConsistencyError> {
        let idx = self.plan.add_vehicle(vehicle)?;
        self.dirty.insert(idx);
        Ok(idx)
    }

    pub fn remove_vehicle(&mut self, info: &Arc<VehicleInfo>) -> Result<(), ConsistencyError> {
        let idx = self.plan.resolve_vehicle(info)?;
        self.plan.remove_vehicle(info)?;
        self.dirty.insert(idx);
        Ok(())
    }

    pub fn set_capacity(&mut self, info: &Arc<VehicleInfo>, capacity: u32) -> Result<(), ConsistencyError> {
        let idx = self.plan.set_capacity(info, capacity)?;
        self.dirty.insert(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::calculate_score;
    use crate::distance::DistanceMatrix;
    use crate::domain::Depot;
    use crate::moves::enumerate_moves;

    /// Asymmetric costs on a grid so every delta formula is exercised.
    fn oracle(ids: impl IntoIterator<Item = LocationId>) -> Arc<dyn DistanceOracle> {
        let matrix = DistanceMatrix::new(|a: &Location, b: &Location| {
            let base = ((a.latitude - b.latitude).abs() + (a.longitude - b.longitude).abs()) * 100.0;
            base as i64 + if a.id < b.id { 3 } else { 1 }
        });
        for id in ids {
            matrix.add_location(location(id));
        }
        Arc::new(matrix)
    }

    fn location(id: LocationId) -> Arc<Location> {
        Arc::new(Location::new(id, (id % 3) as f64 * 0.1, (id / 3) as f64 * 0.1).unwrap())
    }

    fn plan(routes: &[(u32, &[(LocationId, u32)])]) -> VehicleRoutePlan {
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(location(0))).unwrap();
        for (k, (capacity, route)) in routes.iter().enumerate() {
            let v = plan
                .add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(k as i64 + 1, "V")), *capacity))
                .unwrap();
            let mut anchor = Standstill::Vehicle(v);
            for &(id, demand) in route.iter() {
                let idx = plan.add_visit(Visit::new(location(id), demand)).unwrap();
                plan.link_after(idx, anchor).unwrap();
                anchor = Standstill::Visit(idx);
            }
        }
        plan
    }

    fn sample() -> ScoreDirector {
        let plan = plan(&[
            (5, &[(1, 2), (2, 3), (3, 1), (4, 2)]),
            (4, &[(5, 4), (6, 1)]),
            (6, &[]),
        ]);
        ScoreDirector::new(plan, oracle(0..7)).unwrap()
    }

    #[test]
    fn predicted_delta_matches_realised_change_for_every_move() {
        let base = sample();
        for mv in enumerate_moves(base.working_solution()) {
            let mut director = ScoreDirector::new(base.working_solution().clone(), base.oracle.clone()).unwrap();
            let before = director.score();
            let delta = director.delta(&mv).unwrap();
            director.do_move(&mv).unwrap();
            assert_eq!(director.score(), before + delta, "{mv:?}");
            let full = calculate_score(director.working_solution(), director.oracle()).unwrap();
            assert_eq!(director.score(), full, "{mv:?}");
        }
    }

    #[test]
    fn insertion_delta_matches_realised_change() {
        let mut director = sample();
        let idx = director.add_visit(Visit::new(location(7), 3)).unwrap();
        let oracle = oracle(0..8);
        director.oracle = oracle;
        let anchors: Vec<Standstill> = {
            let plan = director.working_solution();
            plan.vehicles()
                .flat_map(|(v, _)| {
                    std::iter::once(Standstill::Vehicle(v)).chain(plan.route(v).map(Standstill::Visit))
                })
                .collect()
        };
        for after in anchors {
            let mut trial = ScoreDirector::new(director.working_solution().clone(), director.oracle.clone()).unwrap();
            let delta = trial.insertion_delta(idx, after).unwrap();
            let before = trial.score();
            trial.insert_visit(idx, after).unwrap();
            assert_eq!(trial.score(), before + delta, "{after:?}");
        }
    }

    #[test]
    fn fact_edits_are_scored_after_refresh() {
        let mut director = sample();
        let info = director.working_solution()[director.working_solution().find_vehicle(2).unwrap()]
            .info()
            .clone();
        director.set_capacity(&info, 1).unwrap();
        let gone = director.working_solution()[director.working_solution().find_visit(2).unwrap()]
            .location()
            .clone();
        director.remove_visit(&gone).unwrap();
        assert!(director.has_pending_refresh());
        director.refresh_dirty().unwrap();

        let full = calculate_score(director.working_solution(), director.oracle()).unwrap();
        assert_eq!(director.score(), full);
        // Vehicle 2 now carries 5 with room for 1.
        assert_eq!(full.hard(), -4);
    }

    #[test]
    fn removing_a_vehicle_drops_its_contribution() {
        let mut director = sample();
        let info = director.working_solution()[director.working_solution().find_vehicle(1).unwrap()]
            .info()
            .clone();
        director.remove_vehicle(&info).unwrap();
        director.refresh_dirty().unwrap();
        let full = calculate_score(director.working_solution(), director.oracle()).unwrap();
        assert_eq!(director.score(), full);
        assert_eq!(director.working_solution().unassigned_visits().len(), 4);
    }
}

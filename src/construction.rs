//! Cheapest-insertion construction heuristic.
//!
//! Repeatedly routes the unassigned visit whose best insertion is the best
//! overall. Each pending visit caches its best insertion per vehicle; after an
//! insertion only the vehicle that received it is re-evaluated, because no
//! other route changed.

use std::cmp::Ordering;

use tracing::debug;

use crate::director::ScoreDirector;
use crate::domain::{LocationId, Location, Standstill, VehicleIdx, VisitIdx};
use crate::error::EngineFailure;
use crate::score::HardSoftScore;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    delta: HardSoftScore,
    after: Standstill,
}

struct Pending {
    visit: VisitIdx,
    id: LocationId,
    angle: f64,
    /// Best insertion per vehicle, aligned with the by-id vehicle order.
    best: Vec<Option<Candidate>>,
}

impl Pending {
    /// The first best candidate, scanning vehicles by id.
    fn best(&self) -> Option<Candidate> {
        self.best.iter().flatten().fold(None, |acc: Option<Candidate>, c| match acc {
            Some(b) if b.delta >= c.delta => Some(b),
            _ => Some(*c),
        })
    }
}

/// Statistics of one construction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstructionStats {
    pub inserted: usize,
    pub moves_evaluated: u64,
}

/// Routes every unassigned visit.
///
/// Does nothing without a depot or without vehicles.
pub fn construct(director: &mut ScoreDirector) -> Result<ConstructionStats, EngineFailure> {
    let mut stats = ConstructionStats::default();
    let plan = director.working_solution();
    let Some(depot) = plan.depot().map(|d| d.location().clone()) else {
        return Ok(stats);
    };
    let vehicles = plan.vehicles_by_id();
    if vehicles.is_empty() {
        return Ok(stats);
    }

    let mut pending: Vec<Pending> = plan
        .unassigned_visits()
        .into_iter()
        .map(|visit| {
            let location: &Location = plan[visit].location();
            Pending {
                visit,
                id: location.id,
                angle: location.angle_from(&depot),
                best: vec![None; vehicles.len()],
            }
        })
        .collect();
    if pending.is_empty() {
        return Ok(stats);
    }

    for entry in &mut pending {
        for (slot, &vehicle) in vehicles.iter().enumerate() {
            entry.best[slot] = best_in_route(director, entry.visit, vehicle, &mut stats)?;
        }
    }

    while !pending.is_empty() {
        let Some((pos, candidate)) = select(&pending) else {
            break;
        };
        let entry = pending.swap_remove(pos);
        director.insert_visit(entry.visit, candidate.after)?;
        stats.inserted += 1;

        let Some(vehicle) = director.working_solution().vehicle_of(candidate.after) else {
            continue;
        };
        let Some(slot) = vehicles.iter().position(|&v| v == vehicle) else {
            continue;
        };
        for other in &mut pending {
            other.best[slot] = best_in_route(director, other.visit, vehicle, &mut stats)?;
        }
    }

    debug!(
        inserted = stats.inserted,
        moves = stats.moves_evaluated,
        score = %director.score(),
        "Construction finished"
    );
    Ok(stats)
}

/// Best position for `visit` on `vehicle`; the earliest wins ties.
fn best_in_route(
    director: &ScoreDirector,
    visit: VisitIdx,
    vehicle: VehicleIdx,
    stats: &mut ConstructionStats,
) -> Result<Option<Candidate>, EngineFailure> {
    let plan = director.working_solution();
    let anchors = std::iter::once(Standstill::Vehicle(vehicle)).chain(plan.route(vehicle).map(Standstill::Visit));
    let mut best: Option<Candidate> = None;
    for after in anchors {
        let delta = director.insertion_delta(visit, after)?;
        stats.moves_evaluated += 1;
        if best.map_or(true, |b| delta > b.delta) {
            best = Some(Candidate { delta, after });
        }
    }
    Ok(best)
}

/// Pending visit with the best insertion; ties go to the smaller depot angle,
/// then the smaller id.
fn select(pending: &[Pending]) -> Option<(usize, Candidate)> {
    let mut chosen: Option<(usize, Candidate)> = None;
    for (pos, entry) in pending.iter().enumerate() {
        let Some(candidate) = entry.best() else {
            continue;
        };
        let better = match chosen {
            None => true,
            Some((cpos, current)) => match candidate.delta.cmp(&current.delta) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => {
                    let incumbent = &pending[cpos];
                    entry
                        .angle
                        .total_cmp(&incumbent.angle)
                        .then(entry.id.cmp(&incumbent.id))
                        == Ordering::Less
                }
            },
        };
        if better {
            chosen = Some((pos, candidate));
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::constraints::calculate_score;
    use crate::distance::DistanceMatrix;
    use crate::domain::{Depot, Vehicle, VehicleInfo, VehicleRoutePlan, Visit};

    fn location(id: LocationId, lat: f64, lng: f64) -> Arc<Location> {
        Arc::new(Location::new(id, lat, lng).unwrap())
    }

    fn manhattan(a: &Location, b: &Location) -> i64 {
        (((a.latitude - b.latitude).abs() + (a.longitude - b.longitude).abs()) * 1000.0).round() as i64
    }

    fn setup(visits: &[(LocationId, f64, f64, u32)], capacities: &[u32]) -> ScoreDirector {
        let matrix = DistanceMatrix::new(manhattan);
        let depot = location(0, 0.0, 0.0);
        matrix.add_location(depot.clone());
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(depot)).unwrap();
        for (k, &capacity) in capacities.iter().enumerate() {
            plan.add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(k as i64 + 1, "V")), capacity))
                .unwrap();
        }
        for &(id, lat, lng, demand) in visits {
            let loc = location(id, lat, lng);
            matrix.add_location(loc.clone());
            plan.add_visit(Visit::new(loc, demand)).unwrap();
        }
        ScoreDirector::new(plan, Arc::new(matrix)).unwrap()
    }

    #[test]
    fn assigns_every_visit_and_score_stays_exact() {
        let mut director = setup(
            &[
                (1, 0.0, 1.0, 3),
                (2, 0.0, 2.0, 3),
                (3, 1.0, 0.0, 3),
                (4, 2.0, 0.0, 3),
                (5, -1.0, -1.0, 3),
            ],
            &[6, 6, 6],
        );
        let stats = construct(&mut director).unwrap();
        assert_eq!(stats.inserted, 5);
        let plan = director.working_solution();
        assert!(plan.unassigned_visits().is_empty());
        plan.validate().unwrap();
        assert_eq!(director.score(), calculate_score(plan, director.oracle()).unwrap());
        assert!(director.score().is_feasible());
    }

    #[test]
    fn collinear_visits_share_one_route_in_order() {
        let mut director = setup(&[(2, 0.0, 2.0, 1), (1, 0.0, 1.0, 1)], &[10]);
        construct(&mut director).unwrap();
        let plan = director.working_solution();
        let v = plan.find_vehicle(1).unwrap();
        let ids: Vec<_> = plan.route(v).map(|x| plan[x].id()).collect();
        assert!(ids == vec![1, 2] || ids == vec![2, 1]);
        assert_eq!(director.score().soft(), -4000);
    }

    #[test]
    fn nothing_to_do_without_vehicles() {
        let mut director = setup(&[(1, 0.0, 1.0, 1)], &[]);
        assert_eq!(construct(&mut director).unwrap(), ConstructionStats::default());
        assert_eq!(director.working_solution().unassigned_visits().len(), 1);
    }

    #[test]
    fn capacity_pushes_visits_onto_other_vehicles() {
        let mut director = setup(&[(1, 0.0, 1.0, 5), (2, 0.0, 1.1, 5)], &[5, 5]);
        construct(&mut director).unwrap();
        assert_eq!(director.score().hard(), 0);
        let plan = director.working_solution();
        for v in plan.vehicles_by_id() {
            assert_eq!(plan.route(v).count(), 1);
        }
    }
}

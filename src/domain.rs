//! Planning model for the live vehicle routing problem.
//!
//! # Overview
//!
//! - Geographic [`Location`]s, shared as `Arc<Location>`
//! - One optional [`Depot`] every route starts from and returns to
//! - [`Vehicle`]s with a mutable capacity, anchoring one chain each
//! - [`Visit`]s with a demand, linked into chains through [`Standstill`]s
//! - [`VehicleRoutePlan`] as the complete planning solution
//!
//! # Design
//!
//! Vehicles and visits live in slot arenas and refer to each other by
//! [`VehicleIdx`] / [`VisitIdx`]. A visit's `previous` standstill is the one
//! planning variable; `next` and `vehicle` are maintained alongside it by the
//! chain surgery methods, so `previous → next` is always a bijection.
//!
//! Entity identity is `Arc` pointer identity of the immutable fact
//! ([`Location`] for visits and the depot, [`VehicleInfo`] for vehicles).
//! Removal requires the caller to hand back the very instance it added.

use std::collections::{HashMap, HashSet};
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::error::{ConsistencyError, EntityKind, ValidationError};
use crate::score::HardSoftScore;

/// Average driving speed in km/h for travel time estimation.
pub const AVERAGE_SPEED_KMPH: f64 = 50.0;

/// Earth radius in meters for haversine calculation.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Location identifier. A visit is identified by its location's id.
pub type LocationId = i64;

/// Vehicle identifier.
pub type VehicleId = i64;

/// Stable arena index of a vehicle inside one [`VehicleRoutePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleIdx(pub usize);

/// Stable arena index of a visit inside one [`VehicleRoutePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitIdx(pub usize);

/// Something a vehicle can be standing still at: its own start (the depot,
/// through the vehicle) or a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Standstill {
    Vehicle(VehicleIdx),
    Visit(VisitIdx),
}

/// A geographic location with latitude and longitude.
///
/// # Examples
///
/// ```
/// use route_optimizer::domain::Location;
///
/// let philadelphia = Location::new(0, 39.9526, -75.1652).unwrap();
/// let new_york = Location::new(1, 40.7128, -74.0060).unwrap();
///
/// // Distance is approximately 130 km
/// let distance = philadelphia.distance_meters(&new_york);
/// assert!(distance > 120_000.0 && distance < 140_000.0);
///
/// assert!(Location::new(2, 91.0, 0.0).is_err());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    #[serde(default)]
    pub description: String,
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Location {}

impl std::hash::Hash for Location {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Location {
    /// Creates a location, rejecting coordinates outside the valid ranges.
    pub fn new(id: LocationId, latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            id,
            latitude,
            longitude,
            description: String::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Calculates the great-circle distance in meters using the haversine formula.
    pub fn distance_meters(&self, other: &Location) -> f64 {
        if self.latitude == other.latitude && self.longitude == other.longitude {
            return 0.0;
        }

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }

    /// Calculates travel time in seconds assuming [`AVERAGE_SPEED_KMPH`].
    pub fn travel_time_seconds(&self, other: &Location) -> i64 {
        let meters = self.distance_meters(other);
        (meters * 3.6 / AVERAGE_SPEED_KMPH).round() as i64
    }

    /// Polar angle of this location as seen from `origin`, in radians.
    ///
    /// Used only to order otherwise equivalent visits around the depot.
    pub fn angle_from(&self, origin: &Location) -> f64 {
        (self.latitude - origin.latitude).atan2(self.longitude - origin.longitude)
    }
}

/// Immutable identity of a vehicle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub id: VehicleId,
    pub name: String,
}

impl VehicleInfo {
    pub fn new(id: VehicleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// The single depot all routes start from and return to.
#[derive(Clone, Debug)]
pub struct Depot {
    location: Arc<Location>,
}

impl Depot {
    pub fn new(location: Arc<Location>) -> Self {
        Self { location }
    }

    #[inline]
    pub fn id(&self) -> LocationId {
        self.location.id
    }

    #[inline]
    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }
}

/// A delivery vehicle. Anchors the chain of visits that forms its route.
#[derive(Clone, Debug)]
pub struct Vehicle {
    info: Arc<VehicleInfo>,
    capacity: u32,
    first_visit: Option<VisitIdx>,
}

impl Vehicle {
    /// Creates a vehicle with an empty route.
    pub fn new(info: Arc<VehicleInfo>, capacity: u32) -> Self {
        Self {
            info,
            capacity,
            first_visit: None,
        }
    }

    #[inline]
    pub fn id(&self) -> VehicleId {
        self.info.id
    }

    #[inline]
    pub fn info(&self) -> &Arc<VehicleInfo> {
        &self.info
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// First visit of the route, or `None` for an idle vehicle.
    #[inline]
    pub fn first_visit(&self) -> Option<VisitIdx> {
        self.first_visit
    }
}

/// A customer visit with a demand.
#[derive(Clone, Debug)]
pub struct Visit {
    location: Arc<Location>,
    demand: u32,
    previous: Option<Standstill>,
    next: Option<VisitIdx>,
    vehicle: Option<VehicleIdx>,
}

impl Visit {
    /// Creates an unassigned visit.
    pub fn new(location: Arc<Location>, demand: u32) -> Self {
        Self {
            location,
            demand,
            previous: None,
            next: None,
            vehicle: None,
        }
    }

    #[inline]
    pub fn id(&self) -> LocationId {
        self.location.id
    }

    #[inline]
    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    #[inline]
    pub fn demand(&self) -> u32 {
        self.demand
    }

    /// The planning variable: the standstill this visit follows.
    #[inline]
    pub fn previous(&self) -> Option<Standstill> {
        self.previous
    }

    #[inline]
    pub fn next(&self) -> Option<VisitIdx> {
        self.next
    }

    /// The vehicle whose chain this visit belongs to.
    #[inline]
    pub fn vehicle(&self) -> Option<VehicleIdx> {
        self.vehicle
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.previous.is_some()
    }

    fn detach(&mut self) {
        self.previous = None;
        self.next = None;
        self.vehicle = None;
    }
}

/// The complete vehicle routing solution.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use route_optimizer::domain::{
///     Depot, Location, Standstill, Vehicle, VehicleInfo, VehicleRoutePlan, Visit,
/// };
///
/// let mut plan = VehicleRoutePlan::new();
/// plan.set_depot(Depot::new(Arc::new(Location::new(0, 0.0, 0.0).unwrap()))).unwrap();
/// let truck = plan
///     .add_vehicle(Vehicle::new(Arc::new(VehicleInfo::new(1, "Truck 1")), 10))
///     .unwrap();
/// let a = plan.add_visit(Visit::new(Arc::new(Location::new(1, 0.0, 0.1).unwrap()), 4)).unwrap();
/// let b = plan.add_visit(Visit::new(Arc::new(Location::new(2, 0.0, 0.2).unwrap()), 4)).unwrap();
///
/// plan.link_after(a, Standstill::Vehicle(truck)).unwrap();
/// plan.link_after(b, Standstill::Visit(a)).unwrap();
///
/// assert_eq!(plan.route(truck).collect::<Vec<_>>(), vec![a, b]);
/// assert_eq!(plan[b].vehicle(), Some(truck));
/// assert!(plan.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct VehicleRoutePlan {
    depot: Option<Depot>,
    vehicles: Arena<Vehicle>,
    visits: Arena<Visit>,
    vehicle_ids: HashMap<VehicleId, VehicleIdx>,
    visit_ids: HashMap<LocationId, VisitIdx>,
    score: HardSoftScore,
}

/// # Panics
///
/// Panics if no vehicle occupies the slot. Indices handed out by this plan
/// stay valid until that vehicle is removed; use [`VehicleRoutePlan::vehicle`]
/// for an index of unknown origin.
impl Index<VehicleIdx> for VehicleRoutePlan {
    type Output = Vehicle;

    fn index(&self, idx: VehicleIdx) -> &Vehicle {
        match self.vehicles.get(idx.0) {
            Some(vehicle) => vehicle,
            None => panic!("no vehicle at slot {}", idx.0),
        }
    }
}

/// # Panics
///
/// Panics if no visit occupies the slot; see [`VehicleRoutePlan::visit`].
impl Index<VisitIdx> for VehicleRoutePlan {
    type Output = Visit;

    fn index(&self, idx: VisitIdx) -> &Visit {
        match self.visits.get(idx.0) {
            Some(visit) => visit,
            None => panic!("no visit at slot {}", idx.0),
        }
    }
}

impl VehicleRoutePlan {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Facts
    // =========================================================================

    #[inline]
    pub fn depot(&self) -> Option<&Depot> {
        self.depot.as_ref()
    }

    pub fn set_depot(&mut self, depot: Depot) -> Result<(), ConsistencyError> {
        if let Some(existing) = &self.depot {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Depot,
                id: existing.id(),
            });
        }
        if self.visit_ids.contains_key(&depot.id()) {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Visit,
                id: depot.id(),
            });
        }
        self.depot = Some(depot);
        Ok(())
    }

    /// Removes the depot. Fails while any visit is still routed.
    pub fn remove_depot(&mut self, location: &Arc<Location>) -> Result<Depot, ConsistencyError> {
        let Some(depot) = &self.depot else {
            return Err(ConsistencyError::NotFound {
                kind: EntityKind::Depot,
                id: location.id,
            });
        };
        if depot.id() != location.id {
            return Err(ConsistencyError::NotFound {
                kind: EntityKind::Depot,
                id: location.id,
            });
        }
        if !Arc::ptr_eq(depot.location(), location) {
            return Err(ConsistencyError::Stale {
                kind: EntityKind::Depot,
                id: location.id,
            });
        }
        let routed = self.assigned_visit_count();
        if routed > 0 {
            return Err(ConsistencyError::DepotInUse(routed));
        }
        self.depot.take().ok_or(ConsistencyError::NotFound {
            kind: EntityKind::Depot,
            id: location.id,
        })
    }

    pub fn add_vehicle(&mut self, mut vehicle: Vehicle) -> Result<VehicleIdx, ConsistencyError> {
        if self.vehicle_ids.contains_key(&vehicle.id()) {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Vehicle,
                id: vehicle.id(),
            });
        }
        vehicle.first_visit = None;
        let id = vehicle.id();
        let idx = VehicleIdx(self.vehicles.insert(vehicle));
        self.vehicle_ids.insert(id, idx);
        Ok(idx)
    }

    /// Removes a vehicle after detaching its whole chain.
    ///
    /// Returns the vehicle and the visits that became unassigned, in route order.
    pub fn remove_vehicle(
        &mut self,
        info: &Arc<VehicleInfo>,
    ) -> Result<(Vehicle, Vec<VisitIdx>), ConsistencyError> {
        let idx = self.resolve_vehicle(info)?;
        let detached: Vec<VisitIdx> = self.route(idx).collect();
        for &visit in &detached {
            if let Some(v) = self.visits.get_mut(visit.0) {
                v.detach();
            }
        }
        self.vehicle_ids.remove(&info.id);
        let vehicle = self.vehicles.remove(idx.0).ok_or(ConsistencyError::NotFound {
            kind: EntityKind::Vehicle,
            id: info.id,
        })?;
        Ok((vehicle, detached))
    }

    pub fn set_capacity(
        &mut self,
        info: &Arc<VehicleInfo>,
        capacity: u32,
    ) -> Result<VehicleIdx, ConsistencyError> {
        let idx = self.resolve_vehicle(info)?;
        if let Some(vehicle) = self.vehicles.get_mut(idx.0) {
            vehicle.capacity = capacity;
        }
        Ok(idx)
    }

    /// Adds a visit as unassigned.
    pub fn add_visit(&mut self, mut visit: Visit) -> Result<VisitIdx, ConsistencyError> {
        let id = visit.id();
        if self.visit_ids.contains_key(&id) {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Visit,
                id,
            });
        }
        if self.depot.as_ref().is_some_and(|d| d.id() == id) {
            return Err(ConsistencyError::Duplicate {
                kind: EntityKind::Depot,
                id,
            });
        }
        visit.detach();
        let idx = VisitIdx(self.visits.insert(visit));
        self.visit_ids.insert(id, idx);
        Ok(idx)
    }

    /// Removes a visit, splicing its successor onto its predecessor.
    ///
    /// Returns the visit and the vehicle whose route changed, if any.
    pub fn remove_visit(
        &mut self,
        location: &Arc<Location>,
    ) -> Result<(Visit, Option<VehicleIdx>), ConsistencyError> {
        let idx = self.resolve_visit(location)?;
        let vehicle = self.unlink(idx)?;
        self.visit_ids.remove(&location.id);
        let visit = self.visits.remove(idx.0).ok_or(ConsistencyError::NotFound {
            kind: EntityKind::Visit,
            id: location.id,
        })?;
        Ok((visit, vehicle))
    }

    /// Looks up a vehicle by id and checks it is the same instance as `info`.
    pub fn resolve_vehicle(&self, info: &Arc<VehicleInfo>) -> Result<VehicleIdx, ConsistencyError> {
        let idx = self.find_vehicle(info.id).ok_or(ConsistencyError::NotFound {
            kind: EntityKind::Vehicle,
            id: info.id,
        })?;
        if !Arc::ptr_eq(self[idx].info(), info) {
            return Err(ConsistencyError::Stale {
                kind: EntityKind::Vehicle,
                id: info.id,
            });
        }
        Ok(idx)
    }

    /// Looks up a visit by id and checks it is the same instance as `location`.
    pub fn resolve_visit(&self, location: &Arc<Location>) -> Result<VisitIdx, ConsistencyError> {
        let idx = self.find_visit(location.id).ok_or(ConsistencyError::NotFound {
            kind: EntityKind::Visit,
            id: location.id,
        })?;
        if !Arc::ptr_eq(self[idx].location(), location) {
            return Err(ConsistencyError::Stale {
                kind: EntityKind::Visit,
                id: location.id,
            });
        }
        Ok(idx)
    }

    /// Drops every visit; vehicles keep existing with empty routes.
    pub fn clear_visits(&mut self) {
        self.visits.clear();
        self.visit_ids.clear();
        let slots: Vec<usize> = self.vehicles.iter().map(|(i, _)| i).collect();
        for idx in slots {
            if let Some(vehicle) = self.vehicles.get_mut(idx) {
                vehicle.first_visit = None;
            }
        }
    }

    /// Drops every vehicle; all visits become unassigned.
    pub fn clear_vehicles(&mut self) {
        let visits: Vec<usize> = self.visits.iter().map(|(i, _)| i).collect();
        for idx in visits {
            if let Some(visit) = self.visits.get_mut(idx) {
                visit.detach();
            }
        }
        self.vehicles.clear();
        self.vehicle_ids.clear();
    }

    // =========================================================================
    // Read access
    // =========================================================================

    #[inline]
    pub fn find_vehicle(&self, id: VehicleId) -> Option<VehicleIdx> {
        self.vehicle_ids.get(&id).copied()
    }

    #[inline]
    pub fn find_visit(&self, id: LocationId) -> Option<VisitIdx> {
        self.visit_ids.get(&id).copied()
    }

    #[inline]
    pub fn vehicle(&self, idx: VehicleIdx) -> Option<&Vehicle> {
        self.vehicles.get(idx.0)
    }

    #[inline]
    pub fn visit(&self, idx: VisitIdx) -> Option<&Visit> {
        self.visits.get(idx.0)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = (VehicleIdx, &Vehicle)> {
        self.vehicles.iter().map(|(i, v)| (VehicleIdx(i), v))
    }

    pub fn visits(&self) -> impl Iterator<Item = (VisitIdx, &Visit)> {
        self.visits.iter().map(|(i, v)| (VisitIdx(i), v))
    }

    #[inline]
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    #[inline]
    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    /// Upper bound (exclusive) of every live vehicle slot index.
    #[inline]
    pub fn vehicle_slots(&self) -> usize {
        self.vehicles.capacity()
    }

    /// Vehicle indices ordered by vehicle id.
    pub fn vehicles_by_id(&self) -> Vec<VehicleIdx> {
        let mut order: Vec<(VehicleId, VehicleIdx)> =
            self.vehicles().map(|(idx, v)| (v.id(), idx)).collect();
        order.sort_unstable();
        order.into_iter().map(|(_, idx)| idx).collect()
    }

    /// Unassigned visits ordered by visit id.
    pub fn unassigned_visits(&self) -> Vec<VisitIdx> {
        let mut order: Vec<(LocationId, VisitIdx)> = self
            .visits()
            .filter(|(_, v)| !v.is_assigned())
            .map(|(idx, v)| (v.id(), idx))
            .collect();
        order.sort_unstable();
        order.into_iter().map(|(_, idx)| idx).collect()
    }

    pub fn assigned_visit_count(&self) -> usize {
        self.visits().filter(|(_, v)| v.is_assigned()).count()
    }

    /// Walks a vehicle's chain from its first visit.
    pub fn route(&self, vehicle: VehicleIdx) -> RouteIter<'_> {
        RouteIter {
            plan: self,
            next: self.vehicle(vehicle).and_then(Vehicle::first_visit),
        }
    }

    /// Sum of the demands routed on `vehicle`.
    pub fn route_demand(&self, vehicle: VehicleIdx) -> u64 {
        self.route(vehicle).map(|v| u64::from(self[v].demand())).sum()
    }

    /// The visit following a standstill.
    #[inline]
    pub fn next_of(&self, standstill: Standstill) -> Option<VisitIdx> {
        match standstill {
            Standstill::Vehicle(idx) => self.vehicle(idx).and_then(Vehicle::first_visit),
            Standstill::Visit(idx) => self.visit(idx).and_then(Visit::next),
        }
    }

    /// The vehicle whose chain contains `standstill`.
    #[inline]
    pub fn vehicle_of(&self, standstill: Standstill) -> Option<VehicleIdx> {
        match standstill {
            Standstill::Vehicle(idx) => self.vehicles.contains(idx.0).then_some(idx),
            Standstill::Visit(idx) => self.visit(idx).and_then(Visit::vehicle),
        }
    }

    /// Where a vehicle physically is at a standstill: the depot for the
    /// vehicle itself, the visit's location otherwise.
    #[inline]
    pub fn location_of(&self, standstill: Standstill) -> Option<LocationId> {
        match standstill {
            Standstill::Vehicle(_) => self.depot.as_ref().map(Depot::id),
            Standstill::Visit(idx) => self.visit(idx).map(Visit::id),
        }
    }

    #[inline]
    pub fn score(&self) -> HardSoftScore {
        self.score
    }

    #[inline]
    pub fn set_score(&mut self, score: HardSoftScore) {
        self.score = score;
    }

    // =========================================================================
    // Chain surgery
    // =========================================================================

    fn set_next(&mut self, standstill: Standstill, next: Option<VisitIdx>) {
        match standstill {
            Standstill::Vehicle(idx) => {
                if let Some(vehicle) = self.vehicles.get_mut(idx.0) {
                    vehicle.first_visit = next;
                }
            }
            Standstill::Visit(idx) => {
                if let Some(visit) = self.visits.get_mut(idx.0) {
                    visit.next = next;
                }
            }
        }
    }

    fn set_previous(&mut self, visit: VisitIdx, previous: Standstill) {
        if let Some(v) = self.visits.get_mut(visit.0) {
            v.previous = Some(previous);
        }
    }

    fn checked_visit(&self, idx: VisitIdx) -> Result<&Visit, ConsistencyError> {
        self.visit(idx).ok_or(ConsistencyError::BrokenChain(format!(
            "no visit at slot {}",
            idx.0
        )))
    }

    /// Inserts an unassigned visit right after `anchor`.
    pub fn link_after(&mut self, visit: VisitIdx, anchor: Standstill) -> Result<(), ConsistencyError> {
        let id = self.checked_visit(visit)?.id();
        if self.depot.is_none() {
            return Err(ConsistencyError::NoDepot(id));
        }
        if self[visit].is_assigned() || anchor == Standstill::Visit(visit) {
            return Err(ConsistencyError::AlreadyAssigned(id));
        }
        let vehicle = self.vehicle_of(anchor).ok_or_else(|| {
            ConsistencyError::BrokenChain(format!("anchor {anchor:?} is not part of any route"))
        })?;

        let next = self.next_of(anchor);
        self.set_next(anchor, Some(visit));
        if let Some(next) = next {
            self.set_previous(next, Standstill::Visit(visit));
        }
        if let Some(v) = self.visits.get_mut(visit.0) {
            v.previous = Some(anchor);
            v.next = next;
            v.vehicle = Some(vehicle);
        }
        Ok(())
    }

    /// Detaches a visit from its chain, reconnecting its neighbours.
    ///
    /// Returns the vehicle the visit was routed on; unassigned visits are a no-op.
    pub fn unlink(&mut self, visit: VisitIdx) -> Result<Option<VehicleIdx>, ConsistencyError> {
        let v = self.checked_visit(visit)?;
        let Some(previous) = v.previous else {
            return Ok(None);
        };
        let next = v.next;
        let vehicle = v.vehicle;

        self.set_next(previous, next);
        if let Some(next) = next {
            self.set_previous(next, previous);
        }
        if let Some(v) = self.visits.get_mut(visit.0) {
            v.detach();
        }
        Ok(vehicle)
    }

    /// Replaces every route with the routes of `other`, matched by instance.
    ///
    /// Vehicles and visits that `other` lacks, or holds under another
    /// instance with the same id, end up unassigned. Returns how many visits
    /// were routed.
    pub fn adopt_routes(&mut self, other: &VehicleRoutePlan) -> Result<usize, ConsistencyError> {
        let routed: Vec<VisitIdx> = self
            .visits()
            .filter(|(_, v)| v.is_assigned())
            .map(|(idx, _)| idx)
            .collect();
        for visit in routed {
            self.unlink(visit)?;
        }

        let mut adopted = 0;
        for (theirs, vehicle) in other.vehicles() {
            let Some(ours) = self
                .find_vehicle(vehicle.id())
                .filter(|&idx| Arc::ptr_eq(self[idx].info(), vehicle.info()))
            else {
                continue;
            };
            let mut anchor = Standstill::Vehicle(ours);
            for visit in other.route(theirs).map(|idx| &other[idx]) {
                let Some(own) = self
                    .find_visit(visit.id())
                    .filter(|&idx| Arc::ptr_eq(self[idx].location(), visit.location()))
                else {
                    continue;
                };
                self.link_after(own, anchor)?;
                anchor = Standstill::Visit(own);
                adopted += 1;
            }
        }
        Ok(adopted)
    }

    /// Exchanges the positions of two routed visits.
    pub fn swap_visits(&mut self, a: VisitIdx, b: VisitIdx) -> Result<(), ConsistencyError> {
        if a == b {
            return Ok(());
        }
        let pa = self.routed_previous(a)?;
        let pb = self.routed_previous(b)?;

        if pb == Standstill::Visit(a) {
            self.unlink(b)?;
            self.link_after(b, pa)
        } else if pa == Standstill::Visit(b) {
            self.unlink(a)?;
            self.link_after(a, pb)
        } else {
            self.unlink(a)?;
            self.unlink(b)?;
            self.link_after(b, pa)?;
            self.link_after(a, pb)
        }
    }

    /// Reverses the sub-chain `first..=last` of one route.
    pub fn reverse_segment(&mut self, first: VisitIdx, last: VisitIdx) -> Result<(), ConsistencyError> {
        if first == last {
            return Ok(());
        }
        let previous = self.routed_previous(first)?;
        let segment = self.segment(first, last)?;
        let after = self[last].next();

        self.set_next(previous, Some(last));
        self.set_previous(last, previous);
        for pair in segment.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if let Some(v) = self.visits.get_mut(later.0) {
                v.next = Some(earlier);
            }
            self.set_previous(earlier, Standstill::Visit(later));
        }
        if let Some(v) = self.visits.get_mut(first.0) {
            v.next = after;
        }
        if let Some(after) = after {
            self.set_previous(after, Standstill::Visit(first));
        }
        Ok(())
    }

    /// The visits `first..=last` in route order.
    pub fn segment(&self, first: VisitIdx, last: VisitIdx) -> Result<Vec<VisitIdx>, ConsistencyError> {
        let mut segment = vec![first];
        let mut current = first;
        while current != last {
            current = self.checked_visit(current)?.next().ok_or_else(|| {
                ConsistencyError::BrokenChain(format!(
                    "visit {} does not follow visit {} on its route",
                    self.visit(last).map_or(-1, Visit::id),
                    self.visit(first).map_or(-1, Visit::id),
                ))
            })?;
            segment.push(current);
        }
        Ok(segment)
    }

    fn routed_previous(&self, visit: VisitIdx) -> Result<Standstill, ConsistencyError> {
        let v = self.checked_visit(visit)?;
        v.previous()
            .ok_or_else(|| ConsistencyError::BrokenChain(format!("visit {} is not routed", v.id())))
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Checks every chain invariant of the plan.
    ///
    /// - `previous → next` is a bijection
    /// - every chain is anchored at exactly one vehicle, without cycles or duplicates
    /// - each visit's `vehicle` matches the vehicle reached by walking back
    /// - nothing is routed without a depot
    /// - the id maps agree with the arenas
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        let broken = |msg: String| Err(ConsistencyError::BrokenChain(msg));
        let mut seen: HashSet<VisitIdx> = HashSet::new();

        for (vehicle_idx, vehicle) in self.vehicles() {
            if self.vehicle_ids.get(&vehicle.id()) != Some(&vehicle_idx) {
                return broken(format!("vehicle {} is not indexed by id", vehicle.id()));
            }
            let mut expected_previous = Standstill::Vehicle(vehicle_idx);
            let mut current = vehicle.first_visit();
            while let Some(idx) = current {
                let Some(visit) = self.visit(idx) else {
                    return broken(format!("vehicle {} links a missing visit", vehicle.id()));
                };
                if !seen.insert(idx) {
                    return broken(format!("visit {} appears twice in the chains", visit.id()));
                }
                if visit.previous() != Some(expected_previous) {
                    return broken(format!("visit {} has an inconsistent previous link", visit.id()));
                }
                if visit.vehicle() != Some(vehicle_idx) {
                    return broken(format!(
                        "visit {} is on vehicle {} but records another vehicle",
                        visit.id(),
                        vehicle.id()
                    ));
                }
                expected_previous = Standstill::Visit(idx);
                current = visit.next();
            }
        }

        for (idx, visit) in self.visits() {
            if self.visit_ids.get(&visit.id()) != Some(&idx) {
                return broken(format!("visit {} is not indexed by id", visit.id()));
            }
            match visit.previous() {
                Some(_) if !seen.contains(&idx) => {
                    return broken(format!("visit {} is not reachable from any vehicle", visit.id()));
                }
                None if visit.next().is_some() || visit.vehicle().is_some() => {
                    return broken(format!("unassigned visit {} still carries links", visit.id()));
                }
                _ => {}
            }
        }

        if self.depot.is_none() {
            if let Some(&idx) = seen.iter().next() {
                return Err(ConsistencyError::NoDepot(self[idx].id()));
            }
        }
        if self.vehicle_ids.len() != self.vehicles.len() || self.visit_ids.len() != self.visits.len() {
            return broken("id maps and arenas disagree in size".to_owned());
        }
        Ok(())
    }
}

/// Iterator over a vehicle's visits, in route order.
pub struct RouteIter<'a> {
    plan: &'a VehicleRoutePlan,
    next: Option<VisitIdx>,
}

impl Iterator for RouteIter<'_> {
    type Item = VisitIdx;

    fn next(&mut self) -> Option<VisitIdx> {
        let current = self.next?;
        self.next = self.plan.visit(current).and_then(Visit::next);
        Some(current)
    }
}

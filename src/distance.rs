//! Travel cost between locations.
//!
//! The solver only ever sees a [`DistanceOracle`]. [`DistanceMatrix`] is the
//! in-process adapter: it precomputes every pair with a [`DistanceCalculator`]
//! as locations are registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{Location, LocationId};
use crate::error::LookupError;

/// Answers travel-cost queries between known locations.
///
/// Must be defined for every pair of locations present in a solution.
/// Implementations are queried concurrently by the solver thread and by
/// direct publishes, so they must be `Send + Sync`.
pub trait DistanceOracle: Send + Sync {
    fn distance(&self, from: LocationId, to: LocationId) -> Result<i64, LookupError>;
}

/// Computes the cost of one directed leg.
pub trait DistanceCalculator: Send + Sync {
    fn travel_cost(&self, from: &Location, to: &Location) -> i64;
}

impl<F> DistanceCalculator for F
where
    F: Fn(&Location, &Location) -> i64 + Send + Sync,
{
    fn travel_cost(&self, from: &Location, to: &Location) -> i64 {
        self(from, to)
    }
}

/// Straight-line driving time in seconds at the average speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineTravelTime;

impl DistanceCalculator for HaversineTravelTime {
    fn travel_cost(&self, from: &Location, to: &Location) -> i64 {
        from.travel_time_seconds(to)
    }
}

#[derive(Default)]
struct MatrixInner {
    locations: HashMap<LocationId, Arc<Location>>,
    rows: HashMap<LocationId, HashMap<LocationId, i64>>,
}

/// Precomputed all-pairs cost matrix.
///
/// Rows are only ever added. A location stays answerable after it leaves the
/// plan, so a solver still holding an older working copy never misses. The
/// price is memory: the matrix holds a cell for every pair of ids ever
/// registered, so a long session with many short-lived locations grows
/// quadratically in that count.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use route_optimizer::distance::{DistanceMatrix, DistanceOracle};
/// use route_optimizer::domain::Location;
///
/// let matrix = DistanceMatrix::new(|a: &Location, b: &Location| (a.id - b.id).abs() * 10);
/// matrix.add_location(Arc::new(Location::new(1, 0.0, 0.0).unwrap()));
/// matrix.add_location(Arc::new(Location::new(4, 0.0, 0.0).unwrap()));
///
/// assert_eq!(matrix.distance(1, 4), Ok(30));
/// assert_eq!(matrix.distance(4, 4), Ok(0));
/// assert!(matrix.distance(1, 9).is_err());
/// ```
pub struct DistanceMatrix<C = HaversineTravelTime> {
    calculator: C,
    inner: RwLock<MatrixInner>,
}

impl Default for DistanceMatrix<HaversineTravelTime> {
    fn default() -> Self {
        Self::new(HaversineTravelTime)
    }
}

impl<C> fmt::Debug for DistanceMatrix<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceMatrix")
            .field("locations", &self.inner.read().locations.len())
            .finish()
    }
}

impl<C: DistanceCalculator> DistanceMatrix<C> {
    pub fn new(calculator: C) -> Self {
        Self {
            calculator,
            inner: RwLock::new(MatrixInner::default()),
        }
    }

    /// Registers a location, computing its row and column in parallel.
    ///
    /// Registering an id twice keeps the first instance.
    pub fn add_location(&self, location: Arc<Location>) {
        let mut inner = self.inner.write();
        if inner.locations.contains_key(&location.id) {
            return;
        }

        let legs: Vec<(LocationId, i64, i64)> = inner
            .locations
            .values()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|other| {
                (
                    other.id,
                    self.calculator.travel_cost(&location, other),
                    self.calculator.travel_cost(other, &location),
                )
            })
            .collect();

        let mut row = HashMap::with_capacity(legs.len() + 1);
        row.insert(location.id, 0);
        for &(other, outbound, inbound) in &legs {
            row.insert(other, outbound);
            if let Some(other_row) = inner.rows.get_mut(&other) {
                other_row.insert(location.id, inbound);
            }
        }
        inner.rows.insert(location.id, row);
        inner.locations.insert(location.id, location);

        debug!(locations = inner.locations.len(), "Distance matrix extended");
    }

    /// The instance registered under `id`.
    pub fn location(&self, id: LocationId) -> Option<Arc<Location>> {
        self.inner.read().locations.get(&id).cloned()
    }

    pub fn contains(&self, id: LocationId) -> bool {
        self.inner.read().locations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: DistanceCalculator> DistanceOracle for DistanceMatrix<C> {
    fn distance(&self, from: LocationId, to: LocationId) -> Result<i64, LookupError> {
        if from == to {
            return Ok(0);
        }
        self.inner
            .read()
            .rows
            .get(&from)
            .and_then(|row| row.get(&to))
            .copied()
            .ok_or(LookupError::UnknownPair { from, to })
    }
}

impl<T: DistanceOracle + ?Sized> DistanceOracle for Arc<T> {
    fn distance(&self, from: LocationId, to: LocationId) -> Result<i64, LookupError> {
        (**self).distance(from, to)
    }
}

//! Error taxonomy for the planning model, the solver and the optimizer.
//!
//! Errors are split by who is at fault:
//!
//! - [`ValidationError`]: malformed input at a public boundary.
//! - [`ConsistencyError`]: the caller referenced an entity that is missing,
//!   duplicated, or present but not the same instance.
//! - [`LookupError`]: the distance oracle has no answer for a pair.
//! - [`FactChangeError`]: a queued fact change could not be applied to the
//!   engine's working copy.
//! - [`SolverError`]: lifecycle misuse, or a previous engine failure
//!   surfacing on a new call.
//! - [`OptimizerError`]: everything the orchestrator can report.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::LocationId;

/// Entity kinds named in consistency errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Depot,
    Vehicle,
    Visit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Depot => "depot",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Visit => "visit",
        })
    }
}

/// Malformed input to a public operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("vehicle {vehicle} capacity must be non-negative, got {capacity}")]
    NegativeCapacity { vehicle: i64, capacity: i64 },
    #[error("visit {visit} demand must be non-negative, got {demand}")]
    NegativeDemand { visit: LocationId, demand: i64 },
    #[error("{0} does not fit in a 32-bit quantity")]
    QuantityOverflow(i64),
}

/// The caller referenced an entity that is not (or not exactly) in the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("{kind} {id} is not present")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("{kind} {id} is present but is a different instance")]
    Stale { kind: EntityKind, id: i64 },
    #[error("{kind} {id} is already present")]
    Duplicate { kind: EntityKind, id: i64 },
    #[error("depot cannot be removed while {0} visit(s) are routed")]
    DepotInUse(usize),
    #[error("visit {0} cannot be routed without a depot")]
    NoDepot(LocationId),
    #[error("visit {0} is already assigned")]
    AlreadyAssigned(LocationId),
    #[error("broken chain: {0}")]
    BrokenChain(String),
}

/// A distance lookup or working-copy lookup missed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no distance known from location {from} to location {to}")]
    UnknownPair { from: LocationId, to: LocationId },
    #[error("location {0} is not known to the distance oracle")]
    UnknownLocation(LocationId),
}

/// A fact change that could not be applied to the working copy.
///
/// Aborts only the offending change; the engine keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactChangeError {
    #[error("working copy mismatch: {kind} {id} differs from the instance recorded at submission")]
    WorkingCopyMismatch { kind: EntityKind, id: i64 },
    #[error(transparent)]
    Consistency(ConsistencyError),
}

impl From<ConsistencyError> for FactChangeError {
    fn from(e: ConsistencyError) -> Self {
        match e {
            ConsistencyError::Stale { kind, id } => FactChangeError::WorkingCopyMismatch { kind, id },
            other => FactChangeError::Consistency(other),
        }
    }
}

/// Why an engine run ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFailure {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error("solver thread panicked: {0}")]
    Panicked(String),
    #[error("solver thread could not be spawned: {0}")]
    Spawn(String),
}

/// Solver lifecycle errors.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("solver is already running")]
    AlreadyRunning,
    #[error("solver is not running")]
    NotRunning,
    #[error("solver died: {0}")]
    Died(#[source] Arc<EngineFailure>),
}

impl SolverError {
    /// The captured failure behind a [`SolverError::Died`].
    pub fn cause(&self) -> Option<&EngineFailure> {
        match self {
            SolverError::Died(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Everything the route optimizer can report to its caller.
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("depot cannot be removed while {visits} visit(s) exist")]
    DepotRemoval { visits: usize },
}

impl From<EngineFailure> for OptimizerError {
    fn from(e: EngineFailure) -> Self {
        match e {
            EngineFailure::Lookup(e) => OptimizerError::Lookup(e),
            EngineFailure::Consistency(e) => OptimizerError::Consistency(e),
            other => OptimizerError::Solver(SolverError::Died(Arc::new(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_consistency_error_becomes_working_copy_mismatch() {
        let err: FactChangeError = ConsistencyError::Stale {
            kind: EntityKind::Visit,
            id: 7,
        }
        .into();
        assert_eq!(
            err,
            FactChangeError::WorkingCopyMismatch {
                kind: EntityKind::Visit,
                id: 7
            }
        );
    }

    #[test]
    fn died_error_keeps_the_cause_verbatim() {
        let cause = Arc::new(EngineFailure::Lookup(LookupError::UnknownPair { from: 1, to: 2 }));
        let err = SolverError::Died(cause.clone());
        assert_eq!(err.cause(), Some(cause.as_ref()));
        assert_eq!(
            err.to_string(),
            "solver died: no distance known from location 1 to location 2"
        );
    }
}

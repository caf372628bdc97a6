#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use route_optimizer::distance::{DistanceMatrix, DistanceOracle};
use route_optimizer::domain::{Location, LocationId};
use route_optimizer::optimizer::{RouteOptimizer, RoutePublisher};
use route_optimizer::snapshot::RouteSnapshot;
use route_optimizer::solver::{SolverConfig, SolverStatus};

pub const WAIT: Duration = Duration::from_secs(10);

/// Every id in `0..KNOWN` has a distance; anything else misses.
pub const KNOWN: LocationId = 10;

#[derive(Default)]
struct Recorded {
    snapshots: Vec<RouteSnapshot>,
    failures: Vec<String>,
}

/// Publisher that records everything and lets tests wait for a state.
#[derive(Default)]
pub struct RecordingPublisher {
    recorded: Mutex<Recorded>,
    changed: Condvar,
}

impl RecordingPublisher {
    pub fn snapshots(&self) -> Vec<RouteSnapshot> {
        self.recorded.lock().snapshots.clone()
    }

    pub fn count(&self) -> usize {
        self.recorded.lock().snapshots.len()
    }

    pub fn last(&self) -> Option<RouteSnapshot> {
        self.recorded.lock().snapshots.last().cloned()
    }

    pub fn failures(&self) -> Vec<String> {
        self.recorded.lock().failures.clone()
    }

    /// Waits until the latest snapshot satisfies `predicate`.
    pub fn wait_for(&self, predicate: impl Fn(&RouteSnapshot) -> bool) -> RouteSnapshot {
        let deadline = Instant::now() + WAIT;
        let mut recorded = self.recorded.lock();
        loop {
            if let Some(last) = recorded.snapshots.last().filter(|s| predicate(s)) {
                return last.clone();
            }
            if self.changed.wait_until(&mut recorded, deadline).timed_out() {
                panic!("no matching snapshot, last was {:?}", recorded.snapshots.last());
            }
        }
    }

    /// Waits until something was published after the first `seen` snapshots
    /// and the latest one satisfies `predicate`.
    pub fn wait_for_after(&self, seen: usize, predicate: impl Fn(&RouteSnapshot) -> bool) -> RouteSnapshot {
        self.wait_for_recorded(|recorded| recorded.len() > seen && recorded.last().is_some_and(|s| predicate(s)))
    }

    fn wait_for_recorded(&self, done: impl Fn(&[RouteSnapshot]) -> bool) -> RouteSnapshot {
        let deadline = Instant::now() + WAIT;
        let mut recorded = self.recorded.lock();
        loop {
            if done(&recorded.snapshots) {
                if let Some(last) = recorded.snapshots.last() {
                    return last.clone();
                }
            }
            if self.changed.wait_until(&mut recorded, deadline).timed_out() {
                panic!("no matching snapshot, last was {:?}", recorded.snapshots.last());
            }
        }
    }

    /// Waits until at least one failure has been published.
    pub fn wait_for_failure(&self) -> String {
        let deadline = Instant::now() + WAIT;
        let mut recorded = self.recorded.lock();
        loop {
            if let Some(failure) = recorded.failures.first() {
                return failure.clone();
            }
            if self.changed.wait_until(&mut recorded, deadline).timed_out() {
                panic!("no failure published");
            }
        }
    }
}

impl RoutePublisher for RecordingPublisher {
    fn publish(&self, snapshot: RouteSnapshot) {
        self.recorded.lock().snapshots.push(snapshot);
        self.changed.notify_all();
    }

    fn publish_failure(&self, cause: &str) {
        self.recorded.lock().failures.push(cause.to_owned());
        self.changed.notify_all();
    }
}

pub fn location(id: LocationId) -> Arc<Location> {
    Arc::new(Location::new(id, 0.0, id as f64 / 100.0).unwrap())
}

/// Ten times the id difference, so routes are easy to compute by hand.
pub fn id_distance(a: &Location, b: &Location) -> i64 {
    (a.id - b.id).abs() * 10
}

pub fn oracle() -> Arc<dyn DistanceOracle> {
    let matrix = DistanceMatrix::new(id_distance);
    for id in 0..KNOWN {
        matrix.add_location(location(id));
    }
    Arc::new(matrix)
}

pub fn optimizer(config: SolverConfig) -> (RouteOptimizer, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let optimizer = RouteOptimizer::new(config, oracle(), publisher.clone());
    (optimizer, publisher)
}

pub fn config() -> SolverConfig {
    SolverConfig::default().with_time_limit(Some(Duration::from_secs(5)))
}

/// Waits until the solver reports `status`.
pub fn wait_for_status(optimizer: &RouteOptimizer, status: SolverStatus) {
    let deadline = Instant::now() + WAIT;
    while optimizer.solver_status() != status {
        assert!(Instant::now() < deadline, "solver never became {status:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

//! Solver lifecycle for live routing.
//!
//! [`SolverManager`] runs one engine thread at a time. The engine builds a
//! first solution with cheapest insertion, then improves it with local
//! search. While it runs, [`FactChange`]s queue up and are applied between
//! steps; every settled improvement is handed to a [`SolverListener`] on the
//! engine thread.
//!
//! ```text
//! Idle ─start→ Starting ─engine up→ Running ─stop→ Stopping ─joined→ Idle
//!                                      └──────── engine error ────→ Failed
//! ```
//!
//! Without daemon mode the engine leaves `Running` by itself once its budget
//! is spent and the queue is empty. From then on changes are refused, and the
//! final solution waits in the manager until [`SolverManager::stop_solver`]
//! collects it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::console::{self, PhaseTimer};
use crate::construction::construct;
use crate::director::ScoreDirector;
use crate::distance::DistanceOracle;
use crate::domain::VehicleRoutePlan;
use crate::error::{EngineFailure, FactChangeError, SolverError};
use crate::fact_change::FactChange;
use crate::local_search::{LocalSearch, StepOutcome, DEFAULT_PLATEAU_TOLERANCE};

/// Default solving time per fact-change batch: 30 seconds.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 30;

/// Solver configuration with termination criteria.
///
/// Limits restart with every applied fact-change batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Stop improving after this duration.
    pub time_limit: Option<Duration>,
    /// Stop improving after this many steps.
    pub step_limit: Option<u64>,
    /// Non-improving steps allowed past the last best.
    pub plateau_tolerance: usize,
    /// Idle on termination instead of exiting, waiting for fact changes.
    pub daemon: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(DEFAULT_TIME_LIMIT_SECS)),
            step_limit: None,
            plateau_tolerance: DEFAULT_PLATEAU_TOLERANCE,
            daemon: true,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn with_plateau_tolerance(mut self, tolerance: usize) -> Self {
        self.plateau_tolerance = tolerance;
        self
    }

    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }
}

/// Lifecycle state of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl SolverStatus {
    /// Returns the status as a SCREAMING_SNAKE_CASE string for API responses.
    ///
    /// ```
    /// use route_optimizer::solver::SolverStatus;
    ///
    /// assert_eq!(SolverStatus::Idle.as_str(), "IDLE");
    /// assert_eq!(SolverStatus::Running.as_str(), "RUNNING");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Idle => "IDLE",
            SolverStatus::Starting => "STARTING",
            SolverStatus::Running => "RUNNING",
            SolverStatus::Stopping => "STOPPING",
            SolverStatus::Failed => "FAILED",
        }
    }
}

/// Receives engine events.
///
/// Every method runs synchronously on the engine thread, so it must return
/// quickly; the search does not advance while a callback runs.
pub trait SolverListener: Send + Sync {
    /// A new best solution, with every queued fact change applied.
    fn best_solution_changed(&self, solution: &VehicleRoutePlan);

    /// The engine died. Fires once per failed run.
    fn solver_failed(&self, _failure: &EngineFailure) {}

    /// One fact change could not be applied; the run continues without it.
    fn fact_change_failed(&self, _change: &FactChange, _error: &FactChangeError) {}
}

struct SharedState {
    status: SolverStatus,
    queue: VecDeque<FactChange>,
    failure: Option<Arc<EngineFailure>>,
    outcome: Option<VehicleRoutePlan>,
}

struct Shared {
    state: Mutex<SharedState>,
    wake: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn set_status(&self, status: SolverStatus) {
        self.state.lock().status = status;
        self.wake.notify_all();
    }
}

/// Runs the engine thread and owns its lifecycle.
pub struct SolverManager {
    config: SolverConfig,
    oracle: Arc<dyn DistanceOracle>,
    listener: Arc<dyn SolverListener>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SolverManager {
    pub fn new(
        config: SolverConfig,
        oracle: Arc<dyn DistanceOracle>,
        listener: Arc<dyn SolverListener>,
    ) -> Self {
        Self {
            config,
            oracle,
            listener,
            shared: Arc::new(Shared {
                state: Mutex::new(SharedState {
                    status: SolverStatus::Idle,
                    queue: VecDeque::new(),
                    failure: None,
                    outcome: None,
                }),
                wake: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn status(&self) -> SolverStatus {
        self.shared.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == SolverStatus::Running
    }

    /// Starts solving `plan` on a new engine thread.
    ///
    /// Blocks until the engine reports it is running. Fails with
    /// [`SolverError::AlreadyRunning`] unless the solver is idle or failed.
    pub fn start_solver(&self, plan: VehicleRoutePlan) -> Result<(), SolverError> {
        let mut handle = self.handle.lock();
        {
            let mut state = self.shared.state.lock();
            match state.status {
                SolverStatus::Idle | SolverStatus::Failed => {}
                _ => return Err(SolverError::AlreadyRunning),
            }
            state.status = SolverStatus::Starting;
            state.queue.clear();
            state.failure = None;
            state.outcome = None;
        }
        if let Some(previous) = handle.take() {
            let _ = previous.join();
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let engine = Engine {
            run_id: Uuid::new_v4(),
            config: self.config.clone(),
            oracle: self.oracle.clone(),
            listener: self.listener.clone(),
            shared: self.shared.clone(),
        };
        let spawned = thread::Builder::new()
            .name("route-solver".to_owned())
            .spawn(move || engine.run(plan));
        let join_handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                let failure = Arc::new(EngineFailure::Spawn(e.to_string()));
                let mut state = self.shared.state.lock();
                state.status = SolverStatus::Idle;
                return Err(SolverError::Died(failure));
            }
        };

        let mut state = self.shared.state.lock();
        while state.status == SolverStatus::Starting {
            self.shared.wake.wait(&mut state);
        }
        *handle = Some(join_handle);
        Ok(())
    }

    /// Stops the engine and waits for its thread to exit.
    ///
    /// Returns the final best solution, or `None` when nothing was running.
    /// A captured engine failure is returned as [`SolverError::Died`] and
    /// keeps being returned until the next successful start.
    pub fn stop_solver(&self) -> Result<Option<VehicleRoutePlan>, SolverError> {
        let mut handle = self.handle.lock();
        {
            let mut state = self.shared.state.lock();
            match state.status {
                SolverStatus::Idle => {
                    let outcome = state.outcome.take();
                    drop(state);
                    if let Some(h) = handle.take() {
                        let _ = h.join();
                    }
                    return Ok(outcome);
                }
                SolverStatus::Failed => {
                    let failure = state.failure.clone();
                    drop(state);
                    if let Some(h) = handle.take() {
                        let _ = h.join();
                    }
                    return Err(died(failure));
                }
                _ => state.status = SolverStatus::Stopping,
            }
        }

        self.shared.stop.store(true, Ordering::SeqCst);
        {
            let _state = self.shared.state.lock();
            self.shared.wake.notify_all();
        }
        if let Some(h) = handle.take() {
            if h.join().is_err() {
                warn!("Solver thread ended with an uncaught panic");
            }
        }

        let mut state = self.shared.state.lock();
        if state.status == SolverStatus::Failed {
            return Err(died(state.failure.clone()));
        }
        state.status = SolverStatus::Idle;
        Ok(state.outcome.take())
    }

    /// Queues one fact change.
    pub fn add_fact_change(&self, change: FactChange) -> Result<(), SolverError> {
        self.add_fact_changes(vec![change])
    }

    /// Queues fact changes, preserving their order. Never blocks on the engine.
    pub fn add_fact_changes(&self, changes: Vec<FactChange>) -> Result<(), SolverError> {
        let mut state = self.shared.state.lock();
        match state.status {
            SolverStatus::Running => {
                state.queue.extend(changes);
                self.shared.wake.notify_all();
                Ok(())
            }
            SolverStatus::Failed => Err(died(state.failure.clone())),
            _ => Err(SolverError::NotRunning),
        }
    }
}

impl Drop for SolverManager {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        {
            let _state = self.shared.state.lock();
            self.shared.wake.notify_all();
        }
        if let Some(h) = self.handle.get_mut().take() {
            let _ = h.join();
        }
    }
}

fn died(failure: Option<Arc<EngineFailure>>) -> SolverError {
    SolverError::Died(failure.unwrap_or_else(|| Arc::new(EngineFailure::Panicked("unknown failure".to_owned()))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Step and time budget, restarted per fact-change batch.
struct Budget {
    started: Instant,
    steps: u64,
    time_limit: Option<Duration>,
    step_limit: Option<u64>,
}

impl Budget {
    fn new(config: &SolverConfig) -> Self {
        Self {
            started: Instant::now(),
            steps: 0,
            time_limit: config.time_limit,
            step_limit: config.step_limit,
        }
    }

    fn restart(&mut self) {
        self.started = Instant::now();
        self.steps = 0;
    }

    fn exhausted(&self) -> bool {
        self.step_limit.is_some_and(|limit| self.steps >= limit)
            || self.time_limit.is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

struct Engine {
    run_id: Uuid,
    config: SolverConfig,
    oracle: Arc<dyn DistanceOracle>,
    listener: Arc<dyn SolverListener>,
    shared: Arc<Shared>,
}

impl Engine {
    fn run(self, plan: VehicleRoutePlan) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.solve(plan)));
        let failure = match result {
            Ok(Ok(solution)) => {
                let mut state = self.shared.state.lock();
                state.outcome = Some(solution);
                // An external stop settles the status itself once joined.
                if !self.shared.stop.load(Ordering::SeqCst) {
                    state.status = SolverStatus::Idle;
                }
                self.shared.wake.notify_all();
                return;
            }
            Ok(Err(failure)) => failure,
            Err(payload) => EngineFailure::Panicked(panic_message(payload.as_ref())),
        };

        error!(run_id = %self.run_id, error = %failure, "Solver failed");
        let failure = Arc::new(failure);
        {
            let mut state = self.shared.state.lock();
            state.status = SolverStatus::Failed;
            state.failure = Some(failure.clone());
            state.queue.clear();
            self.shared.wake.notify_all();
        }
        self.listener.solver_failed(&failure);
    }

    fn solve(&self, plan: VehicleRoutePlan) -> Result<VehicleRoutePlan, EngineFailure> {
        let solve_start = Instant::now();
        self.shared.set_status(SolverStatus::Running);

        info!(
            run_id = %self.run_id,
            visits = plan.visit_count(),
            vehicles = plan.vehicle_count(),
            "Starting route solver"
        );
        console::print_config(
            self.run_id,
            plan.vehicle_count(),
            plan.visit_count(),
            plan.unassigned_visits().len(),
        );

        let mut director = ScoreDirector::new(plan, self.oracle.clone())?;
        let mut search = LocalSearch::new(self.config.plateau_tolerance);
        let mut total_moves = self.construct(&mut director, 0)?;
        search.reset(&director);
        console::print_solving_started(
            solve_start.elapsed(),
            director.score(),
            director.working_solution().visit_count(),
            director.working_solution().vehicle_count(),
        );
        self.publish_if_settled(&director);

        let mut budget = Budget::new(&self.config);
        let mut settled = false;
        let mut phase_index = 1;
        let mut timer = PhaseTimer::start("LocalSearch", phase_index);
        let mut moves_at_phase_start = search.moves_evaluated();
        let mut steps_at_phase_start = search.steps_accepted();

        loop {
            // Read before draining: a stopping manager accepts no more changes,
            // so this batch is the last one.
            let stopping = self.shared.stop.load(Ordering::SeqCst);

            let batch = self.take_batch();
            if !batch.is_empty() {
                search.rollback(&mut director)?;
                self.apply_batch(&mut director, &batch)?;
                phase_index += 1;
                total_moves += self.construct(&mut director, phase_index)?;
                search.reset(&director);
                budget.restart();
                settled = false;
                self.publish_if_settled(&director);
                if stopping {
                    break;
                }
                continue;
            }
            if stopping {
                break;
            }

            if settled || budget.exhausted() {
                timer.record_moves(search.moves_evaluated() - moves_at_phase_start);
                timer.record_accepted(search.steps_accepted() - steps_at_phase_start);
                timer.finish(search.best_score());
                if !self.config.daemon {
                    if self.finish_if_drained() {
                        break;
                    }
                } else {
                    debug!(run_id = %self.run_id, score = %search.best_score(), "Solver idle, awaiting fact changes");
                    self.idle();
                }
                phase_index += 1;
                timer = PhaseTimer::start("LocalSearch", phase_index);
                moves_at_phase_start = search.moves_evaluated();
                steps_at_phase_start = search.steps_accepted();
                continue;
            }

            match search.step(&mut director)? {
                StepOutcome::NewBest(score) => {
                    debug!(run_id = %self.run_id, score = %score, steps = budget.steps, "New best solution");
                    self.publish_if_settled(&director);
                }
                StepOutcome::Plateau(_) => {}
                StepOutcome::LocalOptimum => {
                    debug!(run_id = %self.run_id, score = %search.best_score(), "Local optimum reached");
                    settled = true;
                }
            }
            budget.steps += 1;
        }

        search.rollback(&mut director)?;
        total_moves += search.moves_evaluated();
        let elapsed = solve_start.elapsed();
        info!(
            run_id = %self.run_id,
            duration_secs = elapsed.as_secs_f64(),
            moves = total_moves,
            score = %director.score(),
            feasible = director.score().is_feasible(),
            "Solving ended"
        );
        console::print_solving_ended(elapsed, total_moves, director.score());
        Ok(director.into_solution())
    }

    fn construct(&self, director: &mut ScoreDirector, phase_index: usize) -> Result<u64, EngineFailure> {
        if director.working_solution().unassigned_visits().is_empty() {
            return Ok(0);
        }
        let mut timer = PhaseTimer::start("ConstructionHeuristic", phase_index);
        let stats = construct(director)?;
        timer.record_moves(stats.moves_evaluated);
        timer.record_accepted(stats.inserted as u64);
        timer.finish(director.score());
        Ok(stats.moves_evaluated)
    }

    fn take_batch(&self) -> Vec<FactChange> {
        self.shared.state.lock().queue.drain(..).collect()
    }

    fn apply_batch(&self, director: &mut ScoreDirector, batch: &[FactChange]) -> Result<(), EngineFailure> {
        let mut failed = 0;
        for change in batch {
            if let Err(e) = change.apply(director) {
                failed += 1;
                error!(run_id = %self.run_id, change = %change, error = %e, "Fact change failed");
                self.listener.fact_change_failed(change, &e);
            }
        }
        director.refresh_dirty()?;
        info!(
            run_id = %self.run_id,
            applied = batch.len() - failed,
            failed,
            visits = director.working_solution().visit_count(),
            vehicles = director.working_solution().vehicle_count(),
            score = %director.score(),
            "Fact changes applied"
        );
        console::print_fact_changes(batch.len() - failed, failed, director.score());
        Ok(())
    }

    /// Leaves `Running` if no change is queued, so nothing more is accepted.
    ///
    /// Returns `false` when changes arrived first; they must be applied.
    fn finish_if_drained(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !state.queue.is_empty() {
            return false;
        }
        if state.status == SolverStatus::Running {
            state.status = SolverStatus::Stopping;
        }
        true
    }

    /// Hands the working solution to the listener unless more changes are queued.
    fn publish_if_settled(&self, director: &ScoreDirector) {
        if !self.shared.state.lock().queue.is_empty() {
            return;
        }
        self.listener.best_solution_changed(&director.clone_solution());
    }

    /// Parks the thread until a fact change arrives or a stop is requested.
    fn idle(&self) {
        let mut state = self.shared.state.lock();
        while state.queue.is_empty() && !self.shared.stop.load(Ordering::SeqCst) {
            self.shared.wake.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use crate::distance::DistanceMatrix;
    use crate::domain::{Depot, Location, LocationId, Vehicle, VehicleInfo, Visit};

    struct Recorder {
        best: mpsc::Sender<VehicleRoutePlan>,
        failures: Mutex<Vec<String>>,
        fact_failures: Mutex<Vec<String>>,
    }

    impl SolverListener for Recorder {
        fn best_solution_changed(&self, solution: &VehicleRoutePlan) {
            let _ = self.best.send(solution.clone());
        }

        fn solver_failed(&self, failure: &EngineFailure) {
            self.failures.lock().push(failure.to_string());
        }

        fn fact_change_failed(&self, change: &FactChange, error: &FactChangeError) {
            self.fact_failures.lock().push(format!("{change}: {error}"));
        }
    }

    fn location(id: LocationId) -> Arc<Location> {
        Arc::new(Location::new(id, 0.0, id as f64 / 10.0).unwrap())
    }

    struct Fixture {
        manager: SolverManager,
        recorder: Arc<Recorder>,
        best: mpsc::Receiver<VehicleRoutePlan>,
        locations: Vec<Arc<Location>>,
        vehicle: Arc<VehicleInfo>,
    }

    fn fixture(config: SolverConfig, known: LocationId) -> Fixture {
        let matrix = DistanceMatrix::new(|a: &Location, b: &Location| (a.id - b.id).abs() * 10);
        let locations: Vec<_> = (0..6).map(location).collect();
        for loc in locations.iter().take(known as usize) {
            matrix.add_location(loc.clone());
        }
        let (tx, rx) = mpsc::channel();
        let recorder = Arc::new(Recorder {
            best: tx,
            failures: Mutex::new(Vec::new()),
            fact_failures: Mutex::new(Vec::new()),
        });
        let manager = SolverManager::new(config, Arc::new(matrix), recorder.clone());
        Fixture {
            manager,
            recorder,
            best: rx,
            locations,
            vehicle: Arc::new(VehicleInfo::new(1, "V1")),
        }
    }

    fn plan(fixture: &Fixture, visits: &[usize]) -> VehicleRoutePlan {
        let mut plan = VehicleRoutePlan::new();
        plan.set_depot(Depot::new(fixture.locations[0].clone())).unwrap();
        plan.add_vehicle(Vehicle::new(fixture.vehicle.clone(), 10)).unwrap();
        for &i in visits {
            plan.add_visit(Visit::new(fixture.locations[i].clone(), 4)).unwrap();
        }
        plan
    }

    fn next_best(fixture: &Fixture) -> VehicleRoutePlan {
        fixture
            .best
            .recv_timeout(Duration::from_secs(10))
            .expect("no best solution published")
    }

    #[test]
    fn lifecycle_round_trip() {
        let f = fixture(SolverConfig::default(), 6);
        assert_eq!(f.manager.status(), SolverStatus::Idle);
        assert!(matches!(
            f.manager.add_fact_change(FactChange::RemoveVisit(f.locations[1].clone())),
            Err(SolverError::NotRunning)
        ));

        f.manager.start_solver(plan(&f, &[1, 2])).unwrap();
        assert!(f.manager.is_running());
        assert!(matches!(
            f.manager.start_solver(plan(&f, &[1])),
            Err(SolverError::AlreadyRunning)
        ));

        let first = next_best(&f);
        assert!(first.unassigned_visits().is_empty());
        assert_eq!(first.score().soft(), -40);

        let final_plan = f.manager.stop_solver().unwrap().unwrap();
        assert_eq!(final_plan.score().soft(), -40);
        assert_eq!(f.manager.status(), SolverStatus::Idle);
        assert!(f.manager.stop_solver().unwrap().is_none());
    }

    #[test]
    fn fact_changes_are_applied_and_published_once_settled() {
        let f = fixture(SolverConfig::default(), 6);
        f.manager.start_solver(plan(&f, &[1, 2])).unwrap();
        next_best(&f);

        f.manager
            .add_fact_changes(vec![
                FactChange::AddVisit(Visit::new(f.locations[3].clone(), 1)),
                FactChange::RemoveVisit(f.locations[1].clone()),
            ])
            .unwrap();

        let settled = loop {
            let plan = next_best(&f);
            if plan.find_visit(3).is_some() && plan.find_visit(1).is_none() {
                break plan;
            }
        };
        assert!(settled.unassigned_visits().is_empty());
        assert_eq!(settled.visit_count(), 2);
        // 0 → 2 → 3 → 0
        assert_eq!(settled.score().soft(), -60);
        f.manager.stop_solver().unwrap();
    }

    #[test]
    fn mismatched_fact_change_is_reported_and_the_run_continues() {
        let f = fixture(SolverConfig::default(), 6);
        f.manager.start_solver(plan(&f, &[1, 2])).unwrap();
        next_best(&f);

        f.manager
            .add_fact_change(FactChange::ChangeCapacity(Arc::new(VehicleInfo::new(1, "V1")), 3))
            .unwrap();
        next_best(&f);
        assert_eq!(f.recorder.fact_failures.lock().len(), 1);
        assert!(f.manager.is_running());
        f.manager.stop_solver().unwrap();
    }

    #[test]
    fn engine_failure_is_captured_and_reraised_until_restart() {
        // Location 2 is unknown to the oracle, so the first scoring pass fails.
        let f = fixture(SolverConfig::default(), 2);
        let mut initial = plan(&f, &[1, 2]);
        let v = initial.find_vehicle(1).unwrap();
        let a = initial.find_visit(1).unwrap();
        let b = initial.find_visit(2).unwrap();
        initial.link_after(a, crate::domain::Standstill::Vehicle(v)).unwrap();
        initial.link_after(b, crate::domain::Standstill::Visit(a)).unwrap();

        f.manager.start_solver(initial).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while f.manager.status() != SolverStatus::Failed {
            assert!(Instant::now() < deadline, "engine did not fail");
            thread::sleep(Duration::from_millis(5));
        }

        let expected = "solver died: no distance known from location 1 to location 2";
        let err = f.manager.stop_solver().unwrap_err();
        assert_eq!(err.to_string(), expected);
        let err = f
            .manager
            .add_fact_change(FactChange::RemoveVisit(f.locations[1].clone()))
            .unwrap_err();
        assert_eq!(err.to_string(), expected);
        assert_eq!(f.manager.stop_solver().unwrap_err().to_string(), expected);
        assert_eq!(f.recorder.failures.lock().len(), 1);
    }

    #[test]
    fn changes_accepted_while_a_bounded_run_ends_are_applied() {
        for _ in 0..50 {
            let config = SolverConfig::default().with_daemon(false).with_step_limit(Some(1));
            let f = fixture(config, 6);
            f.manager.start_solver(plan(&f, &[1])).unwrap();

            let changes = (2..6)
                .map(|i| FactChange::AddVisit(Visit::new(f.locations[i].clone(), 1)))
                .collect();
            let accepted = match f.manager.add_fact_changes(changes) {
                Ok(()) => true,
                Err(SolverError::NotRunning) => false,
                Err(e) => panic!("unexpected error: {e}"),
            };

            let outcome = f.manager.stop_solver().unwrap().expect("outcome kept");
            assert_eq!(outcome.visit_count(), if accepted { 5 } else { 1 });
            assert!(outcome.unassigned_visits().is_empty());
            assert_eq!(f.manager.status(), SolverStatus::Idle);
        }
    }

    #[test]
    fn bounded_run_exits_on_its_own_and_keeps_the_outcome() {
        let config = SolverConfig::default().with_daemon(false).with_step_limit(Some(50));
        let f = fixture(config, 6);
        f.manager.start_solver(plan(&f, &[1, 2, 3])).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while f.manager.status() != SolverStatus::Idle {
            assert!(Instant::now() < deadline, "engine did not exit");
            thread::sleep(Duration::from_millis(5));
        }
        let outcome = f.manager.stop_solver().unwrap().expect("outcome kept");
        assert!(outcome.unassigned_visits().is_empty());
        assert_eq!(outcome.score().soft(), -60);
        assert!(f.manager.stop_solver().unwrap().is_none());
    }
}

//! Best-improvement local search with bounded plateau excursions.
//!
//! Each step evaluates the whole neighbourhood and picks the move with the
//! greatest delta. Improving moves are always taken. Non-improving moves that
//! keep the hard score are taken as an excursion, at most `tolerance` steps
//! past the last best; visits moved during an excursion are tabu until it
//! ends. An excursion that finds no new best is rolled back, leaving the
//! working solution on the best score seen since the last reset.

use std::collections::HashSet;

use tracing::trace;

use crate::director::ScoreDirector;
use crate::domain::VisitIdx;
use crate::error::EngineFailure;
use crate::moves::{enumerate_moves, Move};
use crate::score::HardSoftScore;

/// Default number of non-improving steps allowed past the last best.
pub const DEFAULT_PLATEAU_TOLERANCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The working solution reached a new best score.
    NewBest(HardSoftScore),
    /// A non-improving step was taken as part of an excursion.
    Plateau(HardSoftScore),
    /// No acceptable move is left; the working solution is back on the best.
    LocalOptimum,
}

#[derive(Debug)]
pub struct LocalSearch {
    tolerance: usize,
    undo_log: Vec<Move>,
    tabu: HashSet<VisitIdx>,
    best_score: HardSoftScore,
    steps_since_best: usize,
    moves_evaluated: u64,
    steps_accepted: u64,
}

impl LocalSearch {
    pub fn new(tolerance: usize) -> Self {
        Self {
            tolerance,
            undo_log: Vec::new(),
            tabu: HashSet::new(),
            best_score: HardSoftScore::ZERO,
            steps_since_best: 0,
            moves_evaluated: 0,
            steps_accepted: 0,
        }
    }

    /// Starts over from the director's current solution as the best.
    ///
    /// Any open excursion is forgotten, not rolled back; call
    /// [`rollback`](Self::rollback) first when the working solution must
    /// return to the best.
    pub fn reset(&mut self, director: &ScoreDirector) {
        self.undo_log.clear();
        self.tabu.clear();
        self.best_score = director.score();
        self.steps_since_best = 0;
    }

    #[inline]
    pub fn best_score(&self) -> HardSoftScore {
        self.best_score
    }

    #[inline]
    pub fn moves_evaluated(&self) -> u64 {
        self.moves_evaluated
    }

    #[inline]
    pub fn steps_accepted(&self) -> u64 {
        self.steps_accepted
    }

    #[inline]
    pub fn in_excursion(&self) -> bool {
        !self.undo_log.is_empty()
    }

    /// Undoes the open excursion, if any, restoring the best solution.
    pub fn rollback(&mut self, director: &mut ScoreDirector) -> Result<(), EngineFailure> {
        while let Some(undo) = self.undo_log.pop() {
            director.do_move(&undo)?;
        }
        self.tabu.clear();
        self.steps_since_best = 0;
        Ok(())
    }

    /// Takes one step.
    pub fn step(&mut self, director: &mut ScoreDirector) -> Result<StepOutcome, EngineFailure> {
        let Some((mv, delta)) = self.pick(director)? else {
            self.rollback(director)?;
            return Ok(StepOutcome::LocalOptimum);
        };
        if delta.hard() < 0 {
            self.rollback(director)?;
            return Ok(StepOutcome::LocalOptimum);
        }

        let reaches_best = director.score() + delta > self.best_score;
        if !reaches_best && self.steps_since_best >= self.tolerance {
            self.rollback(director)?;
            return Ok(StepOutcome::LocalOptimum);
        }

        let undo = mv.undo(director.working_solution())?;
        let moved = mv.moved_visits(director.working_solution());
        director.do_move(&mv)?;
        self.steps_accepted += 1;
        trace!(?mv, %delta, score = %director.score(), "Step taken");

        if reaches_best {
            self.undo_log.clear();
            self.tabu.clear();
            self.steps_since_best = 0;
            self.best_score = director.score();
            Ok(StepOutcome::NewBest(self.best_score))
        } else {
            self.undo_log.push(undo);
            self.tabu.extend(moved);
            self.steps_since_best += 1;
            Ok(StepOutcome::Plateau(director.score()))
        }
    }

    /// The best non-tabu move: greatest delta, then greater id sum, then
    /// enumeration order.
    fn pick(&mut self, director: &ScoreDirector) -> Result<Option<(Move, HardSoftScore)>, EngineFailure> {
        let plan = director.working_solution();
        let mut best: Option<(Move, HardSoftScore, i64)> = None;
        for mv in enumerate_moves(plan) {
            if !self.tabu.is_empty() && mv.moved_visits(plan).iter().any(|v| self.tabu.contains(v)) {
                continue;
            }
            let delta = director.delta(&mv)?;
            self.moves_evaluated += 1;
            let better = match best {
                None => true,
                Some((_, best_delta, best_ids)) => {
                    delta > best_delta || (delta == best_delta && mv.id_sum(plan) > best_ids)
                }
            };
            if better {
                best = Some((mv, delta, mv.id_sum(plan)));
            }
        }
        Ok(best.map(|(mv, delta, _)| (mv, delta)))
    }
}

impl Default for LocalSearch {
    fn default() -> Self {
        Self::new(DEFAULT_PLATEAU_TOLERANCE)
    }
}

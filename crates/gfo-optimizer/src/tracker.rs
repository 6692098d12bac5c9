//! Best/current position bookkeeping shared by every strategy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use gfo_types::Position;

/// The single comparison used for "better" everywhere below the driver.
///
/// Scores reaching this point are internal scores (higher is better); the
/// driver has already applied the objective direction.
#[inline]
pub fn is_better(candidate: f64, incumbent: f64) -> bool {
    candidate > incumbent
}

/// Best position seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestState {
    pub position: Position,
    pub score: f64,
    /// Ordinal of the observation that produced this best.
    pub trial: usize,
}

/// Tracks the best and current positions plus every score seen.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    best: Option<BestState>,
    current: Option<(Position, f64)>,
    last: Option<(Position, f64)>,
    seen: HashMap<Position, f64>,
    n_recorded: usize,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns `true` when it became the new best.
    pub fn record(&mut self, position: &Position, score: f64) -> bool {
        let trial = self.n_recorded;
        self.n_recorded += 1;
        self.last = Some((position.clone(), score));
        self.seen.entry(position.clone()).or_insert(score);

        let improved = match &self.best {
            None => true,
            Some(best) => is_better(score, best.score),
        };
        if improved {
            self.best = Some(BestState {
                position: position.clone(),
                score,
                trial,
            });
        }
        improved
    }

    pub fn best(&self) -> Option<&BestState> {
        self.best.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.score)
    }

    pub fn best_position(&self) -> Option<&Position> {
        self.best.as_ref().map(|b| &b.position)
    }

    pub fn current(&self) -> Option<(&Position, f64)> {
        self.current.as_ref().map(|(p, s)| (p, *s))
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.current.as_ref().map(|(p, _)| p)
    }

    pub fn current_score(&self) -> Option<f64> {
        self.current.as_ref().map(|(_, s)| *s)
    }

    pub fn set_current(&mut self, position: Position, score: f64) {
        self.current = Some((position, score));
    }

    /// Move current iff there is none yet or `score` beats it.
    pub fn offer_current(&mut self, position: &Position, score: f64) -> bool {
        let accept = match self.current_score() {
            None => true,
            Some(current) => is_better(score, current),
        };
        if accept {
            self.current = Some((position.clone(), score));
        }
        accept
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn last(&self) -> Option<(&Position, f64)> {
        self.last.as_ref().map(|(p, s)| (p, *s))
    }

    /// Score recorded for `position`, if it was evaluated before.
    pub fn seen(&self, position: &Position) -> Option<f64> {
        self.seen.get(position).copied()
    }

    pub fn n_seen(&self) -> usize {
        self.seen.len()
    }

    pub fn n_recorded(&self) -> usize {
        self.n_recorded
    }
}

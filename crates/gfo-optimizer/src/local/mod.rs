//! Single-agent local search: climbing variants, simplex and pattern search.

mod hill_climbing;
mod pattern;
mod simplex;
mod tabu;

pub use hill_climbing::{
    HillClimbing, RandomRestartHillClimbing, SimulatedAnnealing, StochasticHillClimbing,
};
pub use pattern::PatternSearch;
pub use simplex::DownhillSimplex;
pub use tabu::TabuSearch;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use gfo_types::{GfoResult, Position, StepDistribution};

use crate::core::SearchCore;
use crate::search::Proposal;
use crate::tracker::is_better;

/// Score difference scaled by the larger magnitude of the two scores.
pub(crate) fn normalized_delta(new: f64, current: f64) -> f64 {
    if new == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let denom = new.abs().max(current.abs());
    if !denom.is_finite() || denom < 1e-12 {
        return new - current;
    }
    (new - current) / denom
}

/// Metropolis acceptance at temperature `temp`.
pub(crate) fn metropolis(new: f64, current: f64, temp: f64, rng: &mut ChaCha8Rng) -> bool {
    if is_better(new, current) {
        return true;
    }
    let p = (normalized_delta(new, current) / temp.max(1e-12)).exp();
    rng.gen::<f64>() < p
}

/// Climbing state shared by the hill-climbing variants: step settings plus
/// the batch of neighbours collected since the last move.
#[derive(Debug, Clone)]
pub(crate) struct ClimbState {
    pub epsilon: f64,
    pub distribution: StepDistribution,
    pub n_neighbours: usize,
    neighbours: Vec<(Position, f64)>,
}

impl Default for ClimbState {
    fn default() -> Self {
        Self {
            epsilon: 0.03,
            distribution: StepDistribution::Normal,
            n_neighbours: 3,
            neighbours: Vec::new(),
        }
    }
}

impl ClimbState {
    pub fn propose<A>(&mut self, core: &mut SearchCore, accept: A) -> GfoResult<Proposal>
    where
        A: Fn(&Position) -> bool,
    {
        if let Some(position) = core.next_init()? {
            return Ok(Proposal::single(position));
        }
        if core.random_restart_due() {
            let space = Arc::clone(core.space());
            let start = space.random_position(core.rng());
            return Ok(Proposal::single(core.feasible_filtered(start, accept)?));
        }
        let from = match core.tracker().current_position() {
            Some(p) => p.clone(),
            None => core.random_feasible()?,
        };
        let position = core.climb_filtered(&from, self.epsilon, self.distribution, accept)?;
        Ok(Proposal::single(position))
    }

    /// Record the score; once a full batch of neighbours is in, move to the
    /// best of them if `accept(best, current)` holds.
    ///
    /// Returns the best neighbour of a completed batch that was *not*
    /// accepted, if any.
    pub fn observe<A>(
        &mut self,
        core: &mut SearchCore,
        position: &Position,
        score: f64,
        mut accept: A,
    ) -> Option<Position>
    where
        A: FnMut(f64, f64, &mut ChaCha8Rng) -> bool,
    {
        core.record(position, score);
        if core.is_initializing() {
            core.tracker_mut().offer_current(position, score);
            return None;
        }

        self.neighbours.push((position.clone(), score));
        if self.neighbours.len() < self.n_neighbours.max(1) {
            return None;
        }

        let batch = std::mem::take(&mut self.neighbours);
        let (best_pos, best_score) = batch
            .into_iter()
            .fold(None::<(Position, f64)>, |acc, (p, s)| match acc {
                Some((bp, bs)) if !is_better(s, bs) => Some((bp, bs)),
                _ => Some((p, s)),
            })?;

        let current = core.tracker().current_score();
        let moved = match current {
            None => true,
            Some(current) => accept(best_score, current, core.rng()),
        };
        if moved {
            core.tracker_mut().set_current(best_pos, best_score);
            None
        } else {
            Some(best_pos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn normalized_delta_is_scale_free() {
        assert!((normalized_delta(-4.0, -1.0) + 0.75).abs() < 1e-12);
        assert!((normalized_delta(-400.0, -100.0) + 0.75).abs() < 1e-12);
        assert_eq!(normalized_delta(0.0, 0.0), 0.0);
        assert_eq!(normalized_delta(f64::NEG_INFINITY, 1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn metropolis_accepts_improvements_and_rejects_at_zero_temperature() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(metropolis(2.0, 1.0, 1e-9, &mut rng));
        for _ in 0..100 {
            assert!(!metropolis(0.0, 1.0, 1e-9, &mut rng));
        }
    }

    #[test]
    fn metropolis_accepts_some_worse_moves_when_hot() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let accepted = (0..1000).filter(|_| metropolis(0.9, 1.0, 10.0, &mut rng)).count();
        assert!(accepted > 900);
    }
}

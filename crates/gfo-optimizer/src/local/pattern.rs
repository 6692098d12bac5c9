use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use gfo_types::{GfoResult, Position, SearchSpace};

use crate::core::SearchCore;
use crate::search::{Optimizer, Proposal};
use crate::tracker::is_better;

/// Compass search: evaluates the ±axis pattern around the current position,
/// moves to the best pattern point on improvement and shrinks the pattern
/// otherwise.
#[derive(Debug, Clone)]
pub struct PatternSearch {
    core: SearchCore,
    n_positions: usize,
    pattern_size: f64,
    reduction: f64,
    pending: VecDeque<Position>,
    awaiting: usize,
    round: Vec<(Position, f64)>,
}

impl PatternSearch {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            n_positions: 4,
            pattern_size: 0.25,
            reduction: 0.9,
            pending: VecDeque::new(),
            awaiting: 0,
            round: Vec::new(),
        }
    }

    /// Pattern points evaluated per round (sampled when the full pattern is
    /// larger).
    pub fn with_n_positions(mut self, n: usize) -> Self {
        self.n_positions = n.max(1);
        self
    }

    /// Pattern arm length relative to each dimension's extent.
    pub fn with_pattern_size(mut self, size: f64) -> Self {
        self.pattern_size = size;
        self
    }

    pub fn with_reduction(mut self, reduction: f64) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn pattern_size(&self) -> f64 {
        self.pattern_size
    }

    fn pattern_around(&mut self, center: &Position) -> Vec<Position> {
        let space = Arc::clone(self.core.space());
        let mut points = Vec::with_capacity(2 * center.len());
        for dim in 0..center.len() {
            let max = space.size_of(dim) - 1;
            if max == 0 {
                continue;
            }
            let step = ((max as f64 * self.pattern_size).round() as usize).max(1);
            let here = center[dim];
            let mut up = center.as_slice().to_vec();
            up[dim] = (here + step).min(max);
            let mut down = center.as_slice().to_vec();
            down[dim] = here.saturating_sub(step);
            for indices in [up, down] {
                let p = Position::new(indices);
                if p != *center && !points.contains(&p) {
                    points.push(p);
                }
            }
        }
        if points.len() > self.n_positions {
            points.shuffle(self.core.rng());
            points.truncate(self.n_positions);
        }
        points
    }

    fn close_round(&mut self) {
        let round = std::mem::take(&mut self.round);
        let best = round
            .into_iter()
            .fold(None::<(Position, f64)>, |acc, (p, s)| match acc {
                Some((bp, bs)) if !is_better(s, bs) => Some((bp, bs)),
                _ => Some((p, s)),
            });
        let Some((position, score)) = best else {
            return;
        };
        if self.core.tracker_mut().offer_current(&position, score) {
            debug!(pattern_size = self.pattern_size, "pattern moved");
        } else {
            self.pattern_size *= self.reduction;
        }
    }
}

impl Optimizer for PatternSearch {
    fn name(&self) -> &str {
        "pattern_search"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(position) = self.core.next_init()? {
            return Ok(Proposal::single(position));
        }
        if self.pending.is_empty() && self.awaiting == 0 {
            if self.core.random_restart_due() {
                return Ok(Proposal::single(self.core.random_feasible()?));
            }
            let center = match self.core.tracker().current_position() {
                Some(p) => p.clone(),
                None => self.core.random_feasible()?,
            };
            self.pending = self.pattern_around(&center).into();
        }
        match self.pending.pop_front() {
            Some(candidate) => {
                self.awaiting += 1;
                Ok(Proposal::single(self.core.feasible_from(candidate)?))
            }
            // Single-slot space: nothing around the center.
            None => Ok(Proposal::single(self.core.random_feasible()?)),
        }
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.core.record(&proposal.position, score);
        if self.core.is_initializing() || self.awaiting == 0 {
            self.core.tracker_mut().offer_current(&proposal.position, score);
            return;
        }
        self.awaiting -= 1;
        self.round.push((proposal.position.clone(), score));
        if self.awaiting == 0 && self.pending.is_empty() {
            self.close_round();
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

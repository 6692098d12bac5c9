use std::collections::VecDeque;
use std::sync::Arc;

use gfo_types::{GfoResult, Position, SearchSpace, StepDistribution};

use super::ClimbState;
use crate::core::SearchCore;
use crate::search::{Optimizer, Proposal};
use crate::tracker::is_better;

/// Hill climbing with a bounded FIFO memory of rejected positions.
/// Tabu positions are filtered out inside the constraint-retry loop.
#[derive(Debug, Clone)]
pub struct TabuSearch {
    core: SearchCore,
    climb: ClimbState,
    tabu: VecDeque<Position>,
    tabu_memory: usize,
}

impl TabuSearch {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            climb: ClimbState::default(),
            tabu: VecDeque::new(),
            tabu_memory: 10,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.climb.epsilon = epsilon;
        self
    }

    pub fn with_distribution(mut self, distribution: StepDistribution) -> Self {
        self.climb.distribution = distribution;
        self
    }

    pub fn with_n_neighbours(mut self, n: usize) -> Self {
        self.climb.n_neighbours = n.max(1);
        self
    }

    pub fn with_tabu_memory(mut self, n: usize) -> Self {
        self.tabu_memory = n;
        self
    }

    pub fn tabu_list(&self) -> impl Iterator<Item = &Position> {
        self.tabu.iter()
    }

    fn remember(&mut self, position: Position) {
        if self.tabu_memory == 0 || self.tabu.contains(&position) {
            return;
        }
        if self.tabu.len() >= self.tabu_memory {
            self.tabu.pop_front();
        }
        self.tabu.push_back(position);
    }
}

impl Optimizer for TabuSearch {
    fn name(&self) -> &str {
        "tabu_search"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        let tabu = &self.tabu;
        self.climb.propose(&mut self.core, |p| !tabu.contains(p))
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        let rejected = self
            .climb
            .observe(&mut self.core, &proposal.position, score, |new, current, _| {
                is_better(new, current)
            });
        if let Some(position) = rejected {
            self.remember(position);
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{InitConfig, StrategyOptions};

    fn space() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -10, 10)
                .add_int("y", -10, 10)
                .build()
                .unwrap(),
        )
    }

    fn score(space: &SearchSpace, p: &Position) -> f64 {
        let params = space.parameters(p);
        let x = params["x"].as_f64().unwrap();
        let y = params["y"].as_f64().unwrap();
        -(x - 3.0).powi(2) - (y + 2.0).powi(2)
    }

    #[test]
    fn tabu_list_is_bounded() {
        let space = space();
        let mut opt = TabuSearch::new(space.clone())
            .with_tabu_memory(3)
            .with_n_neighbours(1)
            .with_epsilon(0.2)
            .with_seed(1)
            .with_initialize(InitConfig::random(1));
        for _ in 0..100 {
            let p = opt.propose().unwrap();
            opt.observe(&p, score(&space, &p.position));
            assert!(opt.tabu_list().count() <= 3);
        }
    }

    #[test]
    fn proposals_avoid_tabu_positions() {
        let space = space();
        let mut opt = TabuSearch::new(space.clone())
            .with_tabu_memory(20)
            .with_n_neighbours(1)
            .with_epsilon(0.1)
            .with_seed(2)
            .with_initialize(InitConfig::random(1));
        for _ in 0..100 {
            let p = opt.propose().unwrap();
            assert!(opt.tabu_list().all(|t| *t != p.position));
            opt.observe(&p, score(&space, &p.position));
        }
        assert!(opt.best().unwrap().score > -10.0);
    }
}

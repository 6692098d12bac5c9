use rand::Rng;
use std::sync::Arc;
use tracing::debug;

use gfo_types::{GfoResult, SearchSpace, StepDistribution};

use super::{metropolis, normalized_delta, ClimbState};
use crate::core::SearchCore;
use crate::search::{Optimizer, Proposal};
use crate::tracker::is_better;

macro_rules! climb_settings {
    () => {
        /// Step size relative to each dimension's extent.
        pub fn with_epsilon(mut self, epsilon: f64) -> Self {
            self.climb.epsilon = epsilon;
            self
        }

        pub fn with_distribution(mut self, distribution: StepDistribution) -> Self {
            self.climb.distribution = distribution;
            self
        }

        /// Neighbours evaluated before deciding on a move.
        pub fn with_n_neighbours(mut self, n: usize) -> Self {
            self.climb.n_neighbours = n.max(1);
            self
        }
    };
}

macro_rules! core_access {
    () => {
        fn core(&self) -> &SearchCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SearchCore {
            &mut self.core
        }
    };
}

// ---- Hill climbing ----

/// Greedy climber: moves to the best of `n_neighbours` neighbours when it
/// beats the current position.
#[derive(Debug, Clone)]
pub struct HillClimbing {
    core: SearchCore,
    climb: ClimbState,
}

impl HillClimbing {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            climb: ClimbState::default(),
        }
    }

    climb_settings!();
}

impl Optimizer for HillClimbing {
    fn name(&self) -> &str {
        "hill_climbing"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.climb.propose(&mut self.core, |_| true)
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.climb
            .observe(&mut self.core, &proposal.position, score, |new, current, _| {
                is_better(new, current)
            });
    }

    core_access!();
}

// ---- Stochastic hill climbing ----

/// Probability of taking a move that changes the score by `delta`
/// (normalized), capped at `p_accept` for equal scores.
pub(crate) fn stochastic_acceptance(p_accept: f64, norm_factor: f64, new: f64, current: f64) -> f64 {
    let norm = if norm_factor > 0.0 { norm_factor } else { 1.0 };
    let delta = normalized_delta(new, current) / norm;
    p_accept * 2.0 / (1.0 + (-delta).exp())
}

/// Hill climbing that also accepts worse neighbours with a probability that
/// shrinks with how much worse they are.
#[derive(Debug, Clone)]
pub struct StochasticHillClimbing {
    core: SearchCore,
    climb: ClimbState,
    p_accept: f64,
    norm_factor: f64,
}

impl StochasticHillClimbing {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            climb: ClimbState::default(),
            p_accept: 0.5,
            norm_factor: 1.0,
        }
    }

    climb_settings!();

    pub fn with_p_accept(mut self, p: f64) -> Self {
        self.p_accept = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_norm_factor(mut self, norm: f64) -> Self {
        self.norm_factor = norm;
        self
    }
}

impl Optimizer for StochasticHillClimbing {
    fn name(&self) -> &str {
        "stochastic_hill_climbing"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.climb.propose(&mut self.core, |_| true)
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        let (p_accept, norm_factor) = (self.p_accept, self.norm_factor);
        self.climb
            .observe(&mut self.core, &proposal.position, score, |new, current, rng| {
                is_better(new, current)
                    || rng.gen::<f64>() < stochastic_acceptance(p_accept, norm_factor, new, current)
            });
    }

    core_access!();
}

// ---- Simulated annealing ----

/// Metropolis acceptance with a geometrically cooling temperature.
#[derive(Debug, Clone)]
pub struct SimulatedAnnealing {
    core: SearchCore,
    climb: ClimbState,
    start_temp: f64,
    annealing_rate: f64,
    temp: f64,
}

impl SimulatedAnnealing {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            climb: ClimbState::default(),
            start_temp: 1.0,
            annealing_rate: 0.97,
            temp: 1.0,
        }
    }

    climb_settings!();

    pub fn with_start_temp(mut self, temp: f64) -> Self {
        self.start_temp = temp;
        self.temp = temp;
        self
    }

    pub fn with_annealing_rate(mut self, rate: f64) -> Self {
        self.annealing_rate = rate;
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temp
    }
}

impl Optimizer for SimulatedAnnealing {
    fn name(&self) -> &str {
        "simulated_annealing"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.climb.propose(&mut self.core, |_| true)
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        let exploring = !self.core.is_initializing();
        let temp = self.temp;
        self.climb
            .observe(&mut self.core, &proposal.position, score, |new, current, rng| {
                metropolis(new, current, temp, rng)
            });
        if exploring {
            self.temp *= self.annealing_rate;
        }
    }

    core_access!();
}

// ---- Random-restart hill climbing ----

/// Hill climbing that jumps to a random position every `n_iter_restart`
/// exploring trials.
#[derive(Debug, Clone)]
pub struct RandomRestartHillClimbing {
    core: SearchCore,
    climb: ClimbState,
    n_iter_restart: usize,
    since_restart: usize,
}

impl RandomRestartHillClimbing {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            climb: ClimbState::default(),
            n_iter_restart: 10,
            since_restart: 0,
        }
    }

    climb_settings!();

    pub fn with_n_iter_restart(mut self, n: usize) -> Self {
        self.n_iter_restart = n.max(1);
        self
    }
}

impl Optimizer for RandomRestartHillClimbing {
    fn name(&self) -> &str {
        "random_restart_hill_climbing"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.climb.propose(&mut self.core, |_| true)
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        let exploring = !self.core.is_initializing();
        self.climb
            .observe(&mut self.core, &proposal.position, score, |new, current, _| {
                is_better(new, current)
            });
        if !exploring {
            return;
        }
        self.since_restart += 1;
        if self.since_restart >= self.n_iter_restart {
            self.since_restart = 0;
            debug!(n_iter_restart = self.n_iter_restart, "random restart");
            self.core.restart();
        }
    }

    core_access!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{InitConfig, SearchPhase, StrategyOptions};
    use gfo_types::Position;

    fn line() -> Arc<SearchSpace> {
        Arc::new(SearchSpace::builder().add_int("x0", -5, 5).build().unwrap())
    }

    fn plane() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -10, 10)
                .add_int("y", -10, 10)
                .build()
                .unwrap(),
        )
    }

    /// Internal score of -(x² + y²) for a plane position.
    fn bowl(space: &SearchSpace, p: &Position) -> f64 {
        let params = space.parameters(p);
        let x = params["x"].as_f64().unwrap();
        let y = params["y"].as_f64().unwrap();
        -(x * x + y * y)
    }

    fn run<O: Optimizer>(opt: &mut O, space: &SearchSpace, n: usize) -> f64 {
        for _ in 0..n {
            let proposal = opt.propose().unwrap();
            let score = bowl(space, &proposal.position);
            opt.observe(&proposal, score);
        }
        opt.best().unwrap().score
    }

    #[test]
    fn hill_climbing_walks_uphill() {
        let space = plane();
        let mut opt = HillClimbing::new(space.clone())
            .with_epsilon(0.1)
            .with_seed(7)
            .with_initialize(InitConfig::random(1));
        let best = run(&mut opt, &space, 200);
        assert!(best > -10.0, "best was {best}");
        assert_eq!(opt.phase(), SearchPhase::Exploring);
    }

    #[test]
    fn current_only_moves_to_better_neighbours() {
        let space = line();
        let mut opt = HillClimbing::new(space.clone())
            .with_n_neighbours(1)
            .with_seed(3)
            .with_initialize(InitConfig::random(1));
        let mut last_current = f64::NEG_INFINITY;
        for _ in 0..50 {
            let p = opt.propose().unwrap();
            let x = space.parameters(&p.position)["x0"].as_f64().unwrap();
            opt.observe(&p, -x * x);
            let current = opt.core().tracker().current_score().unwrap();
            assert!(current >= last_current);
            last_current = current;
        }
    }

    #[test]
    fn stochastic_acceptance_shrinks_with_loss() {
        let equal = stochastic_acceptance(0.5, 1.0, 1.0, 1.0);
        let slightly = stochastic_acceptance(0.5, 1.0, 0.9, 1.0);
        let much = stochastic_acceptance(0.5, 1.0, -5.0, 1.0);
        assert!((equal - 0.5).abs() < 1e-12);
        assert!(slightly < equal && much < slightly);
    }

    #[test]
    fn stochastic_hill_climbing_finds_a_good_region() {
        let space = plane();
        let mut opt = StochasticHillClimbing::new(space.clone())
            .with_epsilon(0.1)
            .with_p_accept(0.1)
            .with_seed(11);
        assert!(run(&mut opt, &space, 200) > -20.0);
    }

    #[test]
    fn annealing_cools_only_while_exploring() {
        let space = plane();
        let mut opt = SimulatedAnnealing::new(space.clone())
            .with_start_temp(2.0)
            .with_annealing_rate(0.5)
            .with_seed(5)
            .with_initialize(InitConfig::random(2));
        for _ in 0..2 {
            let p = opt.propose().unwrap();
            opt.observe(&p, bowl(&space, &p.position));
        }
        assert_eq!(opt.temperature(), 2.0);
        let p = opt.propose().unwrap();
        opt.observe(&p, bowl(&space, &p.position));
        assert_eq!(opt.temperature(), 1.0);
    }

    #[test]
    fn random_restart_reenters_initialization_on_schedule() {
        let space = plane();
        let mut opt = RandomRestartHillClimbing::new(space.clone())
            .with_n_iter_restart(5)
            .with_seed(13)
            .with_initialize(InitConfig::random(1));
        let mut restarts = 0;
        for _ in 0..30 {
            let p = opt.propose().unwrap();
            opt.observe(&p, bowl(&space, &p.position));
            if opt.phase() == SearchPhase::Initializing {
                restarts += 1;
            }
        }
        assert!(restarts >= 4, "restarts = {restarts}");
    }

    #[test]
    fn rand_rest_p_of_one_gives_random_proposals() {
        let space = plane();
        let mut opt = HillClimbing::new(space.clone())
            .with_epsilon(0.0)
            .with_rand_rest_p(1.0)
            .with_seed(17)
            .with_initialize(InitConfig::random(1));
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..20 {
            let p = opt.propose().unwrap();
            distinct.insert(p.position.clone());
            opt.observe(&p, bowl(&space, &p.position));
        }
        assert!(distinct.len() > 10);
    }
}

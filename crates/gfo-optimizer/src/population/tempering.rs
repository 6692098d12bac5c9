use rand::Rng;
use std::sync::Arc;
use tracing::trace;

use gfo_types::{GfoResult, SearchSpace, StepDistribution};

use super::{random_restart, Individual, Population};
use crate::core::SearchCore;
use crate::local::normalized_delta;
use crate::search::{AgentId, Optimizer, Proposal};

/// Probability of exchanging the states of two chains. The score gap is
/// normalized the same way single-chain acceptance normalizes it.
pub(crate) fn swap_probability(score_i: f64, temp_i: f64, score_j: f64, temp_j: f64) -> f64 {
    let exponent = normalized_delta(score_j, score_i) * (1.0 / temp_i - 1.0 / temp_j);
    if exponent.is_nan() {
        return 0.0;
    }
    exponent.exp().min(1.0)
}

/// Annealing chains at fixed, geometrically spaced temperatures that
/// periodically try to exchange states.
#[derive(Debug, Clone)]
pub struct ParallelTempering {
    core: SearchCore,
    population: Population,
    n_iter_swap: usize,
    base_temp: f64,
    temp_ratio: f64,
    epsilon: f64,
    since_swap: usize,
}

impl ParallelTempering {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        let mut this = Self {
            core: SearchCore::new(space),
            population: Population::new(5, 0.03, StepDistribution::Normal),
            n_iter_swap: 5,
            base_temp: 0.1,
            temp_ratio: 3.0,
            epsilon: 0.03,
            since_swap: 0,
        };
        this.rebuild();
        this
    }

    fn rebuild(&mut self) {
        let n = self.population.len();
        self.population.resize(n, self.epsilon, StepDistribution::Normal);
        for (k, chain) in self.population.individuals.iter_mut().enumerate() {
            chain.set_temperature(self.base_temp * self.temp_ratio.powi(k as i32));
        }
    }

    pub fn with_population(mut self, size: usize) -> Self {
        self.population.resize(size, self.epsilon, StepDistribution::Normal);
        self.rebuild();
        self
    }

    pub fn with_n_iter_swap(mut self, n: usize) -> Self {
        self.n_iter_swap = n.max(1);
        self
    }

    pub fn with_base_temp(mut self, temp: f64) -> Self {
        self.base_temp = temp;
        self.rebuild();
        self
    }

    pub fn with_temp_ratio(mut self, ratio: f64) -> Self {
        self.temp_ratio = ratio;
        self.rebuild();
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self.rebuild();
        self
    }

    pub fn temperatures(&self) -> Vec<f64> {
        self.population
            .individuals
            .iter()
            .filter_map(Individual::temperature)
            .collect()
    }

    fn attempt_swap(&mut self) {
        let n = self.population.len();
        if n < 2 {
            return;
        }
        let rng = self.core.rng();
        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        let chains = &self.population.individuals;
        let (Some((_, si)), Some((_, sj))) = (chains[i].current(), chains[j].current()) else {
            return;
        };
        let (ti, tj) = (
            chains[i].temperature().unwrap_or(1.0),
            chains[j].temperature().unwrap_or(1.0),
        );
        let p = swap_probability(si, ti, sj, tj);
        if self.core.rng().gen::<f64>() < p {
            trace!(i, j, p, "swapping chains");
            let (lo, hi) = (i.min(j), i.max(j));
            let (left, right) = self.population.individuals.split_at_mut(hi);
            left[lo].swap_current(&mut right[0]);
        }
    }
}

impl Optimizer for ParallelTempering {
    fn name(&self) -> &str {
        "parallel_tempering"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(proposal) = self.population.propose_init(&mut self.core)? {
            return Ok(proposal);
        }
        let i = self.population.next_agent();
        if let Some(proposal) = random_restart(&mut self.core, i)? {
            return Ok(proposal);
        }
        let position = self.population.individuals[i].mutate(&mut self.core)?;
        Ok(Proposal::new(position, AgentId(i)))
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.core.record(&proposal.position, score);
        if self.core.is_initializing() {
            self.population.observe_init(proposal, score);
            return;
        }
        if let Some(chain) = self.population.individuals.get_mut(proposal.agent.0) {
            chain.accept(&proposal.position, score, self.core.rng());
        }
        self.since_swap += 1;
        if self.since_swap >= self.n_iter_swap {
            self.since_swap = 0;
            self.attempt_swap();
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

//! Population-based strategies. Every proposal names the individual that
//! owns it so the score is routed back to the right agent.

mod differential;
mod genetic;
mod swarm;
mod tempering;

pub use differential::DifferentialEvolution;
pub use genetic::{EvolutionStrategy, GeneticAlgorithm};
pub use swarm::ParticleSwarm;
pub use tempering::ParallelTempering;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use gfo_types::{GfoResult, Position, StepDistribution};

use crate::core::SearchCore;
use crate::local::metropolis;
use crate::search::{AgentId, Proposal};
use crate::tracker::{is_better, PositionTracker};

/// One member of a population: its own current/best positions, a climbing
/// mutator and an acceptance rule.
#[derive(Debug, Clone)]
pub struct Individual {
    id: AgentId,
    tracker: PositionTracker,
    epsilon: f64,
    distribution: StepDistribution,
    /// `Some` switches acceptance from greedy to Metropolis.
    temperature: Option<f64>,
}

impl Individual {
    pub fn new(id: usize, epsilon: f64, distribution: StepDistribution) -> Self {
        Self {
            id: AgentId(id),
            tracker: PositionTracker::new(),
            epsilon,
            distribution,
            temperature: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn set_temperature(&mut self, temp: f64) {
        self.temperature = Some(temp);
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn current(&self) -> Option<(&Position, f64)> {
        self.tracker.current()
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.tracker.current_position()
    }

    pub fn best_position(&self) -> Option<&Position> {
        self.tracker.best_position()
    }

    pub fn best_score(&self) -> f64 {
        self.tracker.best_score().unwrap_or(f64::NEG_INFINITY)
    }

    /// Feasible climb from the current position.
    pub fn mutate(&self, core: &mut SearchCore) -> GfoResult<Position> {
        match self.tracker.current_position() {
            Some(from) => core.climb(from, self.epsilon, self.distribution),
            None => core.random_feasible(),
        }
    }

    /// Move to `position` when the acceptance rule allows it. The personal
    /// best is updated either way.
    pub fn accept(&mut self, position: &Position, score: f64, rng: &mut ChaCha8Rng) -> bool {
        self.tracker.record(position, score);
        let take = match self.tracker.current_score() {
            None => true,
            Some(current) => match self.temperature {
                Some(temp) => metropolis(score, current, temp, rng),
                None => is_better(score, current),
            },
        };
        if take {
            self.tracker.set_current(position.clone(), score);
        }
        take
    }

    /// Move to `position` unconditionally.
    pub fn adopt(&mut self, position: &Position, score: f64) {
        self.tracker.record(position, score);
        self.tracker.set_current(position.clone(), score);
    }

    /// Swap current states with another individual (parallel tempering).
    pub fn swap_current(&mut self, other: &mut Individual) {
        let mine = self.tracker.current().map(|(p, s)| (p.clone(), s));
        let theirs = other.tracker.current().map(|(p, s)| (p.clone(), s));
        match theirs {
            Some((p, s)) => self.adopt(&p, s),
            None => self.tracker.clear_current(),
        }
        match mine {
            Some((p, s)) => other.adopt(&p, s),
            None => other.tracker.clear_current(),
        }
    }
}

/// The individuals of one strategy plus round-robin bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct Population {
    pub individuals: Vec<Individual>,
    n_init: usize,
    cursor: usize,
}

impl Population {
    pub fn new(size: usize, epsilon: f64, distribution: StepDistribution) -> Self {
        let individuals = (0..size.max(1))
            .map(|i| Individual::new(i, epsilon, distribution))
            .collect();
        Self {
            individuals,
            n_init: 0,
            cursor: 0,
        }
    }

    pub fn resize(&mut self, size: usize, epsilon: f64, distribution: StepDistribution) {
        *self = Self::new(size, epsilon, distribution);
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// Next initialization position, dealt round-robin to individuals.
    pub fn propose_init(&mut self, core: &mut SearchCore) -> GfoResult<Option<Proposal>> {
        core.set_min_init(self.len());
        let Some(position) = core.next_init()? else {
            return Ok(None);
        };
        let agent = AgentId(self.n_init % self.len());
        self.n_init += 1;
        Ok(Some(Proposal::new(position, agent)))
    }

    /// Next individual in round-robin order.
    pub fn next_agent(&mut self) -> usize {
        let i = self.cursor % self.len();
        self.cursor = (self.cursor + 1) % self.len();
        i
    }

    pub fn get_mut(&mut self, agent: AgentId) -> Option<&mut Individual> {
        self.individuals.get_mut(agent.0)
    }

    /// Indices sorted by personal best, best first.
    pub fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            self.individuals[b]
                .best_score()
                .partial_cmp(&self.individuals[a].best_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// Best personal-best position across the population.
    pub fn global_best(&self) -> Option<&Position> {
        self.ranked()
            .first()
            .and_then(|&i| self.individuals[i].best_position())
    }

    #[cfg(test)]
    pub fn current_positions(&self) -> Vec<Position> {
        self.individuals
            .iter()
            .filter_map(|i| i.current_position().cloned())
            .collect()
    }

    /// Route an observation made during initialization.
    pub fn observe_init(&mut self, proposal: &Proposal, score: f64) {
        if let Some(individual) = self.get_mut(proposal.agent) {
            individual.tracker.record(&proposal.position, score);
            individual.tracker.offer_current(&proposal.position, score);
        }
    }
}

/// Fully random proposal on behalf of `agent` when the `rand_rest_p` roll
/// hits, `None` otherwise.
pub(crate) fn random_restart(core: &mut SearchCore, agent: usize) -> GfoResult<Option<Proposal>> {
    if !core.random_restart_due() {
        return Ok(None);
    }
    Ok(Some(Proposal::new(core.random_feasible()?, AgentId(agent))))
}

/// Drive `opt` through initialization with a flat score, then count how
/// many of the next `n_trials` exploring proposals land at least `min_gap`
/// indices away from every position `anchors` reports.
#[cfg(test)]
pub(crate) fn count_far_jumps<O, F>(opt: &mut O, anchors: F, n_trials: usize, min_gap: f64) -> usize
where
    O: crate::search::Optimizer,
    F: Fn(&O) -> Vec<Position>,
{
    let mut far = 0;
    let mut counted = 0;
    while counted < n_trials {
        let proposal = opt.propose().unwrap();
        if !opt.core().is_initializing() {
            let x = proposal.position.to_f64()[0];
            if anchors(opt).iter().all(|a| (a.to_f64()[0] - x).abs() >= min_gap) {
                far += 1;
            }
            counted += 1;
        }
        opt.observe(&proposal, 0.0);
    }
    far
}

/// One integer axis wide enough that a uniform draw rarely lands next to
/// any given point.
#[cfg(test)]
pub(crate) fn wide_line() -> std::sync::Arc<gfo_types::SearchSpace> {
    std::sync::Arc::new(
        gfo_types::SearchSpace::builder()
            .add_int("x", 0, 10_000)
            .build()
            .unwrap(),
    )
}

/// Crossover that picks each coordinate from one of the parents.
///
/// With two or more parents and dimensions, the first slot comes from
/// parent `a ∈ {0, 1}` and the last slot from parent `1 - a`, so the child
/// always mixes at least two parents; middle slots are drawn uniformly.
/// Returns `None` when there are no parents.
pub fn discrete_recombination<R: Rng + ?Sized>(parents: &[&Position], rng: &mut R) -> Option<Position> {
    let first = parents.first()?;
    let k = parents.len();
    let d = first.len();
    if k == 1 {
        return Some((*first).clone());
    }
    if d == 1 {
        return Some(parents[rng.gen_range(0..k)].clone());
    }

    let a = rng.gen_range(0..2);
    let indices = (0..d)
        .map(|slot| {
            let parent = if slot == 0 {
                a
            } else if slot == d - 1 {
                1 - a
            } else {
                rng.gen_range(0..k)
            };
            parents[parent][slot]
        })
        .collect();
    Some(Position::new(indices))
}

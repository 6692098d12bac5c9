use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use gfo_types::{GfoResult, Position, SearchSpace, StepDistribution};

use super::{discrete_recombination, random_restart, Population};
use crate::core::SearchCore;
use crate::search::{AgentId, Optimizer, Proposal};

/// Evolution settings shared by the genetic algorithm and the evolution
/// strategy.
#[derive(Debug, Clone, Copy)]
struct Rates {
    mutation: f64,
    crossover: f64,
}

impl Rates {
    /// True when this trial should mutate rather than cross over.
    fn roll_mutation(&self, rng: &mut impl Rng) -> bool {
        let total = self.mutation + self.crossover;
        if total <= 0.0 {
            return true;
        }
        rng.gen::<f64>() * total < self.mutation
    }
}

// ---- Genetic algorithm ----

/// Each trial picks a random individual; it either mutates (climbs) or
/// breeds a generation of `offspring` children from parents drawn out of
/// the fittest half. Children are queued and scored one per trial, each
/// routed to one of the worst individuals. A child replaces its individual
/// only if it scores better, unless `replace_parents` is set.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    core: SearchCore,
    population: Population,
    n_parents: usize,
    offspring: usize,
    replace_parents: bool,
    rates: Rates,
    epsilon: f64,
    distribution: StepDistribution,
    /// Bred children waiting for a trial, with the individual each targets.
    brood: VecDeque<(Position, usize)>,
    /// The proposal in flight is a bred child.
    breeding: bool,
}

impl GeneticAlgorithm {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        let epsilon = 0.03;
        let distribution = StepDistribution::Normal;
        Self {
            core: SearchCore::new(space),
            population: Population::new(10, epsilon, distribution),
            n_parents: 2,
            offspring: 1,
            replace_parents: false,
            rates: Rates {
                mutation: 0.7,
                crossover: 0.3,
            },
            epsilon,
            distribution,
            brood: VecDeque::new(),
            breeding: false,
        }
    }

    pub fn with_population(mut self, size: usize) -> Self {
        self.population.resize(size, self.epsilon, self.distribution);
        self.brood.clear();
        self
    }

    pub fn with_n_parents(mut self, n: usize) -> Self {
        self.n_parents = n.max(2);
        self
    }

    /// Children bred per crossover generation.
    pub fn with_offspring(mut self, n: usize) -> Self {
        self.offspring = n.max(1);
        self
    }

    pub fn with_replace_parents(mut self, replace: bool) -> Self {
        self.replace_parents = replace;
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.rates.mutation = rate.max(0.0);
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.rates.crossover = rate.max(0.0);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self.population.resize(self.population.len(), epsilon, self.distribution);
        self.brood.clear();
        self
    }

    pub fn population_size(&self) -> usize {
        self.population.len()
    }

    /// Children bred but not yet proposed.
    pub fn pending_offspring(&self) -> usize {
        self.brood.len()
    }

    /// Queue a generation of children. The k-th child targets the k-th
    /// worst individual, wrapping around for broods larger than the
    /// population.
    fn breed(&mut self) -> GfoResult<()> {
        let ranked = self.population.ranked();
        let n = ranked.len();
        let fittest = &ranked[..(n / 2).max(self.n_parents).min(n)];
        let chosen: Vec<usize> = fittest
            .choose_multiple(self.core.rng(), self.n_parents)
            .copied()
            .collect();
        let parents: Vec<Position> = chosen
            .iter()
            .filter_map(|&i| self.population.individuals[i].current_position().cloned())
            .collect();
        let parents: Vec<&Position> = parents.iter().collect();

        for k in 0..self.offspring {
            let target = ranked[n - 1 - k % n];
            let child = match discrete_recombination(&parents, self.core.rng()) {
                Some(child) => self.core.feasible_from(child)?,
                None => self.population.individuals[target].mutate(&mut self.core)?,
            };
            self.brood.push_back((child, target));
        }
        debug!(offspring = self.offspring, n_parents = parents.len(), "bred a generation");
        Ok(())
    }

    fn next_child(&mut self) -> Option<Proposal> {
        let (child, target) = self.brood.pop_front()?;
        self.breeding = true;
        Some(Proposal::new(child, AgentId(target)))
    }
}

impl Optimizer for GeneticAlgorithm {
    fn name(&self) -> &str {
        "genetic_algorithm"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.breeding = false;
        if let Some(proposal) = self.population.propose_init(&mut self.core)? {
            return Ok(proposal);
        }
        if let Some(proposal) = self.next_child() {
            return Ok(proposal);
        }

        let i = self.core.rng().gen_range(0..self.population.len());
        if let Some(proposal) = random_restart(&mut self.core, i)? {
            return Ok(proposal);
        }
        if self.population.len() >= 2 && !self.rates.roll_mutation(self.core.rng()) {
            self.breed()?;
            if let Some(proposal) = self.next_child() {
                return Ok(proposal);
            }
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
        let Some(individual) = self.population.individuals.get_mut(proposal.agent.0) else {
            return;
        };
        if self.breeding && self.replace_parents {
            individual.adopt(&proposal.position, score);
        } else {
            individual.accept(&proposal.position, score, self.core.rng());
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

// ---- Evolution strategy ----

/// Mutation-dominant evolution: the acting individual either climbs or
/// recombines with the population's best; the result is accepted greedily
/// by the acting individual.
#[derive(Debug, Clone)]
pub struct EvolutionStrategy {
    core: SearchCore,
    population: Population,
    rates: Rates,
    epsilon: f64,
    distribution: StepDistribution,
}

impl EvolutionStrategy {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        let epsilon = 0.03;
        let distribution = StepDistribution::Normal;
        Self {
            core: SearchCore::new(space),
            population: Population::new(10, epsilon, distribution),
            rates: Rates {
                mutation: 0.7,
                crossover: 0.3,
            },
            epsilon,
            distribution,
        }
    }

    pub fn with_population(mut self, size: usize) -> Self {
        self.population.resize(size, self.epsilon, self.distribution);
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.rates.mutation = rate.max(0.0);
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.rates.crossover = rate.max(0.0);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self.population.resize(self.population.len(), epsilon, self.distribution);
        self
    }
}

impl Optimizer for EvolutionStrategy {
    fn name(&self) -> &str {
        "evolution_strategy"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(proposal) = self.population.propose_init(&mut self.core)? {
            return Ok(proposal);
        }
        let i = self.population.next_agent();
        if let Some(proposal) = random_restart(&mut self.core, i)? {
            return Ok(proposal);
        }
        if self.population.len() < 2 || self.rates.roll_mutation(self.core.rng()) {
            let position = self.population.individuals[i].mutate(&mut self.core)?;
            return Ok(Proposal::new(position, AgentId(i)));
        }

        let best = self.population.ranked()[0];
        let parents: Vec<&Position> = [i, best]
            .iter()
            .filter_map(|&j| self.population.individuals[j].current_position())
            .collect();
        let position = match discrete_recombination(&parents, self.core.rng()) {
            Some(child) => self.core.feasible_from(child)?,
            None => self.population.individuals[i].mutate(&mut self.core)?,
        };
        Ok(Proposal::new(position, AgentId(i)))
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.core.record(&proposal.position, score);
        if self.core.is_initializing() {
            self.population.observe_init(proposal, score);
            return;
        }
        if let Some(individual) = self.population.individuals.get_mut(proposal.agent.0) {
            individual.accept(&proposal.position, score, self.core.rng());
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

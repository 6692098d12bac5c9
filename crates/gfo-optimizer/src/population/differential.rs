use rand::Rng;
use std::sync::Arc;

use gfo_types::{GfoResult, SearchSpace, StepDistribution};

use super::{random_restart, Population};
use crate::core::SearchCore;
use crate::search::{AgentId, Optimizer, Proposal};

/// DE/rand/1/bin in index space. Targets are visited round-robin; the trial
/// vector replaces its target only when it scores better.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    core: SearchCore,
    population: Population,
    /// Differential weight `F`.
    mutation_rate: f64,
    /// Binomial crossover probability `CR`.
    crossover_rate: f64,
}

impl DifferentialEvolution {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            population: Population::new(10, 0.03, StepDistribution::Normal),
            mutation_rate: 0.9,
            crossover_rate: 0.9,
        }
    }

    pub fn with_population(mut self, size: usize) -> Self {
        self.population.resize(size, 0.03, StepDistribution::Normal);
        self
    }

    pub fn with_mutation_rate(mut self, f: f64) -> Self {
        self.mutation_rate = f;
        self
    }

    pub fn with_crossover_rate(mut self, cr: f64) -> Self {
        self.crossover_rate = cr.clamp(0.0, 1.0);
        self
    }

    /// Three donors other than `target`; repeats are allowed only when the
    /// population is too small to avoid them.
    fn donors(&mut self, target: usize) -> [usize; 3] {
        let n = self.population.len();
        let rng = self.core.rng();
        let mut picked: Vec<usize> = Vec::with_capacity(3);
        if n >= 4 {
            while picked.len() < 3 {
                let idx = rng.gen_range(0..n);
                if idx != target && !picked.contains(&idx) {
                    picked.push(idx);
                }
            }
        } else {
            while picked.len() < 3 {
                picked.push(rng.gen_range(0..n));
            }
        }
        [picked[0], picked[1], picked[2]]
    }

    fn trial_vector(&mut self, target: usize) -> Option<Vec<f64>> {
        let [a, b, c] = self.donors(target);
        let individuals = &self.population.individuals;
        let x = individuals[target].current_position()?.to_f64();
        let xa = individuals[a].current_position()?.to_f64();
        let xb = individuals[b].current_position()?.to_f64();
        let xc = individuals[c].current_position()?.to_f64();

        let d = x.len();
        let rng = self.core.rng();
        let j_rand = rng.gen_range(0..d.max(1));
        let trial = (0..d)
            .map(|j| {
                if j == j_rand || rng.gen::<f64>() < self.crossover_rate {
                    xa[j] + self.mutation_rate * (xb[j] - xc[j])
                } else {
                    x[j]
                }
            })
            .collect();
        Some(trial)
    }
}

impl Optimizer for DifferentialEvolution {
    fn name(&self) -> &str {
        "differential_evolution"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(proposal) = self.population.propose_init(&mut self.core)? {
            return Ok(proposal);
        }
        let target = self.population.next_agent();
        if let Some(proposal) = random_restart(&mut self.core, target)? {
            return Ok(proposal);
        }
        let position = match self.trial_vector(target) {
            Some(coords) => {
                let snapped = self.core.space().clamp(&coords);
                self.core.feasible_from(snapped)?
            }
            None => self.population.individuals[target].mutate(&mut self.core)?,
        };
        Ok(Proposal::new(position, AgentId(target)))
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

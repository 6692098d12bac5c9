use rand::Rng;
use std::sync::Arc;

use gfo_types::{GfoResult, Position, SearchSpace, StepDistribution};

use super::{random_restart, Population};
use crate::core::SearchCore;
use crate::search::{AgentId, Optimizer, Proposal};

/// Particle swarm in index space. Particles move unconditionally; personal
/// and global bests steer their velocities.
#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    core: SearchCore,
    population: Population,
    velocities: Vec<Vec<f64>>,
    inertia: f64,
    cognitive_weight: f64,
    social_weight: f64,
}

impl ParticleSwarm {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        let size = 10;
        Self {
            core: SearchCore::new(space),
            population: Population::new(size, 0.03, StepDistribution::Normal),
            velocities: vec![Vec::new(); size],
            inertia: 0.5,
            cognitive_weight: 0.5,
            social_weight: 0.5,
        }
    }

    pub fn with_population(mut self, size: usize) -> Self {
        self.population.resize(size, 0.03, StepDistribution::Normal);
        self.velocities = vec![Vec::new(); self.population.len()];
        self
    }

    pub fn with_inertia(mut self, w: f64) -> Self {
        self.inertia = w;
        self
    }

    pub fn with_cognitive_weight(mut self, c1: f64) -> Self {
        self.cognitive_weight = c1;
        self
    }

    pub fn with_social_weight(mut self, c2: f64) -> Self {
        self.social_weight = c2;
        self
    }

    /// Update particle `i`'s velocity and return its next raw coordinates.
    fn step(&mut self, i: usize) -> Option<Vec<f64>> {
        let individual = &self.population.individuals[i];
        let x = individual.current_position()?.to_f64();
        let personal = individual.best_position().map(Position::to_f64)?;
        let global = self.population.global_best().map(Position::to_f64)?;

        let velocity = &mut self.velocities[i];
        if velocity.len() != x.len() {
            *velocity = vec![0.0; x.len()];
        }
        let rng = self.core.rng();
        for j in 0..x.len() {
            let r1: f64 = rng.gen();
            let r2: f64 = rng.gen();
            velocity[j] = self.inertia * velocity[j]
                + self.cognitive_weight * r1 * (personal[j] - x[j])
                + self.social_weight * r2 * (global[j] - x[j]);
        }
        Some(x.iter().zip(velocity.iter()).map(|(xi, vi)| xi + vi).collect())
    }
}

impl Optimizer for ParticleSwarm {
    fn name(&self) -> &str {
        "particle_swarm"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(proposal) = self.population.propose_init(&mut self.core)? {
            return Ok(proposal);
        }
        let i = self.population.next_agent();
        if let Some(proposal) = random_restart(&mut self.core, i)? {
            return Ok(proposal);
        }
        let position = match self.step(i) {
            Some(coords) => {
                let snapped = self.core.space().clamp(&coords);
                if Some(&snapped) == self.population.individuals[i].current_position() {
                    // Stalled particle: nudge it so the swarm keeps sampling.
                    self.population.individuals[i].mutate(&mut self.core)?
                } else {
                    self.core.feasible_from(snapped)?
                }
            }
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
        if let Some(individual) = self.population.get_mut(proposal.agent) {
            individual.adopt(&proposal.position, score);
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

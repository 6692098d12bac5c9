//! The strategy abstraction: proposals, phases and the `Optimizer` trait.

use serde::{Deserialize, Serialize};
use std::fmt;

use gfo_types::{ConstraintSet, GfoResult, Parameters, Position};

use crate::core::SearchCore;
use crate::retry::RetryPolicy;
use crate::tracker::BestState;

/// Identifier of the sub-agent (individual, chain, particle) a proposal
/// belongs to. Single-agent strategies always use `AgentId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// A candidate position together with the agent that should observe its
/// score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub position: Position,
    pub agent: AgentId,
}

impl Proposal {
    pub fn new(position: Position, agent: AgentId) -> Self {
        Self { position, agent }
    }

    pub fn single(position: Position) -> Self {
        Self::new(position, AgentId(0))
    }
}

/// Lifecycle phase of a strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchPhase {
    #[default]
    Initializing,
    Exploring,
    Converged,
}

/// How the initial positions are chosen before a strategy starts its own
/// moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Evenly spread grid positions.
    pub grid: usize,
    /// Corners of the index hypercube.
    pub vertices: usize,
    /// Uniformly random positions.
    pub random: usize,
    /// Known-good parameter sets, evaluated first.
    pub warm_start: Vec<Parameters>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            grid: 4,
            vertices: 4,
            random: 2,
            warm_start: Vec::new(),
        }
    }
}

impl InitConfig {
    pub fn random(n: usize) -> Self {
        Self {
            grid: 0,
            vertices: 0,
            random: n,
            warm_start: Vec::new(),
        }
    }

    pub fn with_grid(mut self, n: usize) -> Self {
        self.grid = n;
        self
    }

    pub fn with_vertices(mut self, n: usize) -> Self {
        self.vertices = n;
        self
    }

    pub fn with_warm_start(mut self, params: Parameters) -> Self {
        self.warm_start.push(params);
        self
    }
}

/// Common trait for all optimization strategies.
///
/// Scores passed to [`observe`](Optimizer::observe) are internal scores:
/// higher is always better.
pub trait Optimizer: Send {
    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// Next feasible position to evaluate.
    fn propose(&mut self) -> GfoResult<Proposal>;

    /// Report the score of a proposal returned by [`propose`](Optimizer::propose).
    fn observe(&mut self, proposal: &Proposal, score: f64);

    fn core(&self) -> &SearchCore;

    fn core_mut(&mut self) -> &mut SearchCore;

    /// Positions evaluated before the configured initialization.
    fn warm_start(&mut self, positions: Vec<Position>) {
        self.core_mut().add_warm_start(positions);
    }

    fn phase(&self) -> SearchPhase {
        self.core().phase()
    }

    /// Called by the driver once the run stops.
    fn finish(&mut self) {
        self.core_mut().set_phase(SearchPhase::Converged);
    }

    fn best(&self) -> Option<&BestState> {
        self.core().tracker().best()
    }

    fn constraints(&self) -> &ConstraintSet {
        self.core().constraints()
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        (**self).propose()
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        (**self).observe(proposal, score)
    }

    fn core(&self) -> &SearchCore {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        (**self).core_mut()
    }

    fn warm_start(&mut self, positions: Vec<Position>) {
        (**self).warm_start(positions)
    }

    fn phase(&self) -> SearchPhase {
        (**self).phase()
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn best(&self) -> Option<&BestState> {
        (**self).best()
    }

    fn constraints(&self) -> &ConstraintSet {
        (**self).constraints()
    }
}

/// Builder-style settings shared by every strategy.
pub trait StrategyOptions: Optimizer + Sized {
    fn with_seed(mut self, seed: u64) -> Self {
        self.core_mut().reseed(seed);
        self
    }

    /// Replace the constraint set. It must be bound to the strategy's space.
    fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.core_mut().set_constraints(constraints);
        self
    }

    fn with_initialize(mut self, initialize: InitConfig) -> Self {
        self.core_mut().set_initialize(initialize);
        self
    }

    fn with_rand_rest_p(mut self, p: f64) -> Self {
        self.core_mut().set_rand_rest_p(p);
        self
    }

    fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.core_mut().set_retry(policy);
        self
    }
}

impl<O: Optimizer + Sized> StrategyOptions for O {}

//! # gfo-optimizer
//!
//! Gradient-free optimization strategies and the search driver.
//!
//! Provides position tracking and the constraint-retry loop, local search
//! (hill climbing variants, tabu, simplex, pattern search), population
//! methods (genetic, evolution strategy, differential evolution, particle
//! swarm, parallel tempering), surrogate-based sequence models and the
//! trial loop that drives any of them against an objective.

pub mod config;
pub mod core;
pub mod driver;
pub mod local;
pub mod population;
pub mod retry;
pub mod search;
pub mod smbo;
pub mod tracker;
pub mod trial;

pub use crate::core::SearchCore;
pub use config::{search, ClimbKnobs, ModelKnobs, RunConfig, StrategyConfig};
pub use driver::{CancellationToken, EarlyStopping, SearchDriver};
pub use local::{
    DownhillSimplex, HillClimbing, PatternSearch, RandomRestartHillClimbing, SimulatedAnnealing,
    StochasticHillClimbing, TabuSearch,
};
pub use population::{
    discrete_recombination, DifferentialEvolution, EvolutionStrategy, GeneticAlgorithm, Individual,
    ParallelTempering, ParticleSwarm,
};
pub use retry::{propose_until_feasible, RetryPolicy};
pub use search::{AgentId, InitConfig, Optimizer, Proposal, SearchPhase, StrategyOptions};
pub use smbo::{
    Acquisition, EnsembleRegressor, GaussianProcess, KNeighborsRegressor, ParzenEstimator,
    Prediction, SequenceModel, Surrogate, SurrogateTrainingSet,
};
pub use tracker::{is_better, BestState, PositionTracker};
pub use trial::{BestEvaluation, Evaluation, RunId, RunState, RunStatus, SearchResult, StopReason};

pub use gfo_types::*;

//! Serializable run configuration and the `search` entry points.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use gfo_types::{
    config_error, ConstraintSet, DimensionDef, GfoResult, ObjectiveDirection, Parameters,
    SearchSpace, StepDistribution,
};

use crate::driver::{EarlyStopping, SearchDriver};
use crate::local::{
    DownhillSimplex, HillClimbing, PatternSearch, RandomRestartHillClimbing, SimulatedAnnealing,
    StochasticHillClimbing, TabuSearch,
};
use crate::population::{
    DifferentialEvolution, EvolutionStrategy, GeneticAlgorithm, ParallelTempering, ParticleSwarm,
};
use crate::retry::RetryPolicy;
use crate::search::{InitConfig, Optimizer, StrategyOptions};
use crate::smbo::SequenceModel;
use crate::trial::SearchResult;

/// Step settings shared by the climbing strategies. Unset fields keep the
/// strategy's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbKnobs {
    pub epsilon: Option<f64>,
    pub distribution: Option<StepDistribution>,
    pub n_neighbours: Option<usize>,
}

/// Settings shared by the sequence-model strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelKnobs {
    pub warm_up: Option<usize>,
    pub refit_every: Option<usize>,
    pub max_sample_size: Option<usize>,
}

/// Which strategy to run and its knobs. Every knob is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    HillClimbing {
        #[serde(flatten)]
        climb: ClimbKnobs,
    },
    StochasticHillClimbing {
        #[serde(flatten)]
        climb: ClimbKnobs,
        #[serde(default)]
        p_accept: Option<f64>,
        #[serde(default)]
        norm_factor: Option<f64>,
    },
    SimulatedAnnealing {
        #[serde(flatten)]
        climb: ClimbKnobs,
        #[serde(default)]
        start_temp: Option<f64>,
        #[serde(default)]
        annealing_rate: Option<f64>,
    },
    RandomRestartHillClimbing {
        #[serde(flatten)]
        climb: ClimbKnobs,
        #[serde(default)]
        n_iter_restart: Option<usize>,
    },
    TabuSearch {
        #[serde(flatten)]
        climb: ClimbKnobs,
        #[serde(default)]
        tabu_memory: Option<usize>,
    },
    PatternSearch {
        #[serde(default)]
        n_positions: Option<usize>,
        #[serde(default)]
        pattern_size: Option<f64>,
        #[serde(default)]
        reduction: Option<f64>,
    },
    DownhillSimplex {
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        gamma: Option<f64>,
        #[serde(default)]
        beta: Option<f64>,
        #[serde(default)]
        sigma: Option<f64>,
    },
    GeneticAlgorithm {
        #[serde(default)]
        population: Option<usize>,
        #[serde(default)]
        n_parents: Option<usize>,
        #[serde(default)]
        offspring: Option<usize>,
        #[serde(default)]
        replace_parents: Option<bool>,
        #[serde(default)]
        mutation_rate: Option<f64>,
        #[serde(default)]
        crossover_rate: Option<f64>,
        #[serde(default)]
        epsilon: Option<f64>,
    },
    EvolutionStrategy {
        #[serde(default)]
        population: Option<usize>,
        #[serde(default)]
        mutation_rate: Option<f64>,
        #[serde(default)]
        crossover_rate: Option<f64>,
        #[serde(default)]
        epsilon: Option<f64>,
    },
    DifferentialEvolution {
        #[serde(default)]
        population: Option<usize>,
        #[serde(default)]
        mutation_rate: Option<f64>,
        #[serde(default)]
        crossover_rate: Option<f64>,
    },
    ParticleSwarm {
        #[serde(default)]
        population: Option<usize>,
        #[serde(default)]
        inertia: Option<f64>,
        #[serde(default)]
        cognitive_weight: Option<f64>,
        #[serde(default)]
        social_weight: Option<f64>,
    },
    ParallelTempering {
        #[serde(default)]
        population: Option<usize>,
        #[serde(default)]
        n_iter_swap: Option<usize>,
        #[serde(default)]
        base_temp: Option<f64>,
        #[serde(default)]
        temp_ratio: Option<f64>,
        #[serde(default)]
        epsilon: Option<f64>,
    },
    BayesianOptimization {
        #[serde(flatten)]
        model: ModelKnobs,
        #[serde(default)]
        xi: Option<f64>,
    },
    TreeStructuredParzen {
        #[serde(flatten)]
        model: ModelKnobs,
        #[serde(default)]
        gamma: Option<f64>,
    },
    EnsembleOptimizer {
        #[serde(flatten)]
        model: ModelKnobs,
        #[serde(default)]
        xi: Option<f64>,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::HillClimbing {
            climb: ClimbKnobs::default(),
        }
    }
}

/// Apply each `Some` value through the named builder method.
macro_rules! knobs {
    ($opt:expr $(, $value:expr => $method:ident)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut opt = $opt;
        $(
            if let Some(v) = $value {
                opt = opt.$method(v);
            }
        )*
        opt
    }};
}

macro_rules! climb {
    ($opt:expr, $climb:expr) => {
        knobs!($opt,
            $climb.epsilon => with_epsilon,
            $climb.distribution => with_distribution,
            $climb.n_neighbours => with_n_neighbours,
        )
    };
}

macro_rules! model {
    ($opt:expr, $model:expr) => {
        knobs!($opt,
            $model.warm_up => with_warm_up,
            $model.refit_every => with_refit_every,
            $model.max_sample_size => with_max_sample_size,
        )
    };
}

fn check_probability(name: &str, value: Option<f64>) -> GfoResult<()> {
    match value {
        Some(p) if !(0.0..=1.0).contains(&p) => {
            Err(config_error!("{name} must be within [0, 1], got {p}"))
        }
        _ => Ok(()),
    }
}

fn check_positive(name: &str, value: Option<f64>) -> GfoResult<()> {
    match value {
        Some(v) if !(v > 0.0 && v.is_finite()) => {
            Err(config_error!("{name} must be positive, got {v}"))
        }
        _ => Ok(()),
    }
}

fn check_nonzero(name: &str, value: Option<usize>) -> GfoResult<()> {
    match value {
        Some(0) => Err(config_error!("{name} must be at least 1")),
        _ => Ok(()),
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HillClimbing { .. } => "hill_climbing",
            Self::StochasticHillClimbing { .. } => "stochastic_hill_climbing",
            Self::SimulatedAnnealing { .. } => "simulated_annealing",
            Self::RandomRestartHillClimbing { .. } => "random_restart_hill_climbing",
            Self::TabuSearch { .. } => "tabu_search",
            Self::PatternSearch { .. } => "pattern_search",
            Self::DownhillSimplex { .. } => "downhill_simplex",
            Self::GeneticAlgorithm { .. } => "genetic_algorithm",
            Self::EvolutionStrategy { .. } => "evolution_strategy",
            Self::DifferentialEvolution { .. } => "differential_evolution",
            Self::ParticleSwarm { .. } => "particle_swarm",
            Self::ParallelTempering { .. } => "parallel_tempering",
            Self::BayesianOptimization { .. } => "bayesian_optimization",
            Self::TreeStructuredParzen { .. } => "tree_structured_parzen",
            Self::EnsembleOptimizer { .. } => "ensemble_optimizer",
        }
    }

    /// Reject knob values no strategy can run with.
    pub fn validate(&self) -> GfoResult<()> {
        let climb = match self {
            Self::HillClimbing { climb }
            | Self::StochasticHillClimbing { climb, .. }
            | Self::SimulatedAnnealing { climb, .. }
            | Self::RandomRestartHillClimbing { climb, .. }
            | Self::TabuSearch { climb, .. } => Some(climb),
            _ => None,
        };
        if let Some(climb) = climb {
            check_positive("epsilon", climb.epsilon)?;
            check_nonzero("n_neighbours", climb.n_neighbours)?;
        }

        match self {
            Self::StochasticHillClimbing { p_accept, norm_factor, .. } => {
                check_probability("p_accept", *p_accept)?;
                check_positive("norm_factor", *norm_factor)
            }
            Self::SimulatedAnnealing { start_temp, annealing_rate, .. } => {
                check_positive("start_temp", *start_temp)?;
                check_probability("annealing_rate", *annealing_rate)
            }
            Self::RandomRestartHillClimbing { n_iter_restart, .. } => {
                check_nonzero("n_iter_restart", *n_iter_restart)
            }
            Self::TabuSearch { tabu_memory, .. } => check_nonzero("tabu_memory", *tabu_memory),
            Self::PatternSearch { n_positions, pattern_size, reduction } => {
                check_nonzero("n_positions", *n_positions)?;
                check_positive("pattern_size", *pattern_size)?;
                check_probability("reduction", *reduction)
            }
            Self::DownhillSimplex { alpha, gamma, beta, sigma } => {
                check_positive("alpha", *alpha)?;
                check_positive("gamma", *gamma)?;
                check_probability("beta", *beta)?;
                check_probability("sigma", *sigma)
            }
            Self::GeneticAlgorithm {
                population,
                n_parents,
                offspring,
                mutation_rate,
                crossover_rate,
                epsilon,
                ..
            } => {
                check_nonzero("population", *population)?;
                check_nonzero("n_parents", *n_parents)?;
                check_nonzero("offspring", *offspring)?;
                check_probability("mutation_rate", *mutation_rate)?;
                check_probability("crossover_rate", *crossover_rate)?;
                check_positive("epsilon", *epsilon)
            }
            Self::EvolutionStrategy { population, mutation_rate, crossover_rate, epsilon } => {
                check_nonzero("population", *population)?;
                check_probability("mutation_rate", *mutation_rate)?;
                check_probability("crossover_rate", *crossover_rate)?;
                check_positive("epsilon", *epsilon)
            }
            Self::DifferentialEvolution { population, mutation_rate, crossover_rate } => {
                check_nonzero("population", *population)?;
                check_positive("mutation_rate", *mutation_rate)?;
                check_probability("crossover_rate", *crossover_rate)
            }
            Self::ParticleSwarm { population, .. } => check_nonzero("population", *population),
            Self::ParallelTempering { population, n_iter_swap, base_temp, temp_ratio, epsilon } => {
                check_nonzero("population", *population)?;
                check_nonzero("n_iter_swap", *n_iter_swap)?;
                check_positive("base_temp", *base_temp)?;
                check_positive("temp_ratio", *temp_ratio)?;
                check_positive("epsilon", *epsilon)
            }
            Self::BayesianOptimization { model, .. }
            | Self::TreeStructuredParzen { model, .. }
            | Self::EnsembleOptimizer { model, .. } => {
                check_nonzero("refit_every", model.refit_every)?;
                check_nonzero("max_sample_size", model.max_sample_size)?;
                if let Self::TreeStructuredParzen { gamma, .. } = self {
                    check_probability("gamma", *gamma)?;
                    check_positive("gamma", *gamma)?;
                }
                Ok(())
            }
            Self::HillClimbing { .. } => Ok(()),
        }
    }

    /// Build the strategy over the space the constraints are bound to.
    pub fn build(&self, constraints: ConstraintSet) -> GfoResult<Box<dyn Optimizer>> {
        self.validate()?;
        let space = Arc::clone(constraints.space());
        let optimizer: Box<dyn Optimizer> = match self {
            Self::HillClimbing { climb } => Box::new(climb!(HillClimbing::new(space), climb)),
            Self::StochasticHillClimbing { climb, p_accept, norm_factor } => Box::new(knobs!(
                climb!(StochasticHillClimbing::new(space), climb),
                *p_accept => with_p_accept,
                *norm_factor => with_norm_factor,
            )),
            Self::SimulatedAnnealing { climb, start_temp, annealing_rate } => Box::new(knobs!(
                climb!(SimulatedAnnealing::new(space), climb),
                *start_temp => with_start_temp,
                *annealing_rate => with_annealing_rate,
            )),
            Self::RandomRestartHillClimbing { climb, n_iter_restart } => Box::new(knobs!(
                climb!(RandomRestartHillClimbing::new(space), climb),
                *n_iter_restart => with_n_iter_restart,
            )),
            Self::TabuSearch { climb, tabu_memory } => Box::new(knobs!(
                climb!(TabuSearch::new(space), climb),
                *tabu_memory => with_tabu_memory,
            )),
            Self::PatternSearch { n_positions, pattern_size, reduction } => Box::new(knobs!(
                PatternSearch::new(space),
                *n_positions => with_n_positions,
                *pattern_size => with_pattern_size,
                *reduction => with_reduction,
            )),
            Self::DownhillSimplex { alpha, gamma, beta, sigma } => Box::new(knobs!(
                DownhillSimplex::new(space),
                *alpha => with_alpha,
                *gamma => with_gamma,
                *beta => with_beta,
                *sigma => with_sigma,
            )),
            Self::GeneticAlgorithm {
                population,
                n_parents,
                offspring,
                replace_parents,
                mutation_rate,
                crossover_rate,
                epsilon,
            } => {
                Box::new(knobs!(
                    GeneticAlgorithm::new(space),
                    *epsilon => with_epsilon,
                    *population => with_population,
                    *n_parents => with_n_parents,
                    *offspring => with_offspring,
                    *replace_parents => with_replace_parents,
                    *mutation_rate => with_mutation_rate,
                    *crossover_rate => with_crossover_rate,
                ))
            }
            Self::EvolutionStrategy { population, mutation_rate, crossover_rate, epsilon } => {
                Box::new(knobs!(
                    EvolutionStrategy::new(space),
                    *epsilon => with_epsilon,
                    *population => with_population,
                    *mutation_rate => with_mutation_rate,
                    *crossover_rate => with_crossover_rate,
                ))
            }
            Self::DifferentialEvolution { population, mutation_rate, crossover_rate } => {
                Box::new(knobs!(
                    DifferentialEvolution::new(space),
                    *population => with_population,
                    *mutation_rate => with_mutation_rate,
                    *crossover_rate => with_crossover_rate,
                ))
            }
            Self::ParticleSwarm { population, inertia, cognitive_weight, social_weight } => {
                Box::new(knobs!(
                    ParticleSwarm::new(space),
                    *population => with_population,
                    *inertia => with_inertia,
                    *cognitive_weight => with_cognitive_weight,
                    *social_weight => with_social_weight,
                ))
            }
            Self::ParallelTempering { population, n_iter_swap, base_temp, temp_ratio, epsilon } => {
                Box::new(knobs!(
                    ParallelTempering::new(space),
                    *epsilon => with_epsilon,
                    *population => with_population,
                    *n_iter_swap => with_n_iter_swap,
                    *base_temp => with_base_temp,
                    *temp_ratio => with_temp_ratio,
                ))
            }
            Self::BayesianOptimization { model, xi } => Box::new(knobs!(
                model!(SequenceModel::bayesian(space), model),
                *xi => with_xi,
            )),
            Self::TreeStructuredParzen { model, gamma } => Box::new(knobs!(
                model!(SequenceModel::tree_parzen(space), model),
                *gamma => with_gamma,
            )),
            Self::EnsembleOptimizer { model, xi } => Box::new(knobs!(
                model!(SequenceModel::ensemble(space), model),
                *xi => with_xi,
            )),
        };
        Ok(optimizer.with_constraints(constraints))
    }
}

fn default_n_iter() -> usize {
    100
}

fn default_memory() -> bool {
    true
}

/// Everything needed to run one search, loadable from JSON. Constraints
/// are code and are passed separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub search_space: Vec<DimensionDef>,
    #[serde(default)]
    pub initialize: InitConfig,
    /// Seed for every random choice the strategy makes.
    #[serde(default)]
    pub random_state: Option<u64>,
    #[serde(default)]
    pub rand_rest_p: f64,
    #[serde(default)]
    pub optimum: ObjectiveDirection,
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(default)]
    pub max_time_secs: Option<f64>,
    #[serde(default)]
    pub early_stopping: Option<EarlyStopping>,
    #[serde(default = "default_memory")]
    pub memory: bool,
    #[serde(default)]
    pub max_constraint_retries: Option<usize>,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl RunConfig {
    pub fn new(search_space: Vec<DimensionDef>, strategy: StrategyConfig) -> Self {
        Self {
            search_space,
            initialize: InitConfig::default(),
            random_state: None,
            rand_rest_p: 0.0,
            optimum: ObjectiveDirection::default(),
            n_iter: default_n_iter(),
            max_time_secs: None,
            early_stopping: None,
            memory: true,
            max_constraint_retries: None,
            strategy,
        }
    }

    pub fn from_json(json: &str) -> GfoResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> GfoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
        self
    }

    pub fn with_optimum(mut self, optimum: ObjectiveDirection) -> Self {
        self.optimum = optimum;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_initialize(mut self, initialize: InitConfig) -> Self {
        self.initialize = initialize;
        self
    }

    pub fn with_early_stopping(mut self, rule: EarlyStopping) -> Self {
        self.early_stopping = Some(rule);
        self
    }

    pub fn validate(&self) -> GfoResult<()> {
        if !(0.0..=1.0).contains(&self.rand_rest_p) {
            return Err(config_error!(
                "rand_rest_p must be within [0, 1], got {}",
                self.rand_rest_p
            ));
        }
        if self.max_constraint_retries == Some(0) {
            return Err(config_error!("max_constraint_retries must be at least 1"));
        }
        if let Some(rule) = &self.early_stopping {
            if rule.n_iter_no_change == 0 {
                return Err(config_error!("early_stopping.n_iter_no_change must be at least 1"));
            }
        }
        self.max_time()?;
        self.strategy.validate()
    }

    fn max_time(&self) -> GfoResult<Option<Duration>> {
        self.max_time_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| config_error!("max_time_secs must be a non-negative number, got {secs}"))
            })
            .transpose()
    }

    pub fn build_space(&self) -> GfoResult<Arc<SearchSpace>> {
        Ok(Arc::new(SearchSpace::from_defs(&self.search_space)?))
    }

    /// Build the configured strategy with seed, initialization and retry
    /// policy applied.
    pub fn build_optimizer(&self, constraints: ConstraintSet) -> GfoResult<Box<dyn Optimizer>> {
        let mut optimizer = self
            .strategy
            .build(constraints)?
            .with_initialize(self.initialize.clone())
            .with_rand_rest_p(self.rand_rest_p);
        if let Some(seed) = self.random_state {
            optimizer = optimizer.with_seed(seed);
        }
        if let Some(max_attempts) = self.max_constraint_retries {
            optimizer = optimizer.with_retry(RetryPolicy::new(max_attempts));
        }
        Ok(optimizer)
    }

    /// Run without constraints.
    pub fn run<F>(&self, objective: F) -> GfoResult<SearchResult>
    where
        F: FnMut(&Parameters) -> anyhow::Result<f64>,
    {
        self.run_constrained(|set| set, objective)
    }

    /// Run with constraints attached to the freshly built space.
    pub fn run_constrained<C, F>(&self, constraints: C, objective: F) -> GfoResult<SearchResult>
    where
        C: FnOnce(ConstraintSet) -> ConstraintSet,
        F: FnMut(&Parameters) -> anyhow::Result<f64>,
    {
        self.validate()?;
        let space = self.build_space()?;
        let optimizer = self.build_optimizer(constraints(ConstraintSet::new(space)))?;
        let mut driver = SearchDriver::new(optimizer, self.n_iter)
            .with_direction(self.optimum)
            .with_memory(self.memory);
        if let Some(rule) = &self.early_stopping {
            driver = driver.with_early_stopping(rule.clone());
        }
        if let Some(budget) = self.max_time()? {
            driver = driver.with_max_time(budget);
        }
        driver.run(objective)
    }
}

/// Run `strategy` on `space` for `n_iter` trials in the `optimum`
/// direction with default settings. A `random_state` makes the run
/// reproducible.
pub fn search<F>(
    strategy: &StrategyConfig,
    space: Arc<SearchSpace>,
    objective: F,
    n_iter: usize,
    optimum: ObjectiveDirection,
    random_state: Option<u64>,
) -> GfoResult<SearchResult>
where
    F: FnMut(&Parameters) -> anyhow::Result<f64>,
{
    let mut optimizer = strategy.build(ConstraintSet::new(space))?;
    if let Some(seed) = random_state {
        optimizer = optimizer.with_seed(seed);
    }
    SearchDriver::new(optimizer, n_iter)
        .with_direction(optimum)
        .run(objective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfo_types::{DimensionKind, GfoError};

    fn all_strategies() -> Vec<StrategyConfig> {
        let names = [
            "hill_climbing",
            "stochastic_hill_climbing",
            "simulated_annealing",
            "random_restart_hill_climbing",
            "tabu_search",
            "pattern_search",
            "downhill_simplex",
            "genetic_algorithm",
            "evolution_strategy",
            "differential_evolution",
            "particle_swarm",
            "parallel_tempering",
            "bayesian_optimization",
            "tree_structured_parzen",
            "ensemble_optimizer",
        ];
        names
            .iter()
            .map(|kind| serde_json::from_str(&format!(r#"{{"kind": "{kind}"}}"#)).unwrap())
            .collect()
    }

    fn json_config() -> &'static str {
        r#"{
            "search_space": [
                {"name": "x", "kind": {"int_range": {"low": -5, "high": 5, "step": 1}}},
                {"name": "y", "kind": {"int_range": {"low": -5, "high": 5, "step": 1}}}
            ],
            "random_state": 7,
            "optimum": "minimum",
            "n_iter": 40,
            "strategy": {"kind": "simulated_annealing", "epsilon": 0.1, "start_temp": 2.0}
        }"#
    }

    fn xy(p: &Parameters) -> (f64, f64) {
        (p["x"].as_f64().unwrap(), p["y"].as_f64().unwrap())
    }

    #[test]
    fn parses_a_full_config() {
        let config = RunConfig::from_json(json_config()).unwrap();
        assert_eq!(config.optimum, ObjectiveDirection::Minimize);
        assert_eq!(config.n_iter, 40);
        assert!(config.memory);
        assert_eq!(config.initialize, InitConfig::default());
        assert!(matches!(
            config.strategy,
            StrategyConfig::SimulatedAnnealing {
                climb: ClimbKnobs { epsilon: Some(_), .. },
                start_temp: Some(_),
                annealing_rate: None,
            }
        ));
        assert!(matches!(
            config.search_space[0].kind,
            DimensionKind::IntRange { .. }
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = RunConfig::from_json(json_config()).unwrap();
        let again = RunConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn every_strategy_builds_and_runs() {
        let space = Arc::new(
            SearchSpace::builder()
                .add_int("x", -5, 5)
                .add_int("y", -5, 5)
                .build()
                .unwrap(),
        );
        for strategy in all_strategies() {
            let name = strategy.name();
            let opt = strategy
                .build(ConstraintSet::new(Arc::clone(&space)))
                .unwrap()
                .with_seed(1);
            assert_eq!(opt.name(), name);
            let result = SearchDriver::new(opt, 25)
                .run(|p| {
                    let (x, y) = xy(p);
                    Ok(-(x * x + y * y))
                })
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(result.n_trials, 25, "{name}");
            assert_eq!(result.optimizer, name);
        }
    }

    #[test]
    fn seeded_config_runs_replay() {
        let config = RunConfig::from_json(json_config()).unwrap();
        let objective = |p: &Parameters| -> anyhow::Result<f64> {
            let (x, y) = xy(p);
            Ok((x - 1.0).powi(2) + (y + 2.0).powi(2))
        };
        let a = config.run(objective).unwrap();
        let b = config.run(objective).unwrap();
        let positions = |r: &SearchResult| r.evaluations.iter().map(|e| e.position.clone()).collect::<Vec<_>>();
        assert_eq!(positions(&a), positions(&b));
        assert_eq!(a.best_score(), b.best_score());
        assert!(a.best_score().unwrap() <= 2.0);
    }

    #[test]
    fn constrained_run_stays_feasible() {
        let config = RunConfig::from_json(json_config()).unwrap();
        let result = config
            .run_constrained(
                |set| set.with_fn("x above y", |p: &Parameters| xy(p).0 > xy(p).1),
                |p| {
                    let (x, y) = xy(p);
                    Ok(x * x + y * y)
                },
            )
            .unwrap();
        assert!(result.evaluations.iter().all(|e| {
            let (x, y) = xy(&e.parameters);
            x > y
        }));
    }

    #[test]
    fn invalid_knobs_are_config_errors() {
        let bad = [
            r#"{"kind": "stochastic_hill_climbing", "p_accept": 1.5}"#,
            r#"{"kind": "genetic_algorithm", "population": 0}"#,
            r#"{"kind": "genetic_algorithm", "offspring": 0}"#,
            r#"{"kind": "parallel_tempering", "base_temp": -1.0}"#,
            r#"{"kind": "tree_structured_parzen", "gamma": 0.0}"#,
        ];
        for json in bad {
            let strategy: StrategyConfig = serde_json::from_str(json).unwrap();
            assert!(matches!(strategy.validate(), Err(GfoError::Config(_))), "{json}");
        }

        let mut config = RunConfig::from_json(json_config()).unwrap();
        config.max_time_secs = Some(-1.0);
        assert!(matches!(config.validate(), Err(GfoError::Config(_))));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = RunConfig::from_json("{\"search_space\": 3}").unwrap_err();
        assert!(matches!(err, GfoError::Serialization(_)));
    }

    #[test]
    fn search_entry_point_minimizes() {
        let space = Arc::new(SearchSpace::builder().add_int("x0", -5, 5).build().unwrap());
        let result = search(
            &StrategyConfig::default(),
            space,
            |p| Ok(p["x0"].as_f64().unwrap().powi(2)),
            30,
            ObjectiveDirection::Minimize,
            None,
        )
        .unwrap();
        assert!(result.best_score().unwrap() < 5.0);
    }

    #[test]
    fn seeded_search_replays() {
        let space = Arc::new(SearchSpace::builder().add_int("x0", -50, 50).build().unwrap());
        let strategy: StrategyConfig =
            serde_json::from_str(r#"{"kind": "particle_swarm", "population": 4}"#).unwrap();
        let run = || {
            search(
                &strategy,
                Arc::clone(&space),
                |p| Ok((p["x0"].as_f64().unwrap() * 0.2).cos()),
                30,
                ObjectiveDirection::Maximize,
                Some(17),
            )
            .unwrap()
            .evaluations
            .into_iter()
            .map(|e| e.position)
            .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    fn plane() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -5, 5)
                .add_int("y", -5, 5)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn every_strategy_stays_feasible_and_replays() {
        let space = plane();
        let trace = |r: &SearchResult| {
            r.evaluations
                .iter()
                .map(|e| (e.position.clone(), e.score))
                .collect::<Vec<_>>()
        };
        for strategy in all_strategies() {
            let name = strategy.name();
            let run = || {
                let constraints = ConstraintSet::new(Arc::clone(&space))
                    .with_fn("x above y", |p: &Parameters| xy(p).0 > xy(p).1);
                let opt = strategy.build(constraints).unwrap().with_seed(21);
                SearchDriver::new(opt, 30)
                    .run(|p| {
                        let (x, y) = xy(p);
                        Ok(-((x - 2.0).powi(2) + (y + 1.0).powi(2)))
                    })
                    .unwrap_or_else(|e| panic!("{name}: {e}"))
            };
            let first = run();
            let second = run();
            assert_eq!(first.n_trials, 30, "{name}");
            assert!(
                first.evaluations.iter().all(|e| {
                    let (x, y) = xy(&e.parameters);
                    x > y
                }),
                "{name} evaluated an infeasible position"
            );
            assert_eq!(trace(&first), trace(&second), "{name} did not replay");
        }
    }

    #[test]
    fn every_strategy_is_direction_symmetric() {
        let space = plane();
        for strategy in all_strategies() {
            let name = strategy.name();
            let run = |direction: ObjectiveDirection, sign: f64| {
                let opt = strategy
                    .build(ConstraintSet::new(Arc::clone(&space)))
                    .unwrap()
                    .with_seed(5);
                SearchDriver::new(opt, 30)
                    .with_direction(direction)
                    .run(|p| {
                        let (x, y) = xy(p);
                        Ok(sign * ((x - 1.0).powi(2) + (y - 2.0).powi(2)))
                    })
                    .unwrap_or_else(|e| panic!("{name}: {e}"))
            };
            let min = run(ObjectiveDirection::Minimize, 1.0);
            let max = run(ObjectiveDirection::Maximize, -1.0);
            assert_eq!(min.best_position(), max.best_position(), "{name}");
            assert_eq!(min.best_score().map(|s| -s), max.best_score(), "{name}");
        }
    }
}

//! Sequential model-based strategies: a surrogate is fitted to the scores
//! seen so far and the next position maximizes an acquisition over
//! unseen feasible candidates.

mod acquisition;
mod gp;
mod parzen;
mod surrogate;

pub use acquisition::{expected_improvement, Acquisition};
pub use gp::GaussianProcess;
pub use parzen::ParzenEstimator;
pub use surrogate::{EnsembleRegressor, KNeighborsRegressor, Prediction, Surrogate};

use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use gfo_types::{surrogate_error, GfoResult, Position, SearchSpace};

use crate::core::SearchCore;
use crate::search::{Optimizer, Proposal};

/// Candidates handed to one `predict` call on the rayon pool.
const PREDICT_CHUNK: usize = 256;

/// Observed positions in value space with their internal scores. Each
/// position enters at most once.
#[derive(Debug, Clone, Default)]
pub struct SurrogateTrainingSet {
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
    positions: HashSet<Position>,
}

impl SurrogateTrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation. Returns `false` when the position is already
    /// present.
    pub fn push(&mut self, position: Position, features: Vec<f64>, target: f64) -> bool {
        if !self.positions.insert(position) {
            return false;
        }
        self.features.push(features);
        self.targets.push(target);
        true
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.positions.contains(position)
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn best_target(&self) -> Option<f64> {
        self.targets.iter().copied().reduce(f64::max)
    }
}

/// A surrogate plus acquisition driven strategy. The named constructors
/// give the Bayesian, tree-structured Parzen and ensemble variants.
pub struct SequenceModel {
    core: SearchCore,
    name: &'static str,
    training: SurrogateTrainingSet,
    surrogate: Box<dyn Surrogate>,
    acquisition: Acquisition,
    warm_up: usize,
    refit_every: usize,
    max_sample_size: usize,
    fits: usize,
    fitted_len: Option<usize>,
    model_ready: bool,
}

impl fmt::Debug for SequenceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceModel")
            .field("name", &self.name)
            .field("surrogate", &self.surrogate.name())
            .field("acquisition", &self.acquisition)
            .field("training_len", &self.training.len())
            .field("fits", &self.fits)
            .finish()
    }
}

impl SequenceModel {
    pub fn with_surrogate(
        space: Arc<SearchSpace>,
        surrogate: Box<dyn Surrogate>,
        acquisition: Acquisition,
    ) -> Self {
        Self {
            core: SearchCore::new(space),
            name: "sequence_model",
            training: SurrogateTrainingSet::new(),
            surrogate,
            acquisition,
            warm_up: 10,
            refit_every: 1,
            max_sample_size: 10_000,
            fits: 0,
            fitted_len: None,
            model_ready: false,
        }
    }

    /// Gaussian process with expected improvement.
    pub fn bayesian(space: Arc<SearchSpace>) -> Self {
        let mut this = Self::with_surrogate(
            space,
            Box::new(GaussianProcess::new()),
            Acquisition::default(),
        );
        this.name = "bayesian_optimization";
        this
    }

    /// Good/bad Parzen density ratio, maximized directly.
    pub fn tree_parzen(space: Arc<SearchSpace>) -> Self {
        let mut this = Self::with_surrogate(
            space,
            Box::new(ParzenEstimator::default()),
            Acquisition::Mean,
        );
        this.name = "tree_structured_parzen";
        this
    }

    /// GP and two k-neighbour regressors, averaged, with expected
    /// improvement on their disagreement.
    pub fn ensemble(space: Arc<SearchSpace>) -> Self {
        let members: Vec<Box<dyn Surrogate>> = vec![
            Box::new(GaussianProcess::new()),
            Box::new(KNeighborsRegressor::new(3)),
            Box::new(KNeighborsRegressor::new(7)),
        ];
        let mut this = Self::with_surrogate(
            space,
            Box::new(EnsembleRegressor::new(members)),
            Acquisition::default(),
        );
        this.name = "ensemble_optimizer";
        this
    }

    /// Observations collected before the surrogate is first used.
    pub fn with_warm_up(mut self, n: usize) -> Self {
        self.warm_up = n;
        self
    }

    /// New observations required before the surrogate is refitted.
    pub fn with_refit_every(mut self, n: usize) -> Self {
        self.refit_every = n.max(1);
        self
    }

    /// Candidate count above which the space is sampled instead of
    /// enumerated.
    pub fn with_max_sample_size(mut self, n: usize) -> Self {
        self.max_sample_size = n.max(1);
        self
    }

    /// Exploration margin for expected improvement. No effect on the mean
    /// acquisition.
    pub fn with_xi(mut self, xi: f64) -> Self {
        if let Acquisition::ExpectedImprovement { .. } = self.acquisition {
            self.acquisition = Acquisition::ExpectedImprovement { xi };
        }
        self
    }

    /// Replace the surrogate with a Parzen estimator splitting at `gamma`.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.surrogate = Box::new(ParzenEstimator::new(gamma));
        self.acquisition = Acquisition::Mean;
        self.fitted_len = None;
        self.model_ready = false;
        self
    }

    pub fn training(&self) -> &SurrogateTrainingSet {
        &self.training
    }

    /// Surrogate fits attempted so far.
    pub fn fit_count(&self) -> usize {
        self.fits
    }

    fn refit_if_due(&mut self) -> GfoResult<()> {
        let n = self.training.len();
        let due = match self.fitted_len {
            None => true,
            Some(last) => n >= last + self.refit_every,
        };
        if due {
            self.fitted_len = Some(n);
            self.fits += 1;
            self.model_ready = false;
            self.surrogate
                .fit(self.training.features(), self.training.targets())?;
            self.model_ready = true;
            debug!(surrogate = self.surrogate.name(), n_samples = n, "surrogate fitted");
        }
        if self.model_ready {
            Ok(())
        } else {
            Err(surrogate_error!("no usable {} fit", self.surrogate.name()))
        }
    }

    /// Unseen feasible positions: the whole space when it is small enough,
    /// otherwise a random sample of `max_sample_size`.
    fn candidates(&mut self) -> Vec<Position> {
        let space = Arc::clone(self.core.space());
        let pool = match space.enumerate(self.max_sample_size) {
            Some(all) => all,
            None => (0..self.max_sample_size)
                .map(|_| space.random_position(self.core.rng()))
                .collect(),
        };
        let tracker = self.core.tracker();
        let constraints = self.core.constraints();
        pool.into_iter()
            .filter(|p| !self.training.contains(p) && tracker.seen(p).is_none())
            .filter(|p| constraints.not_in_constraint(p))
            .collect()
    }

    fn propose_from_model(&mut self) -> GfoResult<Option<Position>> {
        self.refit_if_due()?;
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Ok(None);
        }

        let space = Arc::clone(self.core.space());
        let features: Vec<Vec<f64>> = candidates.par_iter().map(|p| space.features(p)).collect();
        let surrogate: &dyn Surrogate = self.surrogate.as_ref();
        let predictions: Vec<Prediction> = features
            .par_chunks(PREDICT_CHUNK)
            .map(|chunk| surrogate.predict(chunk))
            .collect::<GfoResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        if predictions.len() != candidates.len() {
            return Err(surrogate_error!(
                "{} returned {} predictions for {} candidates",
                surrogate.name(),
                predictions.len(),
                candidates.len()
            ));
        }

        let best = self.training.best_target().unwrap_or(f64::NEG_INFINITY);
        let acquisition = self.acquisition;
        let mut choice: Option<(usize, f64, f64)> = None;
        for (i, prediction) in predictions.iter().enumerate() {
            let value = acquisition.score(prediction, best);
            if value.is_nan() {
                continue;
            }
            let wins = match choice {
                None => true,
                Some((_, v, m)) => value > v || (value == v && prediction.mean > m),
            };
            if wins {
                choice = Some((i, value, prediction.mean));
            }
        }
        Ok(choice.map(|(i, _, _)| candidates[i].clone()))
    }
}

impl Optimizer for SequenceModel {
    fn name(&self) -> &str {
        self.name
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        if let Some(position) = self.core.next_init()? {
            return Ok(Proposal::single(position));
        }
        if self.training.len() < self.warm_up || self.core.random_restart_due() {
            return Ok(Proposal::single(self.core.random_feasible()?));
        }
        match self.propose_from_model() {
            Ok(Some(position)) => Ok(Proposal::single(position)),
            Ok(None) => Ok(Proposal::single(self.core.random_feasible()?)),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "surrogate unavailable, sampling at random");
                Ok(Proposal::single(self.core.random_feasible()?))
            }
            Err(err) => Err(err),
        }
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.core.record(&proposal.position, score);
        if score.is_finite() {
            let features = self.core.space().features(&proposal.position);
            self.training
                .push(proposal.position.clone(), features, score);
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
    use crate::search::StrategyOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plane() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -10, 10)
                .add_int("y", -10, 10)
                .build()
                .unwrap(),
        )
    }

    fn bowl(space: &SearchSpace, p: &Position) -> f64 {
        let params = space.parameters(p);
        let x = params["x"].as_f64().unwrap();
        let y = params["y"].as_f64().unwrap();
        -((x - 3.0).powi(2) + (y + 2.0).powi(2))
    }

    /// Predicts the negated squared norm and counts its fits.
    struct CountingSurrogate {
        fits: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Surrogate for CountingSurrogate {
        fn name(&self) -> &str {
            "counting"
        }

        fn fit(&mut self, _: &[Vec<f64>], _: &[f64]) -> GfoResult<()> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(surrogate_error!("always fails"))
            } else {
                Ok(())
            }
        }

        fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>> {
            Ok(features
                .iter()
                .map(|x| Prediction {
                    mean: -x.iter().map(|v| v * v).sum::<f64>(),
                    std: 0.0,
                })
                .collect())
        }
    }

    fn run(opt: &mut SequenceModel, space: &SearchSpace, n: usize) {
        for _ in 0..n {
            let p = opt.propose().unwrap();
            assert!(space.contains(&p.position));
            opt.observe(&p, bowl(space, &p.position));
        }
    }

    #[test]
    fn training_set_ignores_repeated_positions() {
        let mut set = SurrogateTrainingSet::new();
        assert!(set.push(Position::new(vec![1, 2]), vec![1.0, 2.0], 0.5));
        assert!(!set.push(Position::new(vec![1, 2]), vec![1.0, 2.0], 0.9));
        assert!(set.push(Position::new(vec![2, 2]), vec![2.0, 2.0], -1.0));
        assert_eq!(set.len(), 2);
        assert_eq!(set.best_target(), Some(0.5));
    }

    #[test]
    fn training_set_grows_by_one_per_new_position() {
        let space = plane();
        let mut opt = SequenceModel::bayesian(space.clone()).with_seed(1);
        for _ in 0..15 {
            let before = opt.training().len();
            let p = opt.propose().unwrap();
            let fresh = !opt.training().contains(&p.position);
            let score = bowl(&space, &p.position);
            opt.observe(&p, score);
            opt.observe(&p, score);
            assert_eq!(opt.training().len(), before + usize::from(fresh));
        }
    }

    #[test]
    fn non_finite_scores_stay_out_of_the_training_set() {
        let space = plane();
        let mut opt = SequenceModel::bayesian(space).with_seed(2);
        let p = opt.propose().unwrap();
        opt.observe(&p, f64::NEG_INFINITY);
        assert!(opt.training().is_empty());
        assert_eq!(opt.core().tracker().n_recorded(), 1);
    }

    #[test]
    fn refits_are_batched() {
        let space = plane();
        let fits = Arc::new(AtomicUsize::new(0));
        let surrogate = CountingSurrogate {
            fits: Arc::clone(&fits),
            fail: false,
        };
        let mut opt = SequenceModel::with_surrogate(space.clone(), Box::new(surrogate), Acquisition::Mean)
            .with_warm_up(10)
            .with_refit_every(3)
            .with_seed(3);
        let trials = 40;
        run(&mut opt, &space, trials);

        let bound = (trials - 10).div_ceil(3) + 1;
        let fitted = fits.load(Ordering::SeqCst);
        assert!(fitted >= 1);
        assert!(fitted <= bound, "{fitted} fits exceeds {bound}");
        assert_eq!(opt.fit_count(), fitted);
    }

    #[test]
    fn failing_surrogate_falls_back_to_random() {
        let space = plane();
        let fits = Arc::new(AtomicUsize::new(0));
        let surrogate = CountingSurrogate {
            fits: Arc::clone(&fits),
            fail: true,
        };
        let mut opt = SequenceModel::with_surrogate(space.clone(), Box::new(surrogate), Acquisition::Mean)
            .with_warm_up(5)
            .with_seed(4);
        run(&mut opt, &space, 30);
        assert!(fits.load(Ordering::SeqCst) > 0);
        assert_eq!(opt.core().tracker().n_recorded(), 30);
    }

    #[test]
    fn model_proposals_are_unseen() {
        let space = plane();
        let surrogate = CountingSurrogate {
            fits: Arc::new(AtomicUsize::new(0)),
            fail: false,
        };
        let mut opt = SequenceModel::with_surrogate(space.clone(), Box::new(surrogate), Acquisition::Mean)
            .with_warm_up(3)
            .with_seed(5);
        let mut seen = HashSet::new();
        for _ in 0..40 {
            let p = opt.propose().unwrap();
            if !opt.core().is_initializing() && opt.training().len() >= 3 {
                assert!(seen.insert(p.position.clone()), "repeated {:?}", p.position);
            } else {
                seen.insert(p.position.clone());
            }
            opt.observe(&p, bowl(&space, &p.position));
        }
    }

    #[test]
    fn bayesian_optimization_finds_the_bowl() {
        let space = plane();
        let mut opt = SequenceModel::bayesian(space.clone()).with_seed(7);
        run(&mut opt, &space, 30);
        assert_eq!(opt.name(), "bayesian_optimization");
        assert!(opt.best().unwrap().score > -5.0);
    }

    #[test]
    fn tree_parzen_and_ensemble_run() {
        let space = plane();
        let mut tpe = SequenceModel::tree_parzen(space.clone()).with_gamma(0.3).with_seed(8);
        run(&mut tpe, &space, 30);
        assert!(tpe.best().unwrap().score > -40.0);

        let mut ens = SequenceModel::ensemble(space.clone()).with_max_sample_size(100).with_seed(9);
        run(&mut ens, &space, 25);
        assert!(ens.fit_count() > 0);
    }
}

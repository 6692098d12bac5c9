//! Nelder–Mead over the continuous relaxation of index space.

use std::sync::Arc;
use tracing::debug;

use gfo_types::{GfoResult, Position, SearchSpace, StepDistribution};

use crate::core::SearchCore;
use crate::search::{Optimizer, Proposal};
use crate::tracker::is_better;

#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// Gathering the d + 1 starting vertices.
    Collect,
    Reflect,
    Expand { reflected: (Vec<f64>, f64) },
    Contract { reflected: (Vec<f64>, f64) },
    Shrink { next: usize },
}

#[derive(Debug, Clone)]
pub struct DownhillSimplex {
    core: SearchCore,
    alpha: f64,
    gamma: f64,
    beta: f64,
    sigma: f64,
    simplex: Vec<(Vec<f64>, f64)>,
    step: Step,
    pending: Option<Vec<f64>>,
    /// The proposal in flight is a random restart rather than a simplex move.
    random_trial: bool,
}

impl DownhillSimplex {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            core: SearchCore::new(space),
            alpha: 1.0,
            gamma: 2.0,
            beta: 0.5,
            sigma: 0.5,
            simplex: Vec::new(),
            step: Step::Collect,
            pending: None,
            random_trial: false,
        }
    }

    /// Reflection coefficient.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Expansion coefficient.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Contraction coefficient.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Shrink coefficient.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    fn n_vertices(&self) -> usize {
        self.core.space().dimension_count() + 1
    }

    fn sort_simplex(&mut self) {
        self.simplex
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Centroid of every vertex but the worst.
    fn centroid(&self) -> Vec<f64> {
        let keep = &self.simplex[..self.simplex.len() - 1];
        let d = keep[0].0.len();
        let mut c = vec![0.0; d];
        for (x, _) in keep {
            for (ci, xi) in c.iter_mut().zip(x) {
                *ci += xi;
            }
        }
        c.iter_mut().for_each(|ci| *ci /= keep.len() as f64);
        c
    }

    fn degenerate(&self) -> bool {
        let space = self.core.space();
        let first = space.clamp(&self.simplex[0].0);
        self.simplex.iter().all(|(x, _)| space.clamp(x) == first)
    }

    /// Snap `coords` to a feasible position and remember it as pending.
    fn submit(&mut self, coords: Vec<f64>) -> GfoResult<Proposal> {
        let snapped = self.core.space().clamp(&coords);
        let position = self.core.feasible_from(snapped)?;
        self.pending = Some(position.to_f64());
        Ok(Proposal::single(position))
    }

    fn replace_worst(&mut self, vertex: (Vec<f64>, f64)) {
        if let Some(last) = self.simplex.last_mut() {
            *last = vertex;
        }
        self.step = Step::Reflect;
    }

    fn collect(&mut self, position: &Position, score: f64) {
        let coords = position.to_f64();
        if self.simplex.iter().any(|(x, _)| *x == coords) {
            return;
        }
        if self.simplex.len() < self.n_vertices() {
            self.simplex.push((coords, score));
        } else if is_better(score, self.simplex[self.simplex.len() - 1].1) {
            self.replace_worst((coords, score));
        }
        if self.simplex.len() >= self.n_vertices() {
            self.sort_simplex();
            self.step = Step::Reflect;
        }
    }
}

impl Optimizer for DownhillSimplex {
    fn name(&self) -> &str {
        "downhill_simplex"
    }

    fn propose(&mut self) -> GfoResult<Proposal> {
        self.random_trial = false;
        if let Some(position) = self.core.next_init()? {
            return Ok(Proposal::single(position));
        }

        if self.step == Step::Reflect && self.degenerate() {
            debug!("simplex collapsed, rebuilding around the best vertex");
            self.simplex.truncate(1);
            self.step = Step::Collect;
        }

        // Random restarts only replace the start of a reflection round.
        if self.step == Step::Reflect && self.core.random_restart_due() {
            self.pending = None;
            self.random_trial = true;
            return Ok(Proposal::single(self.core.random_feasible()?));
        }

        match self.step.clone() {
            Step::Collect => {
                let from = match self.simplex.first() {
                    Some((x, _)) => self.core.space().clamp(x),
                    None => self.core.random_feasible()?,
                };
                let position = self.core.climb(&from, 0.1, StepDistribution::Normal)?;
                self.pending = None;
                Ok(Proposal::single(position))
            }
            Step::Reflect => {
                let c = self.centroid();
                let worst = &self.simplex[self.simplex.len() - 1].0;
                let xr = c
                    .iter()
                    .zip(worst)
                    .map(|(ci, wi)| ci + self.alpha * (ci - wi))
                    .collect();
                self.submit(xr)
            }
            Step::Expand { reflected } => {
                let c = self.centroid();
                let xe = c
                    .iter()
                    .zip(&reflected.0)
                    .map(|(ci, ri)| ci + self.gamma * (ri - ci))
                    .collect();
                self.submit(xe)
            }
            Step::Contract { .. } => {
                let c = self.centroid();
                let worst = &self.simplex[self.simplex.len() - 1].0;
                let xc = c
                    .iter()
                    .zip(worst)
                    .map(|(ci, wi)| ci + self.beta * (wi - ci))
                    .collect();
                self.submit(xc)
            }
            Step::Shrink { next } => {
                let best = &self.simplex[0].0;
                let xs = best
                    .iter()
                    .zip(&self.simplex[next].0)
                    .map(|(bi, xi)| bi + self.sigma * (xi - bi))
                    .collect();
                self.submit(xs)
            }
        }
    }

    fn observe(&mut self, proposal: &Proposal, score: f64) {
        self.core.record(&proposal.position, score);
        if std::mem::take(&mut self.random_trial) {
            // A lucky random point can still displace the worst vertex.
            self.collect(&proposal.position, score);
            return;
        }
        if self.core.is_initializing() || self.step == Step::Collect {
            self.core.tracker_mut().offer_current(&proposal.position, score);
            self.collect(&proposal.position, score);
            return;
        }

        let Some(coords) = self.pending.take() else {
            return;
        };
        let n = self.simplex.len();
        let best = self.simplex[0].1;
        let second_worst = self.simplex[n - 2].1;
        let worst = self.simplex[n - 1].1;

        match self.step.clone() {
            Step::Reflect => {
                if is_better(score, best) {
                    self.step = Step::Expand {
                        reflected: (coords, score),
                    };
                } else if is_better(score, second_worst) {
                    self.replace_worst((coords, score));
                } else {
                    self.step = Step::Contract {
                        reflected: (coords, score),
                    };
                }
            }
            Step::Expand { reflected } => {
                if is_better(score, reflected.1) {
                    self.replace_worst((coords, score));
                } else {
                    self.replace_worst(reflected);
                }
            }
            Step::Contract { reflected } => {
                if is_better(score, worst) {
                    self.replace_worst((coords, score));
                } else if is_better(reflected.1, worst) {
                    self.replace_worst(reflected);
                } else {
                    self.step = Step::Shrink { next: 1 };
                }
            }
            Step::Shrink { next } => {
                self.simplex[next] = (coords, score);
                self.step = if next + 1 < n {
                    Step::Shrink { next: next + 1 }
                } else {
                    Step::Reflect
                };
            }
            Step::Collect => {}
        }

        if self.step == Step::Reflect {
            self.sort_simplex();
            let (x, s) = &self.simplex[0];
            let position = self.core.space().clamp(x);
            self.core.tracker_mut().set_current(position, *s);
        }
    }

    fn core(&self) -> &SearchCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }
}

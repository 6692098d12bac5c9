//! The trial loop: propose, evaluate, observe.
//!
//! The driver is the only place that knows the objective direction. It
//! converts raw scores to the internal "higher is better" scale once,
//! before they reach the strategy, and converts back when reporting.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use gfo_types::{GfoError, GfoResult, ObjectiveDirection, Parameters, Position};

use crate::search::Optimizer;
use crate::trial::{Evaluation, RunStatus, SearchResult, StopReason};

/// Stop when the best score has not improved for `n_iter_no_change`
/// trials. With tolerances set, smaller gains do not count as improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub n_iter_no_change: usize,
    #[serde(default)]
    pub tol_abs: Option<f64>,
    /// Fraction of the current best's magnitude.
    #[serde(default)]
    pub tol_rel: Option<f64>,
}

impl EarlyStopping {
    pub fn new(n_iter_no_change: usize) -> Self {
        Self {
            n_iter_no_change: n_iter_no_change.max(1),
            tol_abs: None,
            tol_rel: None,
        }
    }

    pub fn with_tol_abs(mut self, tol: f64) -> Self {
        self.tol_abs = Some(tol);
        self
    }

    pub fn with_tol_rel(mut self, tol: f64) -> Self {
        self.tol_rel = Some(tol);
        self
    }

    fn is_improvement(&self, score: f64, best: f64) -> bool {
        let gain = score - best;
        if !(gain > 0.0) {
            return false;
        }
        if self.tol_abs.is_some_and(|tol| gain <= tol) {
            return false;
        }
        if self.tol_rel.is_some_and(|tol| gain <= tol * best.abs()) {
            return false;
        }
        true
    }
}

#[derive(Debug)]
struct StallCounter {
    rule: EarlyStopping,
    best: Option<f64>,
    stalled: usize,
}

impl StallCounter {
    fn new(rule: EarlyStopping) -> Self {
        Self {
            rule,
            best: None,
            stalled: 0,
        }
    }

    /// Feed one internal score; `true` once the run should stop.
    fn observe(&mut self, score: f64) -> bool {
        match self.best {
            None if score.is_finite() => {
                self.best = Some(score);
                self.stalled = 0;
            }
            Some(best) if self.rule.is_improvement(score, best) => {
                self.best = Some(score);
                self.stalled = 0;
            }
            Some(best) => {
                self.best = Some(best.max(score));
                self.stalled += 1;
            }
            None => self.stalled += 1,
        }
        self.stalled >= self.rule.n_iter_no_change
    }
}

/// Cooperative stop flag, checked between trials.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one strategy against one objective.
pub struct SearchDriver<O: Optimizer> {
    optimizer: O,
    n_iter: usize,
    direction: ObjectiveDirection,
    early_stopping: Option<EarlyStopping>,
    max_time: Option<Duration>,
    memory: bool,
    warm_start: Vec<Parameters>,
    cancel: Option<CancellationToken>,
    /// First `(raw, internal)` score of every evaluated position.
    memo: HashMap<Position, (f64, f64)>,
}

impl<O: Optimizer> SearchDriver<O> {
    pub fn new(optimizer: O, n_iter: usize) -> Self {
        Self {
            optimizer,
            n_iter,
            direction: ObjectiveDirection::default(),
            early_stopping: None,
            max_time: None,
            memory: true,
            warm_start: Vec::new(),
            cancel: None,
            memo: HashMap::new(),
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_early_stopping(mut self, rule: EarlyStopping) -> Self {
        self.early_stopping = Some(rule);
        self
    }

    pub fn with_max_time(mut self, budget: Duration) -> Self {
        self.max_time = Some(budget);
        self
    }

    /// Reuse the first score of a position instead of re-evaluating it.
    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    /// Parameter sets evaluated before the strategy's own initialization.
    pub fn with_warm_start(mut self, warm_start: Vec<Parameters>) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn into_optimizer(self) -> O {
        self.optimizer
    }

    fn stop_before_trial(&self, started: Instant) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(StopReason::Cancelled);
        }
        if self.max_time.is_some_and(|budget| started.elapsed() >= budget) {
            return Some(StopReason::TimeBudget);
        }
        None
    }

    /// Run up to `n_iter` trials. Objective errors abort the run.
    pub fn run<F>(&mut self, mut objective: F) -> GfoResult<SearchResult>
    where
        F: FnMut(&Parameters) -> anyhow::Result<f64>,
    {
        let space = Arc::clone(self.optimizer.core().space());
        let direction = self.direction;
        let mut status = RunStatus::new(self.optimizer.name(), direction);
        status.mark_running();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            run_id = %status.id,
            optimizer = self.optimizer.name(),
            n_iter = self.n_iter,
            %direction,
            "Starting search"
        );

        if !self.warm_start.is_empty() {
            let positions = self
                .warm_start
                .iter()
                .map(|params| space.position_of(params))
                .collect::<GfoResult<Vec<_>>>()?;
            self.optimizer.warm_start(positions);
        }

        let mut stall = self.early_stopping.clone().map(StallCounter::new);
        let mut evaluations = Vec::with_capacity(self.n_iter);
        let mut stop_reason = StopReason::Completed;

        for trial in 0..self.n_iter {
            if let Some(reason) = self.stop_before_trial(started) {
                stop_reason = reason;
                break;
            }

            let proposal = match self.optimizer.propose() {
                Ok(p) => p,
                Err(err) => {
                    status.mark_failed(err.to_string());
                    return Err(err);
                }
            };
            let position = proposal.position.clone();
            if !space.contains(&position) || !self.optimizer.constraints().not_in_constraint(&position) {
                let err = GfoError::Internal(format!(
                    "{} proposed infeasible position {:?}",
                    self.optimizer.name(),
                    position
                ));
                status.mark_failed(err.to_string());
                return Err(err);
            }
            let parameters = space.parameters(&position);

            let remembered = if self.memory {
                self.memo.get(&position).copied()
            } else {
                None
            };
            let (score, internal_score, cached) = match remembered {
                Some((raw, internal)) => (raw, internal, true),
                None => {
                    let raw = match objective(&parameters) {
                        Ok(raw) => raw,
                        Err(err) => {
                            warn!(trial, error = %err, "objective failed");
                            status.mark_failed(err.to_string());
                            return Err(GfoError::Objective(err));
                        }
                    };
                    let internal = if raw.is_finite() {
                        direction.to_internal(raw)
                    } else {
                        warn!(trial, score = raw, "non-finite objective score, treating as worst");
                        f64::NEG_INFINITY
                    };
                    if self.memory {
                        self.memo.entry(position.clone()).or_insert((raw, internal));
                    }
                    (raw, internal, false)
                }
            };

            self.optimizer.observe(&proposal, internal_score);

            let evaluation = Evaluation {
                trial,
                position,
                parameters,
                score,
                internal_score,
                cached,
                agent: proposal.agent,
                recorded_at: Utc::now(),
            };
            let improved = status.update_best(&evaluation);
            debug!(
                trial,
                agent = %evaluation.agent,
                score,
                cached,
                improved,
                phase = ?self.optimizer.phase(),
                "trial evaluated"
            );
            evaluations.push(evaluation);

            if stall.as_mut().is_some_and(|s| s.observe(internal_score)) {
                stop_reason = StopReason::EarlyStopping;
                break;
            }
        }

        self.optimizer.finish();
        match stop_reason {
            StopReason::Cancelled => status.mark_cancelled(),
            _ => status.mark_completed(),
        }

        let result = SearchResult {
            run_id: status.id,
            optimizer: status.optimizer.clone(),
            direction,
            best: status.best.clone(),
            n_trials: status.trials_completed,
            n_objective_calls: status.objective_calls,
            stop_reason,
            evaluations,
            started_at,
            finished_at: status.finished_at.unwrap_or_else(Utc::now),
        };
        info!(
            run_id = %result.run_id,
            n_trials = result.n_trials,
            n_objective_calls = result.n_objective_calls,
            best_score = ?result.best_score(),
            ?stop_reason,
            "Search finished"
        );
        Ok(result)
    }
}

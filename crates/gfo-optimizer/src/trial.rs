//! Evaluation records and run status for a search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gfo_types::{ObjectiveDirection, Parameters, Position};

use crate::search::AgentId;
use crate::tracker::is_better;

/// Unique search run identifier.
pub type RunId = Uuid;

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Why the trial loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All `n_iter` trials ran.
    Completed,
    EarlyStopping,
    TimeBudget,
    Cancelled,
}

/// One evaluated trial. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub trial: usize,
    pub position: Position,
    pub parameters: Parameters,
    /// Score in the caller's direction.
    pub score: f64,
    /// Score on the "higher is better" scale the strategies see.
    pub internal_score: f64,
    /// Served from memory instead of calling the objective.
    pub cached: bool,
    pub agent: AgentId,
    pub recorded_at: DateTime<Utc>,
}

/// The best evaluation of a run, in the caller's direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEvaluation {
    pub trial: usize,
    pub position: Position,
    pub parameters: Parameters,
    pub score: f64,
    pub internal_score: f64,
}

impl From<&Evaluation> for BestEvaluation {
    fn from(eval: &Evaluation) -> Self {
        Self {
            trial: eval.trial,
            position: eval.position.clone(),
            parameters: eval.parameters.clone(),
            score: eval.score,
            internal_score: eval.internal_score,
        }
    }
}

/// Aggregate status of a run while it is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub optimizer: String,
    pub direction: ObjectiveDirection,
    pub state: RunState,
    pub trials_completed: usize,
    pub objective_calls: usize,
    pub best: Option<BestEvaluation>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(optimizer: impl Into<String>, direction: ObjectiveDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            optimizer: optimizer.into(),
            direction,
            state: RunState::Pending,
            trials_completed: 0,
            objective_calls: 0,
            best: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count `eval` and keep it as the best if it improves on the current
    /// best. Returns `true` on improvement.
    pub fn update_best(&mut self, eval: &Evaluation) -> bool {
        self.trials_completed += 1;
        if !eval.cached {
            self.objective_calls += 1;
        }
        let improved = match &self.best {
            None => true,
            Some(best) => is_better(eval.internal_score, best.internal_score),
        };
        if improved {
            self.best = Some(BestEvaluation::from(eval));
        }
        improved
    }
}

/// Outcome of a finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub run_id: RunId,
    pub optimizer: String,
    pub direction: ObjectiveDirection,
    pub best: Option<BestEvaluation>,
    pub n_trials: usize,
    pub n_objective_calls: usize,
    pub stop_reason: StopReason,
    pub evaluations: Vec<Evaluation>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SearchResult {
    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.score)
    }

    pub fn best_para(&self) -> Option<&Parameters> {
        self.best.as_ref().map(|b| &b.parameters)
    }

    pub fn best_position(&self) -> Option<&Position> {
        self.best.as_ref().map(|b| &b.position)
    }

    pub fn to_json(&self) -> gfo_types::GfoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfo_types::ParamValue;
    use std::collections::HashMap;

    fn eval(trial: usize, score: f64, direction: ObjectiveDirection, cached: bool) -> Evaluation {
        let mut parameters = HashMap::new();
        parameters.insert("x".to_string(), ParamValue::Int(trial as i64));
        Evaluation {
            trial,
            position: Position::new(vec![trial]),
            parameters,
            score,
            internal_score: direction.to_internal(score),
            cached,
            agent: AgentId(0),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn run_status_lifecycle() {
        let mut status = RunStatus::new("hill_climbing", ObjectiveDirection::Maximize);
        assert_eq!(status.state, RunState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, RunState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, RunState::Completed);
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn run_failure_keeps_the_error() {
        let mut status = RunStatus::new("tabu_search", ObjectiveDirection::Maximize);
        status.mark_running();
        status.mark_failed("objective panicked".into());
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(status.error.as_deref(), Some("objective panicked"));
    }

    #[test]
    fn best_tracking_maximize() {
        let dir = ObjectiveDirection::Maximize;
        let mut status = RunStatus::new("random", dir);
        assert!(status.update_best(&eval(0, 1.5, dir, false)));
        assert!(status.update_best(&eval(1, 2.0, dir, false)));
        // Worse result should not replace
        assert!(!status.update_best(&eval(2, 1.0, dir, true)));
        assert_eq!(status.best.as_ref().unwrap().score, 2.0);
        assert_eq!(status.trials_completed, 3);
        assert_eq!(status.objective_calls, 2);
    }

    #[test]
    fn best_tracking_minimize() {
        let dir = ObjectiveDirection::Minimize;
        let mut status = RunStatus::new("random", dir);
        status.update_best(&eval(0, 0.15, dir, false));
        status.update_best(&eval(1, 0.05, dir, false));
        status.update_best(&eval(2, 0.30, dir, false));
        let best = status.best.as_ref().unwrap();
        assert_eq!(best.score, 0.05);
        assert_eq!(best.internal_score, -0.05);
        assert_eq!(best.trial, 1);
    }

    #[test]
    fn result_serializes_with_snake_case_stop_reason() {
        let dir = ObjectiveDirection::Minimize;
        let e = eval(0, 3.0, dir, false);
        let now = Utc::now();
        let result = SearchResult {
            run_id: Uuid::new_v4(),
            optimizer: "hill_climbing".into(),
            direction: dir,
            best: Some(BestEvaluation::from(&e)),
            n_trials: 1,
            n_objective_calls: 1,
            stop_reason: StopReason::EarlyStopping,
            evaluations: vec![e],
            started_at: now,
            finished_at: now,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"early_stopping\""));
        assert_eq!(result.best_score(), Some(3.0));
        assert_eq!(result.best_para().unwrap()["x"], ParamValue::Int(0));
        assert_eq!(result.best_position(), Some(&Position::new(vec![0])));
    }
}

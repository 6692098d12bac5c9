//! State every strategy composes: space and constraints, the seeded rng,
//! the initialization queue and the position tracker.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use gfo_types::{ConstraintSet, GfoResult, Position, SearchSpace, StepDistribution};

use crate::retry::{perturb_for_retry, propose_until_accepted, RetryPolicy};
use crate::search::{InitConfig, SearchPhase};
use crate::tracker::PositionTracker;

/// Relative step used when an infeasible candidate is perturbed again.
const RETRY_EPSILON: f64 = 0.03;

#[derive(Debug, Clone)]
pub struct SearchCore {
    constraints: ConstraintSet,
    rng: ChaCha8Rng,
    initialize: InitConfig,
    min_init: usize,
    init_queue: Option<VecDeque<Position>>,
    warm: Vec<Position>,
    rand_rest_p: f64,
    retry: RetryPolicy,
    phase: SearchPhase,
    tracker: PositionTracker,
}

impl SearchCore {
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            constraints: ConstraintSet::new(space),
            rng: ChaCha8Rng::from_entropy(),
            initialize: InitConfig::default(),
            min_init: 1,
            init_queue: None,
            warm: Vec::new(),
            rand_rest_p: 0.0,
            retry: RetryPolicy::default(),
            phase: SearchPhase::Initializing,
            tracker: PositionTracker::new(),
        }
    }

    pub fn space(&self) -> &Arc<SearchSpace> {
        self.constraints.space()
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn set_constraints(&mut self, constraints: ConstraintSet) {
        self.constraints = constraints;
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn set_initialize(&mut self, initialize: InitConfig) {
        self.initialize = initialize;
        self.init_queue = None;
    }

    /// Pad the initialization queue with random positions up to `n`.
    pub fn set_min_init(&mut self, n: usize) {
        self.min_init = n.max(1);
    }

    pub fn set_rand_rest_p(&mut self, p: f64) {
        self.rand_rest_p = p.clamp(0.0, 1.0);
    }

    pub fn rand_rest_p(&self) -> f64 {
        self.rand_rest_p
    }

    pub fn set_retry(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn add_warm_start(&mut self, positions: Vec<Position>) {
        if let Some(queue) = self.init_queue.as_mut() {
            for position in positions.iter().rev() {
                queue.push_front(position.clone());
            }
        }
        self.warm.extend(positions);
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PositionTracker {
        &mut self.tracker
    }

    /// Record an observation in the tracker. Returns `true` on a new best.
    pub fn record(&mut self, position: &Position, score: f64) -> bool {
        self.tracker.record(position, score)
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SearchPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "phase change");
            self.phase = phase;
        }
    }

    pub fn is_initializing(&self) -> bool {
        self.phase == SearchPhase::Initializing
    }

    fn build_init_queue(&mut self) -> GfoResult<VecDeque<Position>> {
        let space = Arc::clone(self.space());
        let mut positions = self.warm.clone();
        for params in &self.initialize.warm_start {
            positions.push(space.position_of(params)?);
        }
        positions.extend(space.grid_positions(self.initialize.grid));
        positions.extend(space.vertex_positions(self.initialize.vertices));
        for _ in 0..self.initialize.random {
            positions.push(space.random_position(&mut self.rng));
        }
        while positions.len() < self.min_init {
            positions.push(space.random_position(&mut self.rng));
        }
        debug!(n_positions = positions.len(), "initialization queue built");
        Ok(positions.into())
    }

    /// Next initialization position, or `None` once the queue is drained
    /// (at which point the phase moves to `Exploring`).
    pub fn next_init(&mut self) -> GfoResult<Option<Position>> {
        if self.phase != SearchPhase::Initializing {
            return Ok(None);
        }
        if self.init_queue.is_none() {
            self.init_queue = Some(self.build_init_queue()?);
        }
        match self.init_queue.as_mut().and_then(|q| q.pop_front()) {
            Some(position) => Ok(Some(self.feasible_from(position)?)),
            None => {
                self.set_phase(SearchPhase::Exploring);
                Ok(None)
            }
        }
    }

    /// Go back to `Initializing` with a single random position queued.
    pub fn restart(&mut self) {
        let position = self.constraints.space().random_position(&mut self.rng);
        self.init_queue = Some(VecDeque::from(vec![position]));
        self.tracker.clear_current();
        self.set_phase(SearchPhase::Initializing);
    }

    /// Roll for a fully random proposal.
    pub fn random_restart_due(&mut self) -> bool {
        self.rand_rest_p > 0.0 && self.rng.gen::<f64>() < self.rand_rest_p
    }

    pub fn random_feasible(&mut self) -> GfoResult<Position> {
        let start = self.constraints.space().random_position(&mut self.rng);
        self.feasible_from(start)
    }

    /// Return `candidate` if feasible, otherwise keep perturbing it.
    pub fn feasible_from(&mut self, candidate: Position) -> GfoResult<Position> {
        self.feasible_filtered(candidate, |_| true)
    }

    /// As [`feasible_from`](Self::feasible_from) with an extra filter.
    pub fn feasible_filtered<A>(&mut self, candidate: Position, accept: A) -> GfoResult<Position>
    where
        A: Fn(&Position) -> bool,
    {
        let space = Arc::clone(self.constraints.space());
        let rng = &mut self.rng;
        propose_until_accepted(&self.constraints, self.retry, candidate, accept, |p, attempt| {
            perturb_for_retry(&space, p, RETRY_EPSILON, attempt, rng)
        })
    }

    /// Feasible neighbour of `from`.
    pub fn climb(
        &mut self,
        from: &Position,
        epsilon: f64,
        distribution: StepDistribution,
    ) -> GfoResult<Position> {
        self.climb_filtered(from, epsilon, distribution, |_| true)
    }

    pub fn climb_filtered<A>(
        &mut self,
        from: &Position,
        epsilon: f64,
        distribution: StepDistribution,
        accept: A,
    ) -> GfoResult<Position>
    where
        A: Fn(&Position) -> bool,
    {
        let candidate =
            self.constraints
                .space()
                .neighbor(from, epsilon, distribution, &mut self.rng);
        self.feasible_filtered(candidate, accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn space() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -5, 5)
                .add_int("y", 0, 9)
                .build()
                .unwrap(),
        )
    }

    fn drain(core: &mut SearchCore) -> Vec<Position> {
        let mut out = Vec::new();
        while let Some(p) = core.next_init().unwrap() {
            out.push(p);
        }
        out
    }

    #[test]
    fn init_queue_follows_config_then_switches_phase() {
        let mut core = SearchCore::new(space());
        core.reseed(1);
        core.set_initialize(InitConfig::random(3).with_grid(4).with_vertices(2));

        let positions = drain(&mut core);
        assert_eq!(positions.len(), 9);
        assert_eq!(core.phase(), SearchPhase::Exploring);
        assert!(core.next_init().unwrap().is_none());
    }

    #[test]
    fn warm_start_positions_come_first() {
        let mut core = SearchCore::new(space());
        core.reseed(2);
        let mut params = HashMap::new();
        params.insert("x".to_string(), 3i64.into());
        params.insert("y".to_string(), 7i64.into());
        core.set_initialize(InitConfig::random(1).with_warm_start(params));
        core.add_warm_start(vec![Position::new(vec![0, 0])]);

        let positions = drain(&mut core);
        assert_eq!(positions[0], Position::new(vec![0, 0]));
        assert_eq!(positions[1], Position::new(vec![8, 7]));
        assert_eq!(positions.len(), 3);
    }

    #[test]
    fn min_init_pads_with_random_positions() {
        let mut core = SearchCore::new(space());
        core.reseed(3);
        core.set_initialize(InitConfig::random(0));
        core.set_min_init(5);
        assert_eq!(drain(&mut core).len(), 5);
    }

    #[test]
    fn init_positions_respect_constraints() {
        let space = space();
        let mut core = SearchCore::new(space.clone());
        core.reseed(4);
        core.set_constraints(
            ConstraintSet::new(space).with_fn("x_neg", |p| p["x"].as_f64().unwrap_or(0.0) < 0.0),
        );
        for p in drain(&mut core) {
            assert!(core.constraints().is_satisfied(&p));
        }
    }

    #[test]
    fn restart_reenters_initialization() {
        let mut core = SearchCore::new(space());
        core.reseed(5);
        core.set_initialize(InitConfig::random(1));
        drain(&mut core);
        core.restart();
        assert!(core.is_initializing());
        assert!(core.next_init().unwrap().is_some());
        assert!(core.next_init().unwrap().is_none());
    }

    #[test]
    fn same_seed_same_climb() {
        let mut a = SearchCore::new(space());
        let mut b = SearchCore::new(space());
        a.reseed(42);
        b.reseed(42);
        let from = Position::new(vec![5, 5]);
        for _ in 0..20 {
            assert_eq!(
                a.climb(&from, 0.2, StepDistribution::Normal).unwrap(),
                b.climb(&from, 0.2, StepDistribution::Normal).unwrap()
            );
        }
    }
}

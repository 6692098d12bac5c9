//! The constraint-retry loop.
//!
//! Candidates that violate a constraint are perturbed again (never simply
//! re-checked) until one is feasible or the attempt budget runs out.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use gfo_types::{ConstraintSet, GfoError, GfoResult, Position, SearchSpace, StepDistribution};

/// Attempt budget for the constraint-retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1000 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Loop until `start` (or one of its perturbations) is feasible.
pub fn propose_until_feasible<G>(
    constraints: &ConstraintSet,
    policy: RetryPolicy,
    start: Position,
    perturb: G,
) -> GfoResult<Position>
where
    G: FnMut(&Position, usize) -> Position,
{
    propose_until_accepted(constraints, policy, start, |_| true, perturb)
}

/// Like [`propose_until_feasible`] with an extra acceptance filter
/// (e.g. a tabu list).
pub fn propose_until_accepted<A, G>(
    constraints: &ConstraintSet,
    policy: RetryPolicy,
    start: Position,
    accept: A,
    mut perturb: G,
) -> GfoResult<Position>
where
    A: Fn(&Position) -> bool,
    G: FnMut(&Position, usize) -> Position,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut candidate = start;
    let mut attempts = 0;
    loop {
        attempts += 1;
        if constraints.not_in_constraint(&candidate) && accept(&candidate) {
            return Ok(candidate);
        }
        if attempts >= max_attempts {
            warn!(attempts, "constraint-retry loop exhausted its attempt budget");
            return Err(GfoError::ConstraintUnsatisfiable { attempts });
        }
        trace!(
            attempt = attempts,
            position = %candidate,
            violated = ?constraints.first_violated(&candidate),
            "rejected candidate"
        );
        candidate = perturb(&candidate, attempts);
    }
}

/// Perturbation used between retries. The step widens with the attempt
/// count and always changes at least one coordinate when any dimension has
/// more than one slot.
pub fn perturb_for_retry<R: Rng + ?Sized>(
    space: &SearchSpace,
    candidate: &Position,
    epsilon: f64,
    attempt: usize,
    rng: &mut R,
) -> Position {
    let scale = epsilon * (1.0 + 0.1 * attempt as f64);
    let moved = space.neighbor(candidate, scale, StepDistribution::Normal, rng);
    if moved != *candidate {
        return moved;
    }

    let movable: Vec<usize> = (0..space.dimension_count())
        .filter(|&d| space.size_of(d) > 1)
        .collect();
    if movable.is_empty() {
        return moved;
    }
    let dim = movable[rng.gen_range(0..movable.len())];
    let max = space.size_of(dim) - 1;
    let mut indices = moved.into_inner();
    indices[dim] = match indices[dim] {
        0 => 1,
        i if i >= max => max - 1,
        i if rng.gen_bool(0.5) => i + 1,
        i => i - 1,
    };
    Position::new(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn space() -> Arc<SearchSpace> {
        Arc::new(
            SearchSpace::builder()
                .add_int("x", -5, 5)
                .add_int("y", -5, 5)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn feasible_start_is_returned_untouched() {
        let constraints = ConstraintSet::new(space());
        let start = Position::new(vec![3, 3]);
        let out = propose_until_feasible(&constraints, RetryPolicy::default(), start.clone(), |_, _| {
            panic!("should not perturb a feasible start")
        })
        .unwrap();
        assert_eq!(out, start);
    }

    #[test]
    fn infeasible_start_is_perturbed_until_feasible() {
        let space = space();
        let constraints = ConstraintSet::new(space.clone())
            .with_fn("x_ge_3", |p| p["x"].as_f64().unwrap_or(0.0) >= 3.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let out = propose_until_feasible(
            &constraints,
            RetryPolicy::default(),
            Position::new(vec![0, 0]),
            |p, attempt| perturb_for_retry(&space, p, 0.1, attempt, &mut rng),
        )
        .unwrap();
        assert!(constraints.is_satisfied(&out));
    }

    #[test]
    fn unsatisfiable_constraint_fails_after_budget() {
        let space = space();
        let constraints = ConstraintSet::new(space.clone()).with_fn("never", |_| false);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = propose_until_feasible(
            &constraints,
            RetryPolicy::new(25),
            Position::new(vec![0, 0]),
            |p, attempt| perturb_for_retry(&space, p, 0.1, attempt, &mut rng),
        )
        .unwrap_err();
        assert!(matches!(err, GfoError::ConstraintUnsatisfiable { attempts: 25 }));
    }

    #[test]
    fn retry_perturbation_always_moves() {
        let space = space();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let start = Position::new(vec![5, 5]);
        for attempt in 0..50 {
            let moved = perturb_for_retry(&space, &start, 0.0, attempt, &mut rng);
            assert_ne!(moved, start);
            assert!(space.contains(&moved));
        }
    }

    #[test]
    fn acceptance_filter_is_applied() {
        let space = space();
        let constraints = ConstraintSet::new(space.clone());
        let forbidden = Position::new(vec![5, 5]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let out = propose_until_accepted(
            &constraints,
            RetryPolicy::default(),
            forbidden.clone(),
            |p| *p != forbidden,
            |p, attempt| perturb_for_retry(&space, p, 0.0, attempt, &mut rng),
        )
        .unwrap();
        assert_ne!(out, forbidden);
    }
}

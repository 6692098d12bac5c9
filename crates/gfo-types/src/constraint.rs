//! Feasibility predicates over positions.

use std::fmt;
use std::sync::Arc;

use crate::position::Position;
use crate::space::SearchSpace;
use crate::value::Parameters;

/// A pure feasibility predicate. Implementations must not depend on trial
/// history so they can be checked before the objective is ever called.
pub trait Constraint: Send + Sync {
    fn is_satisfied(&self, position: &Position, space: &SearchSpace) -> bool;

    fn name(&self) -> &str {
        "constraint"
    }
}

/// Constraint over resolved parameter values.
pub struct FnConstraint<F> {
    name: String,
    predicate: F,
}

impl<F> FnConstraint<F>
where
    F: Fn(&Parameters) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Constraint for FnConstraint<F>
where
    F: Fn(&Parameters) -> bool + Send + Sync,
{
    fn is_satisfied(&self, position: &Position, space: &SearchSpace) -> bool {
        (self.predicate)(&space.parameters(position))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Constraint over raw indices; avoids resolving values.
pub struct IndexConstraint<F> {
    name: String,
    predicate: F,
}

impl<F> IndexConstraint<F>
where
    F: Fn(&Position) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Constraint for IndexConstraint<F>
where
    F: Fn(&Position) -> bool + Send + Sync,
{
    fn is_satisfied(&self, position: &Position, _space: &SearchSpace) -> bool {
        (self.predicate)(position)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Logical AND of constraints, bound to one search space.
#[derive(Clone)]
pub struct ConstraintSet {
    space: Arc<SearchSpace>,
    constraints: Vec<Arc<dyn Constraint>>,
}

impl ConstraintSet {
    /// A set with no members; every in-range position is feasible.
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self {
            space,
            constraints: Vec::new(),
        }
    }

    pub fn with(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    pub fn with_fn<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Parameters) -> bool + Send + Sync + 'static,
    {
        self.with(FnConstraint::new(name, predicate))
    }

    pub fn push(&mut self, constraint: Arc<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    pub fn space(&self) -> &Arc<SearchSpace> {
        &self.space
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// True when the position is in range and every member holds.
    pub fn is_satisfied(&self, position: &Position) -> bool {
        self.space.contains(position)
            && self
                .constraints
                .iter()
                .all(|c| c.is_satisfied(position, &self.space))
    }

    /// True when the position lies outside every member's forbidden region,
    /// i.e. the acceptance test of the constraint-retry loop.
    pub fn not_in_constraint(&self, position: &Position) -> bool {
        self.is_satisfied(position)
    }

    /// Literal negation of [`is_satisfied`](Self::is_satisfied).
    pub fn violates(&self, position: &Position) -> bool {
        !self.is_satisfied(position)
    }

    /// Name of the first failing member, for diagnostics.
    pub fn first_violated(&self, position: &Position) -> Option<&str> {
        if !self.space.contains(position) {
            return Some("out_of_range");
        }
        self.constraints
            .iter()
            .find(|c| !c.is_satisfied(position, &self.space))
            .map(|c| c.name())
    }
}

impl fmt::Debug for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintSet")
            .field(
                "constraints",
                &self.constraints.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn empty_set_accepts_in_range_positions() {
        let set = ConstraintSet::new(space());
        assert!(set.is_satisfied(&Position::new(vec![0, 10])));
        assert!(!set.is_satisfied(&Position::new(vec![0, 11])));
        assert!(set.is_empty());
    }

    #[test]
    fn members_are_combined_with_and() {
        let set = ConstraintSet::new(space())
            .with_fn("x_positive", |p| p["x"].as_f64().unwrap_or(0.0) > 0.0)
            .with(IndexConstraint::new("y_low", |pos: &Position| pos[1] < 5));

        // x = 1, y = -5
        let ok = Position::new(vec![6, 0]);
        assert!(set.is_satisfied(&ok));
        assert!(set.not_in_constraint(&ok));
        assert!(!set.violates(&ok));

        // x = -5
        let bad_x = Position::new(vec![0, 0]);
        assert!(set.violates(&bad_x));
        assert_eq!(set.first_violated(&bad_x), Some("x_positive"));

        // y = 0
        let bad_y = Position::new(vec![6, 5]);
        assert_eq!(set.first_violated(&bad_y), Some("y_low"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn debug_lists_member_names() {
        let set = ConstraintSet::new(space()).with_fn("sum", |_| true);
        assert!(format!("{set:?}").contains("sum"));
    }
}

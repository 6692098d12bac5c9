//! Index vectors into a [`SearchSpace`](crate::SearchSpace).

use serde::{Deserialize, Serialize};
use std::ops::Index;

/// One index per dimension. Positions are the internal currency of every
/// strategy; parameter values are only resolved at the objective boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(Vec<usize>);

impl Position {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    /// Coordinates as floats, the working representation for moves that
    /// interpolate between positions (simplex, swarm, differential mutation).
    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&i| i as f64).collect()
    }

    /// Squared euclidean distance in index space.
    pub fn distance_sq(&self, other: &Position) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(&a, &b)| {
                let d = a as f64 - b as f64;
                d * d
            })
            .sum()
    }
}

impl Index<usize> for Position {
    type Output = usize;

    fn index(&self, dim: usize) -> &usize {
        &self.0[dim]
    }
}

impl From<Vec<usize>> for Position {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_index() {
        let pos = Position::new(vec![3, 0, 7]);
        assert_eq!(pos.to_string(), "[3, 0, 7]");
        assert_eq!(pos[2], 7);
        assert_eq!(pos.len(), 3);
    }

    #[test]
    fn distance() {
        let a = Position::new(vec![0, 0]);
        let b = Position::new(vec![3, 4]);
        assert_eq!(a.distance_sq(&b), 25.0);
    }

    #[test]
    fn transparent_serde() {
        let pos = Position::from(vec![1, 2]);
        assert_eq!(serde_json::to_string(&pos).unwrap(), "[1,2]");
    }
}

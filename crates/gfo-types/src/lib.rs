//! Core types shared by every gradient-free optimization strategy: the
//! discretized search space, positions, parameter values, constraints and
//! the objective direction.

pub mod constraint;
pub mod direction;
pub mod errors;
pub mod position;
pub mod space;
pub mod value;

pub use constraint::*;
pub use direction::*;
pub use errors::*;
pub use position::*;
pub use space::*;
pub use value::*;

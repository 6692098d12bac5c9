use serde::{Deserialize, Serialize};

/// Whether a run maximizes or minimizes the objective.
///
/// Everything below the search driver works on *internal* scores where
/// higher is always better. The driver converts raw objective output with
/// [`to_internal`](Self::to_internal) exactly once, and converts back with
/// [`to_external`](Self::to_external) when reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    #[default]
    #[serde(rename = "maximize", alias = "maximum", alias = "max")]
    Maximize,
    #[serde(rename = "minimize", alias = "minimum", alias = "min")]
    Minimize,
}

impl ObjectiveDirection {
    /// Raw objective output to the internal "higher is better" scale.
    /// NaN maps to the worst possible score.
    pub fn to_internal(self, raw: f64) -> f64 {
        if raw.is_nan() {
            return f64::NEG_INFINITY;
        }
        match self {
            Self::Maximize => raw,
            Self::Minimize => -raw,
        }
    }

    /// Internal score back to the caller's scale.
    pub fn to_external(self, internal: f64) -> f64 {
        match self {
            Self::Maximize => internal,
            Self::Minimize => -internal,
        }
    }
}

impl std::fmt::Display for ObjectiveDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maximize => write!(f, "maximize"),
            Self::Minimize => write!(f, "minimize"),
        }
    }
}

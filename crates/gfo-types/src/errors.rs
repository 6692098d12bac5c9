use thiserror::Error;

/// Main error type for gradient-free optimization runs
#[derive(Error, Debug)]
pub enum GfoError {
    #[error("Invalid search space: {message}")]
    InvalidSearchSpace { message: String },

    #[error("Constraint unsatisfiable: no feasible position found after {attempts} attempts")]
    ConstraintUnsatisfiable { attempts: usize },

    #[error("Surrogate fit failure: {message}")]
    SurrogateFitFailure { message: String },

    #[error("Objective error: {0}")]
    Objective(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GfoError {
    /// True for failures a sequence-model strategy recovers from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GfoError::SurrogateFitFailure { .. })
    }
}

/// Result type alias for optimizer operations
pub type GfoResult<T> = Result<T, GfoError>;

/// Macro for creating search space validation errors
#[macro_export]
macro_rules! invalid_space {
    ($($arg:tt)*) => {
        $crate::GfoError::InvalidSearchSpace { message: format!($($arg)*) }
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GfoError::Config(format!($($arg)*))
    };
}

/// Macro for creating surrogate failures
#[macro_export]
macro_rules! surrogate_error {
    ($($arg:tt)*) => {
        $crate::GfoError::SurrogateFitFailure { message: format!($($arg)*) }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GfoError::ConstraintUnsatisfiable { attempts: 1000 };
        assert!(error.to_string().contains("Constraint unsatisfiable"));
        assert!(error.to_string().contains("1000"));
    }

    #[test]
    fn test_objective_error_keeps_source() {
        let error = GfoError::Objective(anyhow::anyhow!("simulation diverged"));
        assert!(error.to_string().contains("Objective error"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_recoverable() {
        assert!(surrogate_error!("singular matrix").is_recoverable());
        assert!(!invalid_space!("dimension {} is empty", "x").is_recoverable());
        assert!(!config_error!("population must be at least {}", 2).is_recoverable());
    }
}

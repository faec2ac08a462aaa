//! Errors returned by an engine update

use thiserror::Error;

/// Reasons an update step is refused
///
/// Every variant is raised before the engine is touched, so a failed update
/// leaves the session exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("elapsed time went backwards: {current}s after {previous}s")]
    NonMonotonicTime { previous: f64, current: f64 },

    #[error("elapsed time is not finite: {0}")]
    NonFiniteTime(f64),

    #[error("input field `{field}` is not finite")]
    NonFiniteInput { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = EngineError::NonMonotonicTime {
            previous: 2.0,
            current: 1.5,
        };
        assert_eq!(err.to_string(), "elapsed time went backwards: 1.5s after 2s");

        let err = EngineError::NonFiniteInput { field: "Speed" };
        assert!(err.to_string().contains("`Speed`"));
    }
}

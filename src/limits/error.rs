// Resource limit errors

use thiserror::Error;

/// Invalid limit configuration
#[derive(Debug, Error, PartialEq)]
pub enum LimitError {
    #[error("timeout_seconds must be positive and fit in a duration, got {0}")]
    InvalidTimeout(f64),

    #[error("max_output_bytes must be greater than zero")]
    ZeroOutputBudget,

    #[error("max_steps must be greater than zero")]
    ZeroSteps,
}

/// A budget ran out while work was in progress
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum LimitExceeded {
    #[error("execution timeout: exceeded {seconds}s limit")]
    Timeout { seconds: f64 },
}

// Agent errors

use crate::brain::BrainError;
use crate::finalizer::FinalizerError;
use crate::limits::LimitError;
use thiserror::Error;

/// Conditions that end a run with an error
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider failure: {0}")]
    Provider(#[from] BrainError),

    #[error("{0}")]
    MultipleFinalAnswers(#[from] FinalizerError),

    #[error("step limit reached after {steps} steps")]
    StepLimitReached { steps: u32 },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid limits: {0}")]
    Limits(#[from] LimitError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

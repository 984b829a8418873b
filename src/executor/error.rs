// Error types for Executor module

use crate::limits::LimitExceeded;
use thiserror::Error;

/// Why the import gate refused a program
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    #[error("module '{module}' is not allowed (allowed: {allowed})")]
    Disallowed { module: String, allowed: String },

    #[error("cannot verify import at line {line}: {reason}")]
    Unprovable { line: usize, reason: String },
}

/// Executor error types. Rendered into `ExecutionResult::error`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("import rejected: {0}")]
    ImportRejected(#[from] GateError),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("function not found: {signature} ({position})")]
    FunctionNotFound { signature: String, position: String },

    #[error("{0}")]
    Timeout(#[from] LimitExceeded),

    #[error("execution killed")]
    Killed,
}

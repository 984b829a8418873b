// Executor configuration

use crate::limits::TimeoutMode;
use serde::{Deserialize, Serialize};

/// Modules importable without any caller extension
pub const DEFAULT_ALLOWED_IMPORTS: &[&str] = &["math", "json", "text", "time"];

/// Executor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Module names allowed in addition to the defaults
    pub extra_imports: Vec<String>,
    /// Timeout mechanism; `auto` detects from the calling context
    pub timeout_mode: TimeoutMode,
}

// Agent module - code-writing control loop

pub mod config;
pub mod error;
pub mod extract;
pub mod inference;
pub mod loop_;
pub mod prompt;
pub mod types;

pub use error::{AgentError, ConfigError};
pub use extract::extract_code;
pub use inference::ModelClient;
pub use loop_::CodeAgent;
pub use types::{AgentConfig, AgentState, RunResult, RunState, StepLimitPolicy};

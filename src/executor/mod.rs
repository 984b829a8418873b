// Executor module - capability-restricted script execution

pub mod config;
pub mod convert;
pub mod error;
pub mod gate;
pub mod modules;
pub mod runner;
pub mod tool;
pub mod types;

pub use config::{ExecutorConfig, DEFAULT_ALLOWED_IMPORTS};
pub use error::{ExecutorError, GateError};
pub use gate::{scan_imports, ImportGate, ImportRef};
pub use runner::{Executor, ScriptExecutor, FINALIZE_FN};
pub use tool::{tool_bindings, FnTool, ParamKind, Tool, ToolParam};
pub use types::ExecutionResult;

// codeloop - sandboxed script execution driven by a model control loop

pub mod agent;
pub mod brain;
pub mod executor;
pub mod finalizer;
pub mod limits;
pub mod memory;
pub mod namespace;
pub mod signals;

pub use agent::{AgentConfig, AgentError, CodeAgent, ModelClient, RunResult, RunState};
pub use executor::{ExecutionResult, Executor, ScriptExecutor};
pub use finalizer::{FinalAnswer, Finalizer};
pub use limits::ResourceLimits;
pub use memory::WorkingMemory;
pub use signals::SignalCollector;

// Agent types

use crate::executor::ExecutorConfig;
use crate::finalizer::FinalAnswer;
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Control loop state. Lives only for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initializing,
    AwaitingModel,
    ExtractingCode,
    Executing,
    Observing,
    Finalized,
    StepLimitReached,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Finalized | AgentState::StepLimitReached | AgentState::Failed
        )
    }

    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        match self {
            Initializing => matches!(next, AwaitingModel | Failed),
            AwaitingModel => matches!(next, ExtractingCode | Failed),
            // A missing code block goes back to the model, possibly exhausting the budget
            ExtractingCode => matches!(next, Executing | AwaitingModel | StepLimitReached),
            Executing => matches!(next, Observing | Finalized | Failed),
            Observing => matches!(next, AwaitingModel | StepLimitReached),
            Finalized | StepLimitReached | Failed => false,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Initializing => "initializing",
            AgentState::AwaitingModel => "awaiting_model",
            AgentState::ExtractingCode => "extracting_code",
            AgentState::Executing => "executing",
            AgentState::Observing => "observing",
            AgentState::Finalized => "finalized",
            AgentState::StepLimitReached => "step_limit_reached",
            AgentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal state recorded in a `RunResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    StepLimitReached,
}

/// The single artifact produced when a run terminates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    /// Captured output of the last executed step
    pub output: String,
    pub final_answer: Option<FinalAnswer>,
    pub state: RunState,
    pub steps_taken: u32,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// What the loop does when the step budget runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepLimitPolicy {
    /// Return a `RunResult` in state `step_limit_reached`
    #[default]
    Return,
    /// Fail with `AgentError::StepLimitReached`
    Raise,
}

impl FromStr for StepLimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "return" => Ok(StepLimitPolicy::Return),
            "raise" => Ok(StepLimitPolicy::Raise),
            other => Err(format!("unknown step limit policy '{}'", other)),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You solve tasks by writing Rhai scripts. \
Each reply must contain exactly one fenced code block. The block is executed and \
you will see its printed output, or the error it raised, in the next message. \
Work in small steps, print what you need to inspect, and call final_answer(value) \
once the task is solved.";

/// Agent loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub limits: ResourceLimits,
    pub executor: ExecutorConfig,
    /// Preamble of the system prompt; capability sections are appended
    pub system_prompt: String,
    pub step_limit: StepLimitPolicy,
    /// Charge every reply without a code block as one step
    pub count_extraction_failures: bool,
    /// Consecutive uncounted extraction failures charged together as one step
    pub max_extraction_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            executor: ExecutorConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            step_limit: StepLimitPolicy::Return,
            count_extraction_failures: true,
            max_extraction_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use AgentState::*;
        let path = [
            Initializing,
            AwaitingModel,
            ExtractingCode,
            Executing,
            Observing,
            AwaitingModel,
            ExtractingCode,
            Executing,
            Finalized,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        use AgentState::*;
        for terminal in [Finalized, StepLimitReached, Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(AwaitingModel));
        }
        assert!(!Executing.can_transition_to(AwaitingModel));
        assert!(!Initializing.can_transition_to(Executing));
    }

    #[test]
    fn test_run_result_serializes_snake_case() {
        let result = RunResult {
            run_id: Uuid::nil(),
            output: String::new(),
            final_answer: None,
            state: RunState::StepLimitReached,
            steps_taken: 1,
            duration_seconds: 0.5,
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["state"], "step_limit_reached");
        assert_eq!(json["steps_taken"], 1);
    }

    #[test]
    fn test_step_limit_policy_parse() {
        assert_eq!("Raise".parse::<StepLimitPolicy>(), Ok(StepLimitPolicy::Raise));
        assert!("explode".parse::<StepLimitPolicy>().is_err());
    }
}

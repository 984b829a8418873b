// Agent loop - generate, extract, execute, observe

use crate::brain::Message;
use crate::executor::{tool_bindings, Executor, ExecutionResult, ScriptExecutor, Tool};
use crate::finalizer::Finalizer;
use crate::limits::ResourceLimits;
use crate::memory::WorkingMemory;
use crate::namespace::{render_value, Namespace};
use crate::signals::{signal_bindings, SignalCollector};

use super::error::{AgentError, ConfigError};
use super::extract::extract_code;
use super::inference::ModelClient;
use super::prompt;
use super::types::{AgentConfig, AgentState, RunResult, RunState, StepLimitPolicy};

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Source tag for answers produced by executed code
const EXECUTION_SOURCE: &str = "execution";

/// Code-writing agent. Each `run` is independent and owns its own
/// executor, finalizer and working memory.
pub struct CodeAgent<M> {
    model: M,
    config: AgentConfig,
    tools: Vec<Arc<dyn Tool>>,
}

/// Mutable bookkeeping for one run
struct RunContext {
    run_id: Uuid,
    started: Instant,
    state: AgentState,
    steps_taken: u32,
    last_output: String,
}

impl RunContext {
    fn advance(&mut self, next: AgentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn finish(&self, state: RunState, result: Option<&ExecutionResult>) -> RunResult {
        RunResult {
            run_id: self.run_id,
            output: result.map_or_else(|| self.last_output.clone(), |r| r.output.clone()),
            final_answer: None,
            state,
            steps_taken: self.steps_taken,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            error: None,
        }
    }
}

fn inject_all(executor: &mut dyn Executor, namespace: Namespace) {
    for (name, binding) in namespace {
        executor.inject(&name, binding);
    }
}

/// Render an oversized final value down to the output budget
fn cap_final_value(value: Value, limits: &ResourceLimits) -> Value {
    let rendered = render_value(&value);
    let (text, truncated) = limits.truncate_output(&rendered);
    if truncated {
        warn!(original_bytes = rendered.len(), "final value truncated");
        Value::String(text)
    } else {
        value
    }
}

impl<M: ModelClient> CodeAgent<M> {
    pub fn new(model: M, config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            tools: Vec::new(),
        })
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Solve `task` without a signal collector
    pub async fn run(&self, task: &str) -> Result<RunResult, AgentError> {
        self.run_with_signals(task, None).await
    }

    /// Solve `task`, recording cognitive signals into `signals` when given
    pub async fn run_with_signals(
        &self,
        task: &str,
        signals: Option<&SignalCollector>,
    ) -> Result<RunResult, AgentError> {
        let limits = self.config.limits.clone();
        let mut ctx = RunContext {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            state: AgentState::Initializing,
            steps_taken: 0,
            last_output: String::new(),
        };

        info!(
            run_id = %ctx.run_id,
            max_steps = limits.max_steps,
            tools = self.tools.len(),
            "run started"
        );

        // Per-run state; nothing below outlives this call
        let memory = WorkingMemory::new();
        let finalizer = Finalizer::new();
        let mut executor = ScriptExecutor::new(&self.config.executor, limits.clone());

        inject_all(&mut executor, memory.to_namespace());
        for tool in &self.tools {
            inject_all(&mut executor, tool_bindings(Arc::clone(tool)));
        }
        inject_all(&mut executor, signal_bindings(signals));

        let system = prompt::system_prompt(
            &self.config.system_prompt,
            &executor.allowed_imports(),
            &self.tools,
            signals.is_some(),
        );
        let mut messages = vec![Message::user_text(prompt::task_message(task))];
        let mut extraction_failures = 0u32;

        loop {
            ctx.advance(AgentState::AwaitingModel);
            let reply = match self.model.complete(&system, &messages).await {
                Ok(reply) => reply,
                Err(e) => {
                    ctx.advance(AgentState::Failed);
                    error!(run_id = %ctx.run_id, step = ctx.steps_taken, error = %e, "model call failed");
                    return Err(AgentError::Provider(e));
                }
            };
            messages.push(Message::assistant_text(reply.as_str()));

            ctx.advance(AgentState::ExtractingCode);
            let Some(code) = extract_code(&reply) else {
                extraction_failures += 1;
                let charged = self.config.count_extraction_failures
                    || extraction_failures >= self.config.max_extraction_retries;
                if charged {
                    ctx.steps_taken += 1;
                    extraction_failures = 0;
                }
                warn!(
                    run_id = %ctx.run_id,
                    step = ctx.steps_taken,
                    charged = charged,
                    "no code block in model reply"
                );

                if ctx.steps_taken >= limits.max_steps {
                    ctx.advance(AgentState::StepLimitReached);
                    return self.step_limit_reached(&ctx);
                }
                messages.push(Message::user_text(prompt::CORRECTIVE_MESSAGE));
                continue;
            };
            extraction_failures = 0;

            ctx.advance(AgentState::Executing);
            if let Some(collector) = signals {
                collector.set_step(ctx.steps_taken + 1);
            }
            inject_all(&mut executor, memory.to_namespace());
            let result = executor.run(&code);
            ctx.steps_taken += 1;

            info!(
                run_id = %ctx.run_id,
                step = ctx.steps_taken,
                duration_ms = result.duration.as_millis() as u64,
                output_bytes = result.output.len(),
                success = result.success(),
                timeout = result.timeout,
                is_final = result.is_final,
                "step executed"
            );

            if result.is_final && result.success() {
                let value = cap_final_value(result.final_value.clone().unwrap_or(Value::Null), &limits);
                let answer = match finalizer.set(value, EXECUTION_SOURCE) {
                    Ok(answer) => answer,
                    Err(e) => {
                        ctx.advance(AgentState::Failed);
                        error!(run_id = %ctx.run_id, error = %e, "second final answer in one run");
                        return Err(AgentError::MultipleFinalAnswers(e));
                    }
                };
                ctx.advance(AgentState::Finalized);

                let mut run = ctx.finish(RunState::Completed, Some(&result));
                run.final_answer = Some(answer);
                info!(
                    run_id = %run.run_id,
                    steps_taken = run.steps_taken,
                    duration_ms = (run.duration_seconds * 1000.0) as u64,
                    "run finalized"
                );
                return Ok(run);
            }

            // Timeout is checked before errors, errors before the final answer
            let observation = if result.timeout {
                prompt::timeout_observation(&result)
            } else if result.error.is_some() {
                prompt::error_observation(&result, &self.tools)
            } else {
                prompt::output_observation(&result.output, &memory.to_context())
            };

            ctx.advance(AgentState::Observing);
            messages.push(Message::user_text(observation));
            ctx.last_output = result.output;

            if ctx.steps_taken >= limits.max_steps {
                ctx.advance(AgentState::StepLimitReached);
                return self.step_limit_reached(&ctx);
            }
        }
    }

    fn step_limit_reached(&self, ctx: &RunContext) -> Result<RunResult, AgentError> {
        warn!(
            run_id = %ctx.run_id,
            steps_taken = ctx.steps_taken,
            policy = ?self.config.step_limit,
            "step limit reached without a final answer"
        );
        match self.config.step_limit {
            StepLimitPolicy::Raise => Err(AgentError::StepLimitReached {
                steps: ctx.steps_taken,
            }),
            StepLimitPolicy::Return => {
                let mut run = ctx.finish(RunState::StepLimitReached, None);
                run.error = Some(
                    AgentError::StepLimitReached {
                        steps: ctx.steps_taken,
                    }
                    .to_string(),
                );
                Ok(run)
            }
        }
    }
}

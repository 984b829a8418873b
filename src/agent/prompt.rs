// Prompt and observation text fed to the model

use crate::executor::{ExecutionResult, Tool, FINALIZE_FN};
use crate::signals::SignalKind;
use std::fmt::Write;
use std::sync::Arc;

/// Observation for a step that printed nothing
pub const NO_OUTPUT: &str = "(no output)";

pub const CORRECTIVE_MESSAGE: &str = "Your reply did not contain a code block. \
Reply with exactly one fenced ```rhai code block containing the next step.";

pub fn task_message(task: &str) -> String {
    format!("Task:\n{}", task.trim())
}

/// System prompt: the configured preamble plus the capabilities of this run
pub fn system_prompt(
    preamble: &str,
    allowed_imports: &[String],
    tools: &[Arc<dyn Tool>],
    signals: bool,
) -> String {
    let mut prompt = preamble.trim().to_string();

    prompt.push_str("\n\n## Environment\n");
    let _ = writeln!(
        prompt,
        "- Importable modules: {} (e.g. `import \"math\" as m;`). Nothing else can be imported.",
        allowed_imports.join(", ")
    );
    let _ = writeln!(
        prompt,
        "- `{}(value)` records the answer and ends the task. Call it once.",
        FINALIZE_FN
    );
    prompt.push_str("- `sleep(seconds)` pauses execution.\n");
    prompt.push_str("- Top-level variables and functions persist between steps.\n");

    prompt.push_str("\n## Working memory\n");
    prompt.push_str("- `store(name, value)` / `recall(name)` keep values across steps.\n");
    prompt.push_str("- `observe(note)` logs a finding; `fail(approach)` or `fail(approach, reason)` records a dead end.\n");
    prompt.push_str("- Stored values are also available by name, and `memory` holds a snapshot.\n");

    if !tools.is_empty() {
        prompt.push_str("\n## Tools\n");
        for tool in tools {
            let _ = writeln!(prompt, "- `{}`: {}", tool.signature(), tool.description());
        }
    }

    if signals {
        prompt.push_str("\n## Signals\n");
        for kind in SignalKind::ALL {
            let _ = writeln!(prompt, "- `{}(note)`: {}", kind.binding_name(), kind.description());
        }
    }

    prompt
}

pub fn timeout_observation(result: &ExecutionResult) -> String {
    let mut text = format!(
        "Execution timed out: {}",
        result.error.as_deref().unwrap_or("execution timeout")
    );
    if !result.output.is_empty() {
        let _ = write!(text, "\nOutput before the timeout:\n{}", result.output);
    }
    text
}

/// Usage lines for tools the error is about; all tools for an unknown call
fn tool_hints(error: &str, tools: &[Arc<dyn Tool>]) -> Vec<String> {
    let mentioned: Vec<&Arc<dyn Tool>> = tools
        .iter()
        .filter(|tool| error.contains(tool.name()))
        .collect();
    let relevant = if mentioned.is_empty() && error.starts_with("function not found") {
        tools.iter().collect()
    } else {
        mentioned
    };
    relevant
        .into_iter()
        .map(|tool| format!("- {}: {}", tool.signature(), tool.description()))
        .collect()
}

pub fn error_observation(result: &ExecutionResult, tools: &[Arc<dyn Tool>]) -> String {
    let error = result.error.as_deref().unwrap_or_default();
    let mut text = String::new();
    if !result.output.is_empty() {
        let _ = writeln!(text, "Output:\n{}", result.output);
    }
    let _ = write!(text, "Error: {}", error);

    let hints = tool_hints(error, tools);
    if !hints.is_empty() {
        let _ = write!(text, "\n\nTool usage:\n{}", hints.join("\n"));
    }
    text
}

pub fn output_observation(output: &str, memory_context: &str) -> String {
    let mut text = if output.trim().is_empty() {
        NO_OUTPUT.to_string()
    } else {
        output.trim_end().to_string()
    };
    if !memory_context.is_empty() {
        text.push_str("\n\n");
        text.push_str(memory_context);
    }
    text
}

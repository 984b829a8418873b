// Data types for Executor module

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Outcome of one `Executor::run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured print/debug output, already truncated to the budget
    pub output: String,
    /// Script fault, rejected import, syntax error or timeout message
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timeout: bool,
    /// The finalize binding was called during this run
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub final_value: Option<Value>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn completed(output: String, final_value: Option<Value>, duration: Duration) -> Self {
        Self {
            output,
            error: None,
            timeout: false,
            is_final: final_value.is_some(),
            final_value,
            duration,
        }
    }

    pub fn failed(output: String, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            output,
            error: Some(error.into()),
            timeout: false,
            is_final: false,
            final_value: None,
            duration,
        }
    }

    pub fn timed_out(output: String, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            timeout: true,
            ..Self::failed(output, error, duration)
        }
    }

    /// Attach a finalize value observed before the fault
    pub fn with_final(mut self, final_value: Option<Value>) -> Self {
        self.is_final = final_value.is_some();
        self.final_value = final_value;
        self
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && !self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_invariant() {
        let d = Duration::from_millis(1);
        let cases = [
            ExecutionResult::completed(String::new(), None, d),
            ExecutionResult::completed("x".into(), Some(json!(1)), d),
            ExecutionResult::failed(String::new(), "boom", d),
            ExecutionResult::timed_out(String::new(), "execution timeout", d),
            ExecutionResult::failed(String::new(), "boom", d).with_final(Some(json!(2))),
        ];

        for r in cases {
            assert_eq!(r.success(), r.error.is_none() && !r.timeout);
        }
    }

    #[test]
    fn test_constructors() {
        let d = Duration::ZERO;
        let done = ExecutionResult::completed("hi\n".into(), Some(json!("v")), d);
        assert!(done.is_final);
        assert!(done.success());

        let timeout = ExecutionResult::timed_out("partial".into(), "execution timeout", d);
        assert!(timeout.timeout);
        assert!(!timeout.success());
        assert_eq!(timeout.output, "partial");
    }
}

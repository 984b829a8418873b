// Memory module - per-run working memory shared with executed code

use crate::namespace::{render_value, Binding, Namespace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Character budget for a single value in the rendered context
const VALUE_PREVIEW_CHARS: usize = 200;

/// Name of the snapshot binding exposed to scripts
pub const MEMORY_BINDING: &str = "memory";

/// A recorded dead end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedApproach {
    pub approach: String,
    pub reason: Option<String>,
}

impl std::fmt::Display for FailedApproach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {}", self.approach, reason),
            None => write!(f, "{}", self.approach),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Named values in first-store order
    variables: Vec<(String, Value)>,
    observations: Vec<String>,
    failed_approaches: Vec<FailedApproach>,
}

/// Scratch space that survives across executions within one run.
///
/// Clones share the same state: the control loop keeps one handle and the
/// injected bindings hold the others. Never share a handle across runs.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    state: Arc<Mutex<MemoryState>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a named value, overwriting in place
    pub fn store(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut state = self.lock();
        match state.variables.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => state.variables.push((name, value)),
        }
    }

    pub fn recall(&self, name: &str) -> Option<Value> {
        self.lock()
            .variables
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn observe(&self, observation: impl Into<String>) {
        self.lock().observations.push(observation.into());
    }

    pub fn fail(&self, approach: impl Into<String>, reason: Option<String>) {
        self.lock().failed_approaches.push(FailedApproach {
            approach: approach.into(),
            reason,
        });
    }

    /// Reset all compartments. Only between independent runs.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.variables.clear();
        state.observations.clear();
        state.failed_approaches.clear();
    }

    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.variables.is_empty()
            && state.observations.is_empty()
            && state.failed_approaches.is_empty()
    }

    pub fn variables(&self) -> Vec<(String, Value)> {
        self.lock().variables.clone()
    }

    pub fn observations(&self) -> Vec<String> {
        self.lock().observations.clone()
    }

    pub fn failed_approaches(&self) -> Vec<FailedApproach> {
        self.lock().failed_approaches.clone()
    }

    /// Compact summary for the next model prompt; empty when nothing is stored.
    pub fn to_context(&self) -> String {
        let state = self.lock();
        let mut parts = Vec::new();

        if !state.variables.is_empty() {
            let lines = state
                .variables
                .iter()
                .map(|(name, value)| format!("- {} = {}", name, preview(&render_value(value))))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("### Stored Values\n{}", lines));
        }

        if !state.observations.is_empty() {
            let lines = state
                .observations
                .iter()
                .enumerate()
                .map(|(i, o)| format!("{}. {}", i + 1, preview(o)))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("### Observations\n{}", lines));
        }

        if !state.failed_approaches.is_empty() {
            let lines = state
                .failed_approaches
                .iter()
                .map(|f| format!("- {}", preview(&f.to_string())))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("### Failed Approaches\n{}", lines));
        }

        if parts.is_empty() {
            return String::new();
        }
        format!("## Working Memory\n{}", parts.join("\n\n"))
    }

    /// Snapshot of all compartments as one JSON object
    pub fn snapshot(&self) -> Value {
        let state = self.lock();
        let variables: serde_json::Map<String, Value> = state.variables.iter().cloned().collect();
        json!({
            "variables": variables,
            "observations": state.observations,
            "failed_approaches": state.failed_approaches,
        })
    }

    /// Bindings for the sandbox: the snapshot, the accessor functions, and
    /// every stored variable under its bare name.
    pub fn to_namespace(&self) -> Namespace {
        let mut namespace: Namespace = vec![(MEMORY_BINDING.to_string(), Binding::Value(self.snapshot()))];

        let memory = self.clone();
        namespace.push((
            "store".to_string(),
            Binding::function(2, move |args| {
                let name = string_arg(&args[0], "store")?;
                memory.store(name, args[1].clone());
                Ok(Value::Null)
            }),
        ));

        let memory = self.clone();
        namespace.push((
            "recall".to_string(),
            Binding::function(1, move |args| {
                let name = string_arg(&args[0], "recall")?;
                Ok(memory.recall(&name).unwrap_or(Value::Null))
            }),
        ));

        let memory = self.clone();
        namespace.push((
            "observe".to_string(),
            Binding::function(1, move |args| {
                memory.observe(render_value(&args[0]));
                Ok(Value::Null)
            }),
        ));

        let memory = self.clone();
        namespace.push((
            "fail".to_string(),
            Binding::function(1, move |args| {
                memory.fail(render_value(&args[0]), None);
                Ok(Value::Null)
            }),
        ));

        let memory = self.clone();
        namespace.push((
            "fail".to_string(),
            Binding::function(2, move |args| {
                memory.fail(render_value(&args[0]), Some(render_value(&args[1])));
                Ok(Value::Null)
            }),
        ));

        for (name, value) in self.variables() {
            namespace.push((name, Binding::Value(value)));
        }

        namespace
    }
}

fn string_arg(value: &Value, func: &str) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{}: name must be a string, got {}", func, value))
}

fn preview(text: &str) -> String {
    if text.chars().count() <= VALUE_PREVIEW_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(VALUE_PREVIEW_CHARS).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(namespace: &Namespace, name: &str, args: Vec<Value>) -> Result<Value, String> {
        namespace
            .iter()
            .find_map(|(n, b)| match b {
                Binding::Function(f) if n == name && f.arity() == args.len() => Some(f.clone()),
                _ => None,
            })
            .expect("binding should exist")
            .call(args)
    }

    #[test]
    fn test_empty_memory_renders_nothing() {
        let memory = WorkingMemory::new();
        assert!(memory.is_empty());
        assert_eq!(memory.to_context(), "");
    }

    #[test]
    fn test_store_overwrites_in_place() {
        let memory = WorkingMemory::new();
        memory.store("a", json!(1));
        memory.store("b", json!(2));
        memory.store("a", json!(3));

        assert_eq!(
            memory.variables(),
            vec![("a".to_string(), json!(3)), ("b".to_string(), json!(2))]
        );
        assert_eq!(memory.recall("a"), Some(json!(3)));
        assert_eq!(memory.recall("missing"), None);
    }

    #[test]
    fn test_context_lists_everything_in_order() {
        let memory = WorkingMemory::new();
        memory.store("k", json!(7));
        memory.observe("first");
        memory.observe("second");
        memory.fail("brute force", Some("too slow".to_string()));

        let ctx = memory.to_context();
        assert!(ctx.starts_with("## Working Memory"));
        assert!(ctx.contains("- k = 7"));
        assert!(ctx.contains("- brute force: too slow"));
        let first = ctx.find("1. first").unwrap();
        let second = ctx.find("2. second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_context_truncates_long_values() {
        let memory = WorkingMemory::new();
        memory.store("blob", json!("z".repeat(1000)));

        let ctx = memory.to_context();
        assert!(ctx.contains(&format!("{}...", "z".repeat(VALUE_PREVIEW_CHARS))));
        assert!(!ctx.contains(&"z".repeat(VALUE_PREVIEW_CHARS + 1)));
    }

    #[test]
    fn test_namespace_functions_mutate_shared_state() {
        let memory = WorkingMemory::new();
        let namespace = memory.to_namespace();

        call(&namespace, "store", vec![json!("k"), json!(7)]).unwrap();
        call(&namespace, "observe", vec![json!("saw it")]).unwrap();
        call(&namespace, "fail", vec![json!("guessing")]).unwrap();

        assert_eq!(call(&namespace, "recall", vec![json!("k")]), Ok(json!(7)));
        assert_eq!(call(&namespace, "recall", vec![json!("nope")]), Ok(Value::Null));
        assert_eq!(memory.observations(), vec!["saw it".to_string()]);
        assert_eq!(memory.failed_approaches()[0].approach, "guessing");

        let ctx = memory.to_context();
        assert!(ctx.contains("k = 7"));
        assert!(ctx.contains("saw it"));
    }

    #[test]
    fn test_namespace_exposes_variables_by_name() {
        let memory = WorkingMemory::new();
        memory.store("answer", json!(42));

        let namespace = memory.to_namespace();
        let bound = namespace.iter().find_map(|(n, b)| match b {
            Binding::Value(v) if n == "answer" => Some(v.clone()),
            _ => None,
        });
        assert_eq!(bound, Some(json!(42)));

        let snapshot = namespace.iter().find_map(|(n, b)| match b {
            Binding::Value(v) if n == MEMORY_BINDING => Some(v.clone()),
            _ => None,
        });
        assert_eq!(snapshot.unwrap()["variables"]["answer"], json!(42));
    }

    #[test]
    fn test_store_requires_string_name() {
        let memory = WorkingMemory::new();
        let namespace = memory.to_namespace();
        assert!(call(&namespace, "store", vec![json!(1), json!(2)]).is_err());
    }

    #[test]
    fn test_clear() {
        let memory = WorkingMemory::new();
        memory.store("k", json!(1));
        memory.observe("o");
        memory.fail("f", None);
        memory.clear();
        assert!(memory.is_empty());
    }
}

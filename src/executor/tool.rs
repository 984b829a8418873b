// Tool trait and closure-backed implementation

use crate::namespace::{Binding, Namespace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Primitive parameter types a tool may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Int,
    Float,
    Bool,
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Int => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::String => "string",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// One declared tool parameter; `default` must be a literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Some(default),
        }
    }
}

/// A pre-validated host callable exposed to scripts by name
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn params(&self) -> &[ToolParam];

    /// Run the tool with positional arguments, defaults already filled
    fn call(&self, args: Vec<Value>) -> Result<Value, String>;

    /// Call signature as shown to the model, e.g. `search(query: string, limit: int = 5)`
    fn signature(&self) -> String {
        let params = self
            .params()
            .iter()
            .map(|p| match &p.default {
                Some(d) => format!("{}: {} = {}", p.name, p.kind, d),
                None => format!("{}: {}", p.name, p.kind),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name(), params)
    }
}

type ToolHandler = dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync;

/// Tool backed by a closure
pub struct FnTool {
    name: String,
    description: String,
    params: Vec<ToolParam>,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ToolParam>,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            handler: Arc::new(handler),
        }
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn params(&self) -> &[ToolParam] {
        &self.params
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.handler)(args)
    }
}

/// Check argument types and fill trailing defaults
fn prepare_args(tool: &dyn Tool, mut args: Vec<Value>) -> Result<Vec<Value>, String> {
    let params = tool.params();
    for (param, value) in params.iter().zip(&args) {
        if !param.kind.accepts(value) {
            return Err(format!(
                "{}: parameter '{}' expects {}, got {}",
                tool.name(),
                param.name,
                param.kind,
                value
            ));
        }
    }
    for param in &params[args.len().min(params.len())..] {
        match &param.default {
            Some(default) => args.push(default.clone()),
            None => {
                return Err(format!(
                    "{}: missing required parameter '{}'",
                    tool.name(),
                    param.name
                ))
            }
        }
    }
    Ok(args)
}

/// Bindings for a tool: one function per accepted arity.
///
/// Trailing parameters with defaults may be omitted, so a tool with two
/// required and one defaulted parameter binds arities 2 and 3.
pub fn tool_bindings(tool: Arc<dyn Tool>) -> Namespace {
    let params = tool.params();
    let required = params
        .iter()
        .rposition(|p| p.default.is_none())
        .map_or(0, |i| i + 1);

    (required..=params.len())
        .map(|arity| {
            let tool = Arc::clone(&tool);
            let name = tool.name().to_string();
            let binding = Binding::function(arity, move |args| {
                let args = prepare_args(tool.as_ref(), args)?;
                tool.call(args)
            });
            (name, binding)
        })
        .collect()
}

// Bindings injected into the sandbox namespace

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Handler = dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync;

/// A host function callable from script code with a fixed arity.
///
/// Arguments and return values cross the boundary as JSON values.
#[derive(Clone)]
pub struct HostFn {
    arity: usize,
    handler: Arc<Handler>,
}

impl HostFn {
    pub fn new<F>(arity: usize, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            arity,
            handler: Arc::new(handler),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        if args.len() != self.arity {
            return Err(format!(
                "expected {} argument(s), got {}",
                self.arity,
                args.len()
            ));
        }
        (self.handler)(args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFn").field("arity", &self.arity).finish()
    }
}

/// One named entry of a sandbox namespace
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Function(HostFn),
}

impl Binding {
    pub fn function<F>(arity: usize, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Binding::Function(HostFn::new(arity, handler))
    }
}

/// Ordered bindings; a name may repeat for functions of different arity
pub type Namespace = Vec<(String, Binding)>;

/// Render a value the way it appears in prompts and observations
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_fn_checks_arity() {
        let add = HostFn::new(2, |args| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = args[1].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        });

        assert_eq!(add.call(vec![json!(2), json!(3)]), Ok(json!(5)));
        assert!(add.call(vec![json!(2)]).is_err());
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(7)), "7");
        assert_eq!(render_value(&json!({"a": 1})), r#"{"a":1}"#);
    }
}

// Built-in modules served to `import` statements

use crate::executor::convert::{dynamic_to_json, json_to_dynamic};
use rhai::{Array, Dynamic, EvalAltResult, ImmutableString, Module, FLOAT, INT};
use std::collections::BTreeMap;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

fn as_float(value: &Dynamic) -> FnResult<FLOAT> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i as FLOAT);
    }
    Err(format!("expected a number, got {}", value.type_name()).into())
}

fn math_module() -> Module {
    let mut module = Module::new();
    module.set_var("PI", std::f64::consts::PI);
    module.set_var("E", std::f64::consts::E);
    module.set_var("TAU", std::f64::consts::TAU);

    module.set_native_fn("clamp", |x: FLOAT, lo: FLOAT, hi: FLOAT| -> FnResult<FLOAT> {
        if lo > hi {
            return Err("clamp: lower bound exceeds upper bound".into());
        }
        Ok(x.clamp(lo, hi))
    });
    module.set_native_fn("hypot", |x: FLOAT, y: FLOAT| -> FnResult<FLOAT> {
        Ok(x.hypot(y))
    });
    module.set_native_fn("sum", |items: Array| -> FnResult<FLOAT> {
        items.iter().map(as_float).sum()
    });
    module.set_native_fn("mean", |items: Array| -> FnResult<FLOAT> {
        if items.is_empty() {
            return Err("mean of an empty array".into());
        }
        let total: FLOAT = items.iter().map(as_float).sum::<FnResult<FLOAT>>()?;
        Ok(total / items.len() as FLOAT)
    });
    module
}

fn json_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("parse", |text: ImmutableString| -> FnResult<Dynamic> {
        let value: serde_json::Value =
            serde_json::from_str(text.as_str()).map_err(|e| format!("json::parse: {}", e))?;
        Ok(json_to_dynamic(&value))
    });
    module.set_native_fn("stringify", |value: Dynamic| -> FnResult<String> {
        Ok(dynamic_to_json(&value).to_string())
    });
    module.set_native_fn("pretty", |value: Dynamic| -> FnResult<String> {
        serde_json::to_string_pretty(&dynamic_to_json(&value))
            .map_err(|e| format!("json::pretty: {}", e).into())
    });
    module
}

fn text_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("words", |text: ImmutableString| -> FnResult<Array> {
        Ok(text
            .split_whitespace()
            .map(|w| Dynamic::from(w.to_string()))
            .collect())
    });
    module.set_native_fn("lines", |text: ImmutableString| -> FnResult<Array> {
        Ok(text.lines().map(|l| Dynamic::from(l.to_string())).collect())
    });
    module.set_native_fn("truncate", |text: ImmutableString, max_chars: INT| -> FnResult<String> {
        let max_chars = usize::try_from(max_chars).map_err(|_| "text::truncate: negative length")?;
        if text.chars().count() <= max_chars {
            return Ok(text.to_string());
        }
        Ok(format!("{}...", text.chars().take(max_chars).collect::<String>()))
    });
    module
}

fn time_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("now", || -> FnResult<String> {
        Ok(chrono::Utc::now().to_rfc3339())
    });
    module.set_native_fn("unix", || -> FnResult<INT> { Ok(chrono::Utc::now().timestamp()) });
    module
}

/// Modules available to every executor, keyed by import path
pub fn builtin_modules() -> BTreeMap<String, Module> {
    BTreeMap::from([
        ("math".to_string(), math_module()),
        ("json".to_string(), json_module()),
        ("text".to_string(), text_module()),
        ("time".to_string(), time_module()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::config::DEFAULT_ALLOWED_IMPORTS;
    use rhai::module_resolvers::StaticModuleResolver;
    use rhai::Engine;

    fn engine() -> Engine {
        let mut resolver = StaticModuleResolver::new();
        for (name, module) in builtin_modules() {
            resolver.insert(name, module);
        }
        let mut engine = Engine::new();
        engine.set_module_resolver(resolver);
        engine
    }

    #[test]
    fn test_builtins_match_default_allowlist() {
        let names: Vec<String> = builtin_modules().into_keys().collect();
        let mut expected: Vec<String> = DEFAULT_ALLOWED_IMPORTS.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_math_module() {
        let engine = engine();
        let mean: FLOAT = engine
            .eval(r#"import "math" as m; m::mean([1, 2, 3.0])"#)
            .unwrap();
        assert_eq!(mean, 2.0);

        let clamped: FLOAT = engine
            .eval(r#"import "math" as m; m::clamp(5.0, 0.0, 1.0)"#)
            .unwrap();
        assert_eq!(clamped, 1.0);

        assert!(engine
            .eval::<FLOAT>(r#"import "math" as m; m::mean([])"#)
            .is_err());
    }

    #[test]
    fn test_json_module_round_trip() {
        let engine = engine();
        let out: String = engine
            .eval(r#"import "json" as j; let v = j::parse("{\"a\": [1, 2]}"); j::stringify(v)"#)
            .unwrap();
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_text_module() {
        let engine = engine();
        let count: INT = engine
            .eval(r#"import "text" as t; t::words("a  b c").len()"#)
            .unwrap();
        assert_eq!(count, 3);

        let cut: String = engine
            .eval(r#"import "text" as t; t::truncate("abcdef", 3)"#)
            .unwrap();
        assert_eq!(cut, "abc...");
    }
}

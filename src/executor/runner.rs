// Script executor - runs program text in an in-process Rhai sandbox

use crate::executor::config::{ExecutorConfig, DEFAULT_ALLOWED_IMPORTS};
use crate::executor::convert::{dynamic_to_json, json_to_dynamic};
use crate::executor::error::ExecutorError;
use crate::executor::gate::ImportGate;
use crate::executor::modules::builtin_modules;
use crate::executor::types::ExecutionResult;
use crate::limits::{select_timeout_context, Halt, Interrupt, ResourceLimits, TimeoutContext};
use crate::namespace::{Binding, HostFn};
use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Module, Position, Scope, AST, FLOAT, INT};
use serde_json::Value;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name of the binding that records the terminal answer
pub const FINALIZE_FN: &str = "final_answer";

/// Sandbox backend contract.
///
/// `ScriptExecutor` is the in-process implementation. Backends that need
/// hard cancellation or memory caps (a child process, a container) plug in
/// behind the same trait.
pub trait Executor: Send {
    /// Execute program text. Script faults are reported in the result.
    fn run(&mut self, code: &str) -> ExecutionResult;

    /// Bind a value or function into the persistent namespace
    fn inject(&mut self, name: &str, binding: Binding);

    /// Ask the in-flight run to stop. Returns immediately.
    fn kill(&self);

    /// Handle for calling `kill` from another thread while `run` is busy
    fn kill_switch(&self) -> Interrupt;

    /// Drop script-defined state, keeping only injected bindings
    fn reset(&mut self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn halt_error(halt: Halt) -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::from(format!("{:?}", halt)), Position::NONE).into()
}

fn sleep_for(interrupt: &Interrupt, seconds: FLOAT) -> Result<(), Box<EvalAltResult>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("sleep: invalid duration {}", seconds).into());
    }
    let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
    interrupt.sleep(duration).map_err(halt_error)
}

/// In-process Rhai executor
pub struct ScriptExecutor {
    engine: Engine,
    scope: Scope<'static>,
    /// Functions defined by earlier successful runs
    library: AST,
    /// Injected values, restored by `reset`
    baseline: Vec<(String, Dynamic)>,
    gate: ImportGate,
    modules: BTreeMap<String, Module>,
    limits: ResourceLimits,
    timer: Arc<dyn TimeoutContext>,
    interrupt: Interrupt,
    output: Arc<Mutex<String>>,
    /// Result sentinel: set by the finalize binding
    sentinel: Arc<Mutex<Option<Value>>>,
}

impl ScriptExecutor {
    pub fn new(config: &ExecutorConfig, limits: ResourceLimits) -> Self {
        let interrupt = Interrupt::new();
        let output = Arc::new(Mutex::new(String::new()));
        let sentinel = Arc::new(Mutex::new(None));
        let timer = select_timeout_context(config.timeout_mode);

        let mut engine = Engine::new();

        // Safety limits
        engine.set_max_expr_depths(64, 32);
        engine.set_max_call_levels(64);
        engine.set_max_string_size(1_048_576); // 1MB
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(100_000);
        engine.disable_symbol("eval");

        let sink = Arc::clone(&output);
        engine.on_print(move |text| {
            let mut out = lock(&sink);
            out.push_str(text);
            out.push('\n');
        });

        let sink = Arc::clone(&output);
        engine.on_debug(move |text, _source, _pos| {
            let mut out = lock(&sink);
            out.push_str("[debug] ");
            out.push_str(text);
            out.push('\n');
        });

        let progress = interrupt.clone();
        engine.on_progress(move |_ops| {
            progress
                .check()
                .map(|halt| Dynamic::from(format!("{:?}", halt)))
        });

        let waiter = interrupt.clone();
        engine.register_fn("sleep", move |seconds: FLOAT| sleep_for(&waiter, seconds));
        let waiter = interrupt.clone();
        engine.register_fn("sleep", move |seconds: INT| sleep_for(&waiter, seconds as FLOAT));

        let slot = Arc::clone(&sentinel);
        engine.register_fn(FINALIZE_FN, move |value: Dynamic| {
            let mut slot = lock(&slot);
            if slot.is_some() {
                warn!("final answer already recorded in this execution, ignoring");
                return;
            }
            *slot = Some(dynamic_to_json(&value));
        });

        let mut gate = ImportGate::new(DEFAULT_ALLOWED_IMPORTS.iter().copied());
        for module in &config.extra_imports {
            gate.allow(module.clone());
        }

        let mut executor = Self {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            baseline: Vec::new(),
            gate,
            modules: builtin_modules(),
            limits,
            timer,
            interrupt,
            output,
            sentinel,
        };
        executor.install_modules();

        info!(
            timeout_secs = executor.limits.timeout_seconds,
            max_output_bytes = executor.limits.max_output_bytes,
            timeout_mode = ?executor.timer.mode(),
            allowed = %executor.allowed_imports().join(","),
            "executor initialized"
        );
        executor
    }

    fn install_modules(&mut self) {
        let mut resolver = StaticModuleResolver::new();
        for (name, module) in &self.modules {
            resolver.insert(name.clone(), module.clone());
        }
        self.engine.set_module_resolver(resolver);
    }

    /// Serve `module` to `import "<name>"` and add it to the allowlist
    pub fn register_module(&mut self, name: impl Into<String>, module: Module) {
        let name = name.into();
        self.gate.allow(name.clone());
        self.modules.insert(name, module);
        self.install_modules();
    }

    pub fn allowed_imports(&self) -> Vec<String> {
        self.gate.allowed().map(str::to_string).collect()
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    fn bind_scope(&mut self, name: &str, value: Dynamic) {
        if self.scope.is_constant(name) == Some(true) {
            warn!(name = name, "cannot rebind a script constant, skipping injection");
            return;
        }
        self.scope.set_or_push(name.to_string(), value);
    }

    fn register_host_fn(&mut self, name: &str, func: HostFn) {
        let arg_types = vec![TypeId::of::<Dynamic>(); func.arity()];
        let fn_name = name.to_string();
        self.engine.register_raw_fn(
            name.to_string(),
            arg_types,
            move |_ctx, args| -> Result<Dynamic, Box<EvalAltResult>> {
                let args: Vec<Value> = args.iter().map(|a| dynamic_to_json(&**a)).collect();
                func.call(args)
                    .map(|v| json_to_dynamic(&v))
                    .map_err(|e| {
                        if e.starts_with(fn_name.as_str()) {
                            e.into()
                        } else {
                            format!("{}: {}", fn_name, e).into()
                        }
                    })
            },
        );
    }

    fn begin_run(&mut self) {
        lock(&self.output).clear();
        lock(&self.sentinel).take();
        self.interrupt.rearm();
    }

    fn classify(&self, err: EvalAltResult) -> ExecutorError {
        if self.interrupt.is_killed() {
            return ExecutorError::Killed;
        }
        match err {
            EvalAltResult::ErrorFunctionNotFound(signature, position) => {
                ExecutorError::FunctionNotFound {
                    signature,
                    position: position.to_string(),
                }
            }
            other => ExecutorError::Runtime(other.to_string()),
        }
    }
}

impl Executor for ScriptExecutor {
    fn run(&mut self, code: &str) -> ExecutionResult {
        let started = Instant::now();
        self.begin_run();

        // Nothing below may run before the compiler and the gate accept the code
        let ast = match self.engine.compile(code) {
            Ok(ast) => ast,
            Err(e) => {
                let err = ExecutorError::Syntax(e.to_string());
                debug!(error = %err, "script failed to compile");
                return ExecutionResult::failed(String::new(), err.to_string(), started.elapsed());
            }
        };
        let imports = match self.gate.check(&ast) {
            Ok(imports) => imports,
            Err(e) => {
                let err = ExecutorError::from(e);
                warn!(error = %err, "script rejected before execution");
                return ExecutionResult::failed(String::new(), err.to_string(), started.elapsed());
            }
        };

        debug!(
            code_bytes = code.len(),
            imports = imports.len(),
            "executing script"
        );

        let program = self.library.merge(&ast);
        let engine = &self.engine;
        let scope = &mut self.scope;
        let outcome = self.limits.timed(self.timer.as_ref(), &self.interrupt, || {
            engine.run_ast_with_scope(scope, &program)
        });

        let raw_output = std::mem::take(&mut *lock(&self.output));
        let (output, truncated) = self.limits.truncate_output(&raw_output);
        let final_value = lock(&self.sentinel).take();
        let duration = started.elapsed();

        let result = match outcome {
            Err(exceeded) => {
                let err = ExecutorError::from(exceeded);
                warn!(duration_ms = duration.as_millis() as u64, "script timed out");
                ExecutionResult::timed_out(output, err.to_string(), duration).with_final(final_value)
            }
            Ok(Err(err)) => {
                let err = self.classify(*err);
                debug!(error = %err, "script raised an error");
                ExecutionResult::failed(output, err.to_string(), duration).with_final(final_value)
            }
            Ok(Ok(())) => {
                self.library = self.library.merge(&ast.clone_functions_only());
                ExecutionResult::completed(output, final_value, duration)
            }
        };

        info!(
            duration_ms = duration.as_millis() as u64,
            output_bytes = raw_output.len(),
            truncated = truncated,
            success = result.success(),
            is_final = result.is_final,
            "script executed"
        );
        result
    }

    fn inject(&mut self, name: &str, binding: Binding) {
        match binding {
            Binding::Value(value) => {
                let value = json_to_dynamic(&value);
                match self.baseline.iter_mut().find(|(n, _)| n == name) {
                    Some((_, slot)) => *slot = value.clone(),
                    None => self.baseline.push((name.to_string(), value.clone())),
                }
                self.bind_scope(name, value);
            }
            Binding::Function(func) => {
                debug!(name = name, arity = func.arity(), "registering host function");
                self.register_host_fn(name, func);
            }
        }
    }

    fn kill(&self) {
        info!("kill requested");
        self.interrupt.kill();
    }

    fn kill_switch(&self) -> Interrupt {
        self.interrupt.clone()
    }

    fn reset(&mut self) {
        self.scope.clear();
        self.library = AST::empty();
        for (name, value) in &self.baseline {
            self.scope.push_dynamic(name.clone(), value.clone());
        }
        self.begin_run();
        debug!(bindings = self.baseline.len(), "executor reset to baseline");
    }
}

//! Rhai engine setup and expression evaluation.

use crate::error::{GraphError, Result, ResultExt};
use crate::scripting::{CompiledExpression, ScriptCache, SharedScriptCache};
use crate::sync::{lock_mutex, write_lock};
use rhai::{Dynamic, Engine, Scope};
use std::sync::{Arc, Mutex, RwLock};

/// Values bound in the scope of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExpressionInputs {
    /// The step's input, bound as `value`.
    pub value: f64,
    /// Accumulated logical time in seconds.
    pub time: f64,
    /// Logical time step of the round in seconds.
    pub dt: f64,
    /// Previous output of the step.
    pub prev: f64,
}

/// Sandboxed Rhai engine evaluating scalar expressions.
pub struct ExpressionEngine {
    engine: Engine,
    cache: SharedScriptCache,
    scope: Mutex<Scope<'static>>,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(RwLock::new(ScriptCache::new())))
    }

    pub fn with_cache(cache: SharedScriptCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self {
            engine,
            cache,
            scope: Mutex::new(Scope::new()),
        }
    }

    /// Safety limits plus the math and signal helpers available to scripts.
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("smooth", |current: f64, previous: f64, alpha: f64| -> f64 {
            if previous.is_nan() {
                current
            } else {
                let alpha = alpha.clamp(0.0, 1.0);
                alpha * previous + (1.0 - alpha) * current
            }
        });
        engine.register_fn(
            "lowpass",
            |current: f64, previous: f64, cutoff_hz: f64, dt: f64| -> f64 {
                if previous.is_nan() || dt <= 0.0 || cutoff_hz <= 0.0 {
                    return current;
                }
                let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
                let alpha = dt / (rc + dt);
                previous + alpha * (current - previous)
            },
        );
        engine.register_fn("deadband", |value: f64, center: f64, width: f64| -> f64 {
            if (value - center).abs() <= width / 2.0 {
                center
            } else {
                value
            }
        });

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("exp", |x: f64| x.exp());
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("log10", |x: f64| x.log10());
        engine.register_fn("sin", |x: f64| x.sin());
        engine.register_fn("cos", |x: f64| x.cos());
        engine.register_fn("tan", |x: f64| x.tan());
        engine.register_fn("atan2", |y: f64, x: f64| y.atan2(x));
        engine.register_fn("tanh", |x: f64| x.tanh());
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn("pi", || std::f64::consts::PI);
        engine.register_fn("is_nan", |x: f64| x.is_nan());
        engine.register_fn("sign", |x: f64| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        });
    }

    /// Compile (or fetch from the cache) an expression.
    pub fn compile(&self, source: &str) -> Result<CompiledExpression> {
        write_lock(&self.cache).get_or_compile(&self.engine, source)
    }

    /// Check that `source` compiles.
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| GraphError::Script(format!("Compilation error: {}", e)))
    }

    /// Evaluate a compiled expression to a number.
    pub fn eval(&self, expression: &CompiledExpression, inputs: ExpressionInputs) -> Result<f64> {
        let mut scope = lock_mutex(&self.scope);
        scope.clear();
        scope.push("value", inputs.value);
        scope.push("time", inputs.time);
        scope.push("dt", inputs.dt);
        scope.push("prev", inputs.prev);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &expression.ast)
            .context("Execution error")?;

        if let Ok(f) = result.as_float() {
            Ok(f)
        } else if let Ok(i) = result.as_int() {
            Ok(i as f64)
        } else if let Ok(b) = result.as_bool() {
            Ok(if b { 1.0 } else { 0.0 })
        } else {
            Err(GraphError::Script(format!(
                "Expression must return a number, got {}",
                result.type_name()
            )))
        }
    }

    /// Compile and evaluate in one go.
    pub fn eval_str(&self, source: &str, inputs: ExpressionInputs) -> Result<f64> {
        let expression = self.compile(source)?;
        self.eval(&expression, inputs)
    }

    pub fn cache(&self) -> &SharedScriptCache {
        &self.cache
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("cached", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}

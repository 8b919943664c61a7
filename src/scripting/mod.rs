//! Rhai expressions for the `stepgraph.Expression` step.
//!
//! An expression is evaluated once per compute and must return a number.
//!
//! ## Variables
//!
//! - `value` - the step's `in` input (`in` itself is a Rhai keyword)
//! - `time` - accumulated logical time in seconds
//! - `dt` - logical time step of the current round in seconds
//! - `prev` - the step's previous output (NaN before the first compute)
//!
//! ## Functions
//!
//! Common math (`sin`, `cos`, `sqrt`, `pow`, `exp`, `clamp`, `min`, `max`,
//! ...) plus a few signal helpers:
//!
//! - `smooth(current, previous, alpha)` - exponential smoothing
//! - `lowpass(current, previous, cutoff_hz, dt)` - first-order lowpass
//! - `deadband(value, center, width)`
//!
//! ## Examples
//!
//! ```rhai
//! // 1 Hz sine wave
//! sin(time * 2.0 * pi())
//! ```
//!
//! ```rhai
//! // lowpass the input at 5 Hz
//! lowpass(value, prev, 5.0, dt)
//! ```

mod engine;

pub use engine::{ExpressionEngine, ExpressionInputs};

use crate::error::{GraphError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled expression.
#[derive(Clone)]
pub struct CompiledExpression {
    ast: AST,
    source: String,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .finish()
    }
}

/// Compiled expressions keyed by source text.
#[derive(Default)]
pub struct ScriptCache {
    cache: HashMap<String, CompiledExpression>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached expression or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledExpression> {
        if let Some(expression) = self.cache.get(source) {
            return Ok(expression.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| GraphError::Script(format!("Compilation error: {}", e)))?;

        let expression = CompiledExpression {
            ast,
            source: source.to_string(),
        };
        self.cache.insert(source.to_string(), expression.clone());
        Ok(expression)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

pub fn create_shared_cache() -> SharedScriptCache {
    Arc::new(RwLock::new(ScriptCache::new()))
}

/// Ready-made expressions.
pub mod builtins {
    /// Pass the input through.
    pub const IDENTITY: &str = "value";

    /// 1 Hz sine wave (ignores the input)
    pub const TEST_SINE: &str = "sin(time * 2.0 * pi())";

    /// Ramp resetting every 10 seconds
    pub const TEST_RAMP: &str = "time % 10.0";

    /// Exponential smoothing with alpha = 0.8
    pub const SMOOTH_80: &str = "smooth(value, prev, 0.8)";

    /// First-order lowpass at 1 Hz
    pub const LOWPASS_1HZ: &str = "lowpass(value, prev, 1.0, dt)";

    /// Accumulate the input over time, using the previous output as state.
    pub const INTEGRATE: &str = "if is_nan(prev) { value * dt } else { prev + value * dt }";

    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Identity", IDENTITY),
            ("Test: Sine Wave", TEST_SINE),
            ("Test: Ramp", TEST_RAMP),
            ("Smooth (80%)", SMOOTH_80),
            ("Lowpass 1 Hz", LOWPASS_1HZ),
            ("Integrate", INTEGRATE),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_cache() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();

        let first = cache.get_or_compile(&engine, "value * 2.0").unwrap();
        let second = cache.get_or_compile(&engine, "value * 2.0").unwrap();
        assert_eq!(first.source(), second.source());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_builtins_compile() {
        let engine = ExpressionEngine::new();
        for (name, source) in builtins::all() {
            assert!(engine.validate(source).is_ok(), "Built-in '{}' failed to compile", name);
        }
    }

    #[test]
    fn test_integrate_builtin() {
        let engine = ExpressionEngine::new();
        let first = engine
            .eval_str(
                builtins::INTEGRATE,
                ExpressionInputs {
                    value: 2.0,
                    dt: 0.5,
                    prev: f64::NAN,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(first, 1.0);
        let second = engine
            .eval_str(
                builtins::INTEGRATE,
                ExpressionInputs {
                    value: 2.0,
                    dt: 0.5,
                    prev: first,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(second, 2.0);
    }
}

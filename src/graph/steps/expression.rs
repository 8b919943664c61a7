use crate::error::{GraphError, Result, StepError};
use crate::graph::data::{DataType, DataValue};
use crate::graph::parameter::{ParameterDeclarations, ParameterValue};
use crate::graph::slot::{DataSlot, SlotDeclarations, Validity};
use crate::graph::step::{ComputeContext, Step};
use crate::graph::steps::scalar_validity;
use crate::scripting::{builtins, CompiledExpression, ExpressionEngine, ExpressionInputs};
use std::sync::Arc;

/// Evaluates a Rhai expression over the optional input `in` each round.
///
/// See [`crate::scripting`] for the variables and functions available.
#[derive(Debug)]
pub struct Expression {
    engine: Arc<ExpressionEngine>,
    source: String,
    compiled: Option<CompiledExpression>,
    prev: f64,
}

impl Default for Expression {
    fn default() -> Self {
        Self::with_engine(Arc::new(ExpressionEngine::new()))
    }
}

impl Expression {
    /// Share one engine (and its compile cache) between several steps.
    pub fn with_engine(engine: Arc<ExpressionEngine>) -> Self {
        let compiled = match engine.compile(builtins::IDENTITY) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::error!("Failed to compile default expression: {}", e);
                None
            }
        };
        Self {
            engine,
            source: builtins::IDENTITY.to_string(),
            compiled,
            prev: f64::NAN,
        }
    }
}

impl Step for Expression {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.optional_input("in", DataType::Any).output("out", 0.0);
    }

    fn declare_parameters(&self, parameters: &mut ParameterDeclarations) {
        parameters.add("expression", self.source.as_str());
    }

    fn determine_input_validity(&self, _slot: &DataSlot, data: &DataValue) -> Validity {
        scalar_validity(data)
    }

    fn on_start(&mut self) {
        self.prev = f64::NAN;
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        let compiled = self
            .compiled
            .as_ref()
            .ok_or_else(|| StepError::Script("no compiled expression".to_string()))?;
        let value = match ctx.input("in") {
            Some(_) => ctx.input_scalar("in")?,
            None => 0.0,
        };
        let time = ctx.time();
        let inputs = ExpressionInputs {
            value,
            time: time.total_secs(),
            dt: time.dt_secs(),
            prev: self.prev,
        };

        let result = self
            .engine
            .eval(compiled, inputs)
            .map_err(|e| StepError::Script(e.to_string()))?;
        self.prev = result;
        ctx.set_output("out", result)
    }

    fn on_parameter_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        if name != "expression" {
            return Ok(());
        }
        let source = value.as_str().ok_or_else(|| GraphError::InvalidParameter {
            name: name.to_string(),
            message: "expected a string".to_string(),
        })?;
        let compiled = self.engine.compile(source)?;
        self.source = source.to_string();
        self.compiled = Some(compiled);
        Ok(())
    }
}

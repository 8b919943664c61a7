use crate::error::{Result, StepError};
use crate::graph::data::{DataType, DataValue};
use crate::graph::parameter::{ParameterDeclarations, ParameterValue};
use crate::graph::slot::{DataSlot, SlotDeclarations, Validity};
use crate::graph::step::{ComputeContext, Step};

/// `out = gain * in`, element-wise for vectors and matrices.
#[derive(Debug)]
pub struct StaticGain {
    gain: f64,
}

impl Default for StaticGain {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl StaticGain {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }
}

impl Step for StaticGain {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.input("in", DataType::Any).output("out", 0.0);
    }

    fn declare_parameters(&self, parameters: &mut ParameterDeclarations) {
        parameters.add("gain", self.gain);
    }

    fn determine_input_validity(&self, _slot: &DataSlot, data: &DataValue) -> Validity {
        match data {
            DataValue::Bool(_) | DataValue::Text(_) => Validity::Error,
            _ => Validity::Valid,
        }
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        let gain = self.gain;
        let scaled = ctx
            .require_input("in")?
            .map_numeric(|v| v * gain)
            .ok_or_else(|| StepError::UnexpectedData {
                slot: "in".to_string(),
                message: "expected numeric data".to_string(),
            })?;
        ctx.set_output("out", scaled)
    }

    fn on_parameter_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        if name == "gain" {
            if let Some(gain) = value.as_float() {
                self.gain = gain;
            }
        }
        Ok(())
    }
}

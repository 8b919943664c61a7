use crate::error::{Result, StepError};
use crate::graph::parameter::{ParameterDeclarations, ParameterValue};
use crate::graph::slot::SlotDeclarations;
use crate::graph::step::{ComputeContext, Step};

/// Writes parameter `value` to output `out`.
#[derive(Debug, Default)]
pub struct Constant {
    value: f64,
}

impl Step for Constant {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.output("out", self.value);
    }

    fn declare_parameters(&self, parameters: &mut ParameterDeclarations) {
        parameters.add("value", self.value);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        ctx.set_output("out", self.value)
    }

    fn on_parameter_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        if name == "value" {
            if let Some(v) = value.as_float() {
                self.value = v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::data::DataValue;
    use crate::graph::step::StepNode;
    use crate::thread::StepTime;

    #[test]
    fn test_parameter_sets_output() {
        let node = StepNode::new("c", Constant::default()).unwrap();
        node.set_parameter("value", 3i64).unwrap();
        node.compute_once(StepTime::default());
        assert_eq!(node.output_value("out").unwrap(), DataValue::Scalar(3.0));
        assert_eq!(node.parameter("value"), Some(ParameterValue::Float(3.0)));
    }
}

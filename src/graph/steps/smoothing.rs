use crate::error::{GraphError, Result, StepError};
use crate::graph::data::{DataType, DataValue};
use crate::graph::parameter::{ParameterDeclarations, ParameterValue};
use crate::graph::slot::{DataSlot, SlotDeclarations, Validity};
use crate::graph::step::{ComputeContext, Step};
use crate::graph::steps::scalar_validity;

/// First-order lag driven by a looped trigger:
/// `out += dt / tau * (in - out)` with the round's logical time step.
#[derive(Debug)]
pub struct ExponentialSmoothing {
    tau: f64,
    state: f64,
}

impl Default for ExponentialSmoothing {
    fn default() -> Self {
        Self { tau: 1.0, state: 0.0 }
    }
}

impl Step for ExponentialSmoothing {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.input("in", DataType::Any).output("out", 0.0);
    }

    fn declare_parameters(&self, parameters: &mut ParameterDeclarations) {
        parameters.add("tau", self.tau);
    }

    fn determine_input_validity(&self, _slot: &DataSlot, data: &DataValue) -> Validity {
        scalar_validity(data)
    }

    fn is_looped(&self) -> bool {
        true
    }

    fn on_start(&mut self) {
        self.state = 0.0;
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        let input = ctx.input_scalar("in")?;
        let dt = ctx.time().dt_secs();
        self.state += dt / self.tau * (input - self.state);
        if !self.state.is_finite() {
            return Err(StepError::Numeric(format!(
                "state diverged (dt = {}, tau = {})",
                dt, self.tau
            )));
        }
        ctx.set_output("out", self.state)
    }

    fn on_parameter_changed(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        if name == "tau" {
            match value.as_float() {
                Some(tau) if tau > 0.0 => self.tau = tau,
                _ => {
                    return Err(GraphError::InvalidParameter {
                        name: name.to_string(),
                        message: "tau must be positive".to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::data::new_data;
    use crate::graph::step::StepNode;
    use crate::thread::StepTime;
    use std::time::Duration;

    #[test]
    fn test_approaches_input() {
        let node = StepNode::new("lag", ExponentialSmoothing::default()).unwrap();
        assert!(node.is_looped());
        node.set_parameter("tau", 0.1).unwrap();
        node.connect_input("in", new_data(1.0)).unwrap();

        let dt = Duration::from_millis(10);
        let mut total = Duration::ZERO;
        let mut previous = 0.0;
        for _ in 0..50 {
            total += dt;
            node.compute_once(StepTime::new(dt, total));
            let out = node.output_value("out").unwrap().as_scalar().unwrap();
            assert!(out > previous && out < 1.0);
            previous = out;
        }
        assert!(previous > 0.99);
    }

    #[test]
    fn test_rejects_non_positive_tau() {
        let node = StepNode::new("lag", ExponentialSmoothing::default()).unwrap();
        assert!(matches!(
            node.set_parameter("tau", 0.0),
            Err(GraphError::InvalidParameter { .. })
        ));
        assert_eq!(node.parameter("tau"), Some(ParameterValue::Float(1.0)));
    }
}

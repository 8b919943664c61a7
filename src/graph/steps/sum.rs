use crate::error::StepError;
use crate::graph::data::{DataType, DataValue};
use crate::graph::slot::{DataSlot, SlotDeclarations, Validity};
use crate::graph::step::{ComputeContext, Step};
use crate::graph::steps::scalar_validity;

const INPUTS: [&str; 2] = ["a", "b"];

/// Sum of the connected inputs `a` and `b`; unconnected inputs count as zero.
#[derive(Debug, Default)]
pub struct Sum;

impl Step for Sum {
    fn declare(&self, slots: &mut SlotDeclarations) {
        for name in INPUTS {
            slots.optional_input(name, DataType::Any);
        }
        slots.output("out", 0.0);
    }

    fn determine_input_validity(&self, _slot: &DataSlot, data: &DataValue) -> Validity {
        scalar_validity(data)
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        let mut total = 0.0;
        for name in INPUTS {
            if ctx.input(name).is_some() {
                total += ctx.input_scalar(name)?;
            }
        }
        ctx.set_output("out", total)
    }
}

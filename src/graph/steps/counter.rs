use crate::error::{GraphError, Result, StepError};
use crate::graph::slot::SlotDeclarations;
use crate::graph::step::{ComputeContext, Step};

/// Counts its computes on output `out`.
#[derive(Debug, Default)]
pub struct Counter {
    count: i64,
}

impl Step for Counter {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.output("out", 0i64);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        self.count += 1;
        ctx.set_output("out", self.count)
    }

    fn actions(&self) -> Vec<&'static str> {
        vec!["reset"]
    }

    fn call_action(&mut self, name: &str) -> Result<()> {
        match name {
            "reset" => {
                self.count = 0;
                Ok(())
            }
            other => Err(GraphError::UnknownAction(other.to_string())),
        }
    }
}

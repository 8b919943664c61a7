//! Pass-through steps forming the boundary of a nested group.
//!
//! Inside the group they are ordinary steps; the parent group addresses them
//! as `"<group>.<connector>"` when connecting.

use crate::error::StepError;
use crate::graph::data::DataType;
use crate::graph::slot::SlotDeclarations;
use crate::graph::step::{ComputeContext, Step};

pub const GROUP_SOURCE: &str = "stepgraph.GroupSource";
pub const GROUP_SINK: &str = "stepgraph.GroupSink";

/// Input slot of a boundary step.
pub const BOUNDARY_INPUT: &str = "input";
/// Output slot of a boundary step.
pub const BOUNDARY_OUTPUT: &str = "output";

fn declare_boundary(slots: &mut SlotDeclarations) {
    slots
        .optional_input(BOUNDARY_INPUT, DataType::Any)
        .output(BOUNDARY_OUTPUT, 0.0);
}

fn pass_through(ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
    if let Some(value) = ctx.input(BOUNDARY_INPUT).cloned() {
        ctx.set_output(BOUNDARY_OUTPUT, value)?;
    }
    Ok(())
}

/// Brings data from the parent group into a nested group.
#[derive(Debug, Default)]
pub struct GroupSource;

impl Step for GroupSource {
    fn declare(&self, slots: &mut SlotDeclarations) {
        declare_boundary(slots);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        pass_through(ctx)
    }
}

/// Exposes data of a nested group to its parent.
#[derive(Debug, Default)]
pub struct GroupSink;

impl Step for GroupSink {
    fn declare(&self, slots: &mut SlotDeclarations) {
        declare_boundary(slots);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError> {
        pass_through(ctx)
    }
}

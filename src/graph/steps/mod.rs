//! Built-in steps.

pub mod boundary;
pub mod constant;
pub mod counter;
pub mod expression;
pub mod gain;
pub mod smoothing;
pub mod sum;

pub use boundary::{GroupSink, GroupSource, GROUP_SINK, GROUP_SOURCE};
pub use constant::Constant;
pub use counter::Counter;
pub use expression::Expression;
pub use gain::StaticGain;
pub use smoothing::ExponentialSmoothing;
pub use sum::Sum;

use crate::error::Result;
use crate::graph::data::DataValue;
use crate::graph::registry::StepRegistry;
use crate::graph::slot::Validity;

pub const COUNTER: &str = "stepgraph.Counter";
pub const CONSTANT: &str = "stepgraph.Constant";
pub const STATIC_GAIN: &str = "stepgraph.StaticGain";
pub const SUM: &str = "stepgraph.Sum";
pub const EXPONENTIAL_SMOOTHING: &str = "stepgraph.ExponentialSmoothing";
pub const EXPRESSION: &str = "stepgraph.Expression";

pub fn register_builtins(registry: &mut StepRegistry) -> Result<()> {
    registry.register_type::<Counter>(COUNTER)?;
    registry.register_type::<Constant>(CONSTANT)?;
    registry.register_type::<StaticGain>(STATIC_GAIN)?;
    registry.register_type::<Sum>(SUM)?;
    registry.register_type::<ExponentialSmoothing>(EXPONENTIAL_SMOOTHING)?;
    registry.register_type::<Expression>(EXPRESSION)?;
    registry.register_type::<GroupSource>(boundary::GROUP_SOURCE)?;
    registry.register_type::<GroupSink>(boundary::GROUP_SINK)?;
    Ok(())
}

/// Validity for inputs that take a single number.
pub(crate) fn scalar_validity(data: &DataValue) -> Validity {
    if data.as_scalar().is_some() {
        Validity::Valid
    } else {
        Validity::Error
    }
}

//! The computation graph: steps wired by data connections and driven by
//! triggers.
//!
//! - [`step`] - computing elements and the compute boundary
//! - [`trigger`] / [`looped_trigger`] - propagation and periodic driving
//! - [`group`] - ownership, connections and nested groups
//! - [`snapshot`] / [`events`] - observation from other threads

pub mod data;
pub mod element;
pub mod events;
pub mod group;
pub mod looped_trigger;
pub mod parameter;
pub mod registry;
pub mod slot;
pub mod snapshot;
pub mod step;
pub mod steps;
pub mod trigger;

pub use data::{new_data, DataPtr, DataType, DataValue};
pub use element::{Element, ElementKind, ElementRef};
pub use events::{EventBus, GraphEvent};
pub use group::{Connection, Group, TriggerConnection};
pub use looped_trigger::LoopedTrigger;
pub use parameter::{ParameterDeclarations, ParameterValue};
pub use registry::StepRegistry;
pub use slot::{DataRole, DataSlot, SlotDeclarations, Validity};
pub use snapshot::{GroupSnapshot, SlotSnapshot, StepSnapshot, TriggerSnapshot};
pub use step::{ComputeContext, Step, StepNode, StepState};
pub use trigger::{Trigger, TriggerArgs, Triggerable};

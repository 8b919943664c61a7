//! Test steps and a builder for small graphs

use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepgraph::graph::{ComputeContext, DataType, Group, SlotDeclarations, Step, StepNode, StepRegistry};
use stepgraph::{LoopSettings, LoopedTrigger, StepError};

/// Values seen by a [`Recorder`], in compute order.
pub type Recorded = Arc<Mutex<Vec<f64>>>;

/// Records its scalar input and passes it on to `out`.
pub struct Recorder {
    seen: Recorded,
}

impl Recorder {
    pub fn new() -> (Self, Recorded) {
        let seen = Recorded::default();
        (Self { seen: seen.clone() }, seen)
    }
}

impl Step for Recorder {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.input("in", DataType::Any).output("out", 0.0);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        let value = ctx.input_scalar("in")?;
        self.seen.lock().unwrap().push(value);
        ctx.set_output("out", value)
    }
}

/// `out = feedback + 1`; the feedback input is optional.
#[derive(Default)]
pub struct Increment;

impl Step for Increment {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.optional_input("feedback", DataType::Any).output("out", 0.0);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        let previous = match ctx.input("feedback") {
            Some(_) => ctx.input_scalar("feedback")?,
            None => 0.0,
        };
        ctx.set_output("out", previous + 1.0)
    }
}

/// Fails whenever its input is negative.
#[derive(Default)]
pub struct RejectNegative;

impl Step for RejectNegative {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.input("in", DataType::Any).output("out", 0.0);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        let value = ctx.input_scalar("in")?;
        if value < 0.0 {
            return Err(StepError::Numeric(format!("negative input {}", value)));
        }
        ctx.set_output("out", value)
    }
}

/// Builder for test graphs on top of the built-in registry
pub struct GraphBuilder {
    group: Arc<Group>,
    registry: StepRegistry,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            group: Group::new(name).unwrap(),
            registry: StepRegistry::with_builtins(),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Add a built-in step by registry key.
    pub fn builtin(self, key: &str, name: &str) -> Self {
        self.group.create_step(&self.registry, key, name).unwrap();
        self
    }

    pub fn step(self, name: &str, step: impl Step + 'static) -> Self {
        self.group.add_step(name, step).unwrap();
        self
    }

    pub fn parameter(self, step: &str, name: &str, value: f64) -> Self {
        self.group.step(step).unwrap().set_parameter(name, value).unwrap();
        self
    }

    pub fn connect(self, source: &str, target: &str) -> Self {
        self.group.connect(source, target).unwrap();
        self
    }

    pub fn looped(self, name: &str, interval: Duration, listeners: &[&str]) -> Self {
        self.group
            .add_looped_trigger(name, LoopSettings::with_interval(interval))
            .unwrap();
        for listener in listeners {
            self.group.connect_trigger(name, listener).unwrap();
        }
        self
    }

    pub fn trigger(self, name: &str, listeners: &[&str]) -> Self {
        self.group.add_trigger(name).unwrap();
        for listener in listeners {
            self.group.connect_trigger(name, listener).unwrap();
        }
        self
    }

    pub fn build(self) -> Arc<Group> {
        self.group
    }
}

/// Convenience lookups used across tests
pub fn step(group: &Group, name: &str) -> Arc<StepNode> {
    group.step(name).unwrap()
}

pub fn looped(group: &Group, name: &str) -> Arc<LoopedTrigger> {
    group.looped_trigger(name).unwrap()
}

pub fn scalar(group: &Group, path: &str) -> f64 {
    let (name, slot) = path.split_once('.').unwrap();
    step(group, name)
        .output_value(slot)
        .unwrap()
        .as_scalar()
        .unwrap()
}

//! Computing elements.
//!
//! A [`Step`] implementation declares its slots and parameters and computes
//! outputs from inputs. [`StepNode`] wraps it with everything the graph needs:
//! slot storage and locks, the busy flag, state reporting, start/stop
//! counting and the "processingDone" trigger fired after each compute.
//!
//! One run of a step:
//! 1. acquire the step and all its data locks (inputs read, outputs and
//!    buffers written) in the global lock order,
//! 2. check input validity; invalid inputs skip the compute (`NotRunning`),
//! 3. compute, catching errors and panics (`Exception`),
//! 4. release all locks, then fire the finished trigger.

use crate::error::{GraphError, Result, StepError};
use crate::graph::data::{DataPtr, DataValue};
use crate::graph::element::{validate_name, Element, OwnerCell};
use crate::graph::events::GraphEvent;
use crate::graph::parameter::{ParameterDeclarations, ParameterValue, Parameters};
use crate::graph::slot::{DataRole, DataSlot, SlotDeclarations, StepSlots, Validity};
use crate::graph::trigger::{first_visit, ParentTrigger, Trigger, TriggerArgs, Triggerable, Visited};
use crate::sync::{lock_mutex, read_lock, write_lock, LockGuards};
use crate::thread::StepTime;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Name of the trigger every step fires after computing.
pub const FINISHED_TRIGGER: &str = "processingDone";

/// Type key used for steps not created through a registry.
pub const CUSTOM_STEP_TYPE: &str = "custom";

/// Execution state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    /// Not run since creation or the last stop.
    None,
    /// Last compute succeeded.
    Running,
    /// Inputs are invalid; the annotation names them.
    NotRunning,
    /// Last compute failed; the step stays halted until reset or stopped.
    Exception,
}

/// A computation plugged into the graph.
pub trait Step: Send {
    /// Declare inputs, outputs and buffers.
    fn declare(&self, slots: &mut SlotDeclarations);

    fn declare_parameters(&self, _parameters: &mut ParameterDeclarations) {}

    /// Compute outputs from inputs.
    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> std::result::Result<(), StepError>;

    /// Validity of the data connected to an input. The default checks the
    /// declared data type.
    fn determine_input_validity(&self, slot: &DataSlot, data: &DataValue) -> Validity {
        if slot.data_type().accepts(data.data_type()) {
            Validity::Valid
        } else {
            Validity::Error
        }
    }

    /// Looped steps are only driven by looped triggers, never by the
    /// finished trigger of an upstream step.
    fn is_looped(&self) -> bool {
        false
    }

    fn on_start(&mut self) {}

    fn on_stop(&mut self) {}

    fn input_connection_changed(&mut self, _name: &str) {}

    /// Apply a validated parameter value. Returning an error rejects it.
    fn on_parameter_changed(&mut self, _name: &str, _value: &ParameterValue) -> Result<()> {
        Ok(())
    }

    /// Names of user actions this step offers.
    fn actions(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn call_action(&mut self, name: &str) -> Result<()> {
        Err(GraphError::UnknownAction(name.to_string()))
    }
}

/// Access to a step's data during compute. All data locks are held for the
/// lifetime of the context.
pub struct ComputeContext<'a> {
    step: &'a str,
    slots: &'a StepSlots,
    guards: LockGuards<'a, DataValue>,
    args: TriggerArgs,
}

impl<'a> ComputeContext<'a> {
    pub fn step_name(&self) -> &str {
        self.step
    }

    pub fn round(&self) -> u64 {
        self.args.round
    }

    pub fn time(&self) -> StepTime {
        self.args.time
    }

    fn data_id(&self, role: DataRole, name: &str) -> Option<crate::sync::LockId> {
        self.slots
            .get_role(role, name)
            .and_then(DataSlot::data)
            .map(|data| data.id())
    }

    /// Data of a connected input.
    pub fn input(&self, name: &str) -> Option<&DataValue> {
        let id = self.data_id(DataRole::Input, name)?;
        self.guards.get(id)
    }

    pub fn require_input(&self, name: &str) -> std::result::Result<&DataValue, StepError> {
        self.input(name)
            .ok_or_else(|| StepError::MissingData(name.to_string()))
    }

    /// Numeric value of a scalar input.
    pub fn input_scalar(&self, name: &str) -> std::result::Result<f64, StepError> {
        let value = self.require_input(name)?;
        value.as_scalar().ok_or_else(|| StepError::UnexpectedData {
            slot: name.to_string(),
            message: format!("expected a scalar, found {}", value.data_type()),
        })
    }

    /// Current (previous round's) value of an output.
    pub fn output(&self, name: &str) -> Option<&DataValue> {
        let id = self.data_id(DataRole::Output, name)?;
        self.guards.get(id)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut DataValue> {
        let id = self.data_id(DataRole::Output, name)?;
        self.guards.get_mut(id)
    }

    pub fn set_output(&mut self, name: &str, value: impl Into<DataValue>) -> std::result::Result<(), StepError> {
        let slot = self.output_mut(name).ok_or_else(|| StepError::MissingData(name.to_string()))?;
        *slot = value.into();
        Ok(())
    }

    pub fn buffer(&self, name: &str) -> Option<&DataValue> {
        let id = self.data_id(DataRole::Buffer, name)?;
        self.guards.get(id)
    }

    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut DataValue> {
        let id = self.data_id(DataRole::Buffer, name)?;
        self.guards.get_mut(id)
    }
}

#[derive(Debug, Clone)]
struct StateRecord {
    state: StepState,
    annotation: String,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A step as it lives in a group.
pub struct StepNode {
    name: String,
    type_key: String,
    step: Mutex<Box<dyn Step>>,
    pub(crate) slots: RwLock<StepSlots>,
    parameters: RwLock<Parameters>,
    looped: bool,
    actions: Vec<&'static str>,
    busy: AtomicBool,
    last_round: AtomicU64,
    state: Mutex<StateRecord>,
    finished: Arc<Trigger>,
    parent: ParentTrigger,
    start_calls: Mutex<u32>,
    computes: AtomicU64,
    owner: OwnerCell,
}

impl fmt::Debug for StepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepNode")
            .field("name", &self.name)
            .field("type_key", &self.type_key)
            .field("state", &self.state())
            .finish()
    }
}

impl StepNode {
    /// Wrap a step under the given name.
    pub fn new(name: &str, step: impl Step + 'static) -> Result<Arc<Self>> {
        Self::from_boxed(name, CUSTOM_STEP_TYPE, Box::new(step))
    }

    pub fn from_boxed(name: &str, type_key: &str, step: Box<dyn Step>) -> Result<Arc<Self>> {
        validate_name(name)?;

        let mut declarations = SlotDeclarations::new();
        step.declare(&mut declarations);
        let slots = StepSlots::from_declarations(name, declarations)?;

        let mut parameter_declarations = ParameterDeclarations::new();
        step.declare_parameters(&mut parameter_declarations);
        let parameters = Parameters::from_declarations(parameter_declarations)?;

        let looped = step.is_looped();
        let actions = step.actions();

        Ok(Arc::new(Self {
            name: name.to_string(),
            type_key: type_key.to_string(),
            step: Mutex::new(step),
            slots: RwLock::new(slots),
            parameters: RwLock::new(parameters),
            looped,
            actions,
            busy: AtomicBool::new(false),
            last_round: AtomicU64::new(0),
            state: Mutex::new(StateRecord {
                state: StepState::None,
                annotation: String::new(),
            }),
            finished: Trigger::new(format!("{}.{}", name, FINISHED_TRIGGER)),
            parent: ParentTrigger::default(),
            start_calls: Mutex::new(0),
            computes: AtomicU64::new(0),
            owner: OwnerCell::default(),
        }))
    }

    /// Unique name within the owning group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key this step was created from.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Whether only a looped trigger may drive this step.
    pub fn is_looped(&self) -> bool {
        self.looped
    }

    /// Trigger fired after every run of this step.
    pub fn finished_trigger(&self) -> &Arc<Trigger> {
        &self.finished
    }

    /// State after the last trigger.
    pub fn state(&self) -> StepState {
        lock_mutex(&self.state).state
    }

    /// Why the step is `NotRunning` or in `Exception`; empty otherwise.
    pub fn annotation(&self) -> String {
        lock_mutex(&self.state).annotation.clone()
    }

    /// Number of successful computes.
    pub fn compute_count(&self) -> u64 {
        self.computes.load(Ordering::Acquire)
    }

    /// Whether a compute is in progress.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether a looped trigger driving this step is running.
    pub fn is_started(&self) -> bool {
        *lock_mutex(&self.start_calls) > 0
    }

    /// Leave the `Exception` (or any other) state.
    pub fn reset_state(&self) {
        self.set_state(StepState::None, String::new());
    }

    /// Drop all cached input validities; they are evaluated again before the
    /// next compute.
    pub fn revalidate_inputs(&self) {
        read_lock(&self.slots).reset_validity();
    }

    /// Names of the slots with the given role, in declaration order.
    pub fn slot_names(&self, role: DataRole) -> Vec<String> {
        read_lock(&self.slots)
            .by_role(role)
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Whether a slot of any role is named `name`.
    pub fn has_slot(&self, name: &str) -> bool {
        read_lock(&self.slots).get(name).is_some()
    }

    /// Role of slot `name`.
    pub fn slot_role(&self, name: &str) -> Option<DataRole> {
        read_lock(&self.slots).get(name).map(|s| s.role())
    }

    /// Cached validity of slot `name`.
    pub fn validity(&self, name: &str) -> Option<Validity> {
        read_lock(&self.slots).get(name).map(|s| s.validity())
    }

    fn unknown_slot(&self, name: &str) -> GraphError {
        GraphError::UnknownSlot {
            step: self.name.clone(),
            slot: name.to_string(),
        }
    }

    /// Shared data of an output slot.
    pub fn output_data(&self, name: &str) -> Result<DataPtr> {
        let slots = read_lock(&self.slots);
        let slot = slots.get(name).ok_or_else(|| self.unknown_slot(name))?;
        if slot.role() != DataRole::Output {
            return Err(GraphError::RoleMismatch(format!(
                "{}.{} is not an output",
                self.name, name
            )));
        }
        slot.data().cloned().ok_or_else(|| self.unknown_slot(name))
    }

    /// Read the data of an output or buffer slot under its lock.
    pub fn read_output<R>(&self, name: &str, f: impl FnOnce(&DataValue) -> R) -> Result<R> {
        let data = {
            let slots = read_lock(&self.slots);
            let slot = slots.get(name).ok_or_else(|| self.unknown_slot(name))?;
            if slot.role() == DataRole::Input {
                return Err(GraphError::RoleMismatch(format!(
                    "{}.{} is an input",
                    self.name, name
                )));
            }
            slot.data().cloned().ok_or_else(|| self.unknown_slot(name))?
        };
        let value = data.read();
        Ok(f(&value))
    }

    /// Copy of an output or buffer value.
    pub fn output_value(&self, name: &str) -> Result<DataValue> {
        self.read_output(name, DataValue::clone)
    }

    pub(crate) fn connect_input(&self, name: &str, data: DataPtr) -> Result<()> {
        write_lock(&self.slots).connect_input(&self.name, name, data)?;
        lock_mutex(&self.step).input_connection_changed(name);
        Ok(())
    }

    pub(crate) fn disconnect_input(&self, name: &str) -> Result<()> {
        write_lock(&self.slots).disconnect_input(&self.name, name)?;
        lock_mutex(&self.step).input_connection_changed(name);
        Ok(())
    }

    /// Current value of parameter `name`.
    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        read_lock(&self.parameters).get(name).cloned()
    }

    /// All parameter values by name.
    pub fn parameters(&self) -> BTreeMap<String, ParameterValue> {
        read_lock(&self.parameters).values().clone()
    }

    /// Validate and apply a parameter value.
    pub fn set_parameter(&self, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        let running = self.is_started();
        let value = read_lock(&self.parameters).validate(name, value.into(), running)?;
        lock_mutex(&self.step).on_parameter_changed(name, &value)?;
        write_lock(&self.parameters).store(name, value);
        tracing::debug!("Parameter '{}.{}' changed", self.name, name);
        Ok(())
    }

    /// Actions the step offers, e.g. `reset` on a counter.
    pub fn actions(&self) -> &[&'static str] {
        &self.actions
    }

    /// Run a named action under the compute lock.
    pub fn call_action(&self, name: &str) -> Result<()> {
        if !self.actions.contains(&name) {
            return Err(GraphError::UnknownAction(name.to_string()));
        }
        tracing::info!("Calling action '{}' on step '{}'", name, self.name);
        lock_mutex(&self.step).call_action(name)
    }

    /// Run this step once outside of any trigger chain, e.g. for a step
    /// without a driver.
    pub fn compute_once(&self, time: StepTime) {
        self.on_trigger(&TriggerArgs::new(time));
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(group) = self.owner.get() {
            group.emit(event);
        }
    }

    fn set_state(&self, state: StepState, annotation: String) {
        let changed = {
            let mut record = lock_mutex(&self.state);
            if record.state == state && record.annotation == annotation {
                false
            } else {
                record.state = state;
                record.annotation = annotation.clone();
                true
            }
        };

        if changed {
            tracing::debug!("Step '{}' is now {:?}", self.name, state);
            self.emit(GraphEvent::StepStateChanged {
                step: self.name.clone(),
                state,
                annotation,
            });
        }
    }

    fn fail(&self, error: StepError) {
        let message = error.to_string();
        tracing::error!("Exception in step '{}': {}", self.name, message);
        self.emit(GraphEvent::ComputeFailed {
            step: self.name.clone(),
            message: message.clone(),
        });
        self.set_state(StepState::Exception, message);
    }

    /// Evaluate input validities. A cached `Valid` is reused until a
    /// connection changes; a connected input cached as `Error` is checked
    /// again every round so the step resumes once upstream data is valid.
    fn check_inputs(
        step: &dyn Step,
        slots: &StepSlots,
        guards: &LockGuards<'_, DataValue>,
    ) -> std::result::Result<(), String> {
        let mut invalid = Vec::new();
        for slot in slots.by_role(DataRole::Input) {
            let mut validity = slot.validity();
            if validity.needs_evaluation() || (validity == Validity::Error && slot.has_data()) {
                validity = match slot.data() {
                    None if slot.is_mandatory() => Validity::Error,
                    None => Validity::Valid,
                    Some(data) => match guards.get(data.id()) {
                        Some(value) => step.determine_input_validity(slot, value),
                        None => Validity::Unknown,
                    },
                };
                if validity != Validity::Unknown {
                    slot.set_validity(validity);
                }
            }
            if validity != Validity::Valid {
                invalid.push(format!("{} ({:?})", slot.name(), validity));
            }
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Invalid inputs prevent the step from running: {}",
                invalid.join(", ")
            ))
        }
    }

    /// Returns whether the finished trigger should fire.
    fn run(&self, args: &TriggerArgs) -> bool {
        let mut step = lock_mutex(&self.step);
        let slots = read_lock(&self.slots);
        let guards = slots.locks().lock_all();

        if let Err(annotation) = Self::check_inputs(step.as_ref(), &slots, &guards) {
            drop(guards);
            self.set_state(StepState::NotRunning, annotation);
            return false;
        }

        let mut ctx = ComputeContext {
            step: &self.name,
            slots: &slots,
            guards,
            args: *args,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.compute(&mut ctx)));
        drop(ctx);
        drop(slots);
        drop(step);

        match outcome {
            Ok(Ok(())) => {
                self.computes.fetch_add(1, Ordering::AcqRel);
                self.set_state(StepState::Running, String::new());
            }
            Ok(Err(error)) => self.fail(error),
            Err(payload) => self.fail(StepError::Panicked(panic_message(payload.as_ref()))),
        }
        true
    }
}

impl Element for StepNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_cell(&self) -> &OwnerCell {
        &self.owner
    }
}

impl Triggerable for StepNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_trigger(&self, args: &TriggerArgs) {
        if self.state() == StepState::Exception {
            return;
        }
        // first arrival in a round wins
        if self.last_round.swap(args.round, Ordering::AcqRel) == args.round {
            return;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Step '{}' is busy, ignoring trigger", self.name);
            return;
        }
        let _busy = BusyGuard(&self.busy);

        if self.run(args) {
            self.finished.trigger(args);
        }
    }

    fn call_on_start(&self, visited: &mut Visited) {
        if !first_visit(visited, self) {
            return;
        }
        {
            let mut calls = lock_mutex(&self.start_calls);
            if *calls == 0 {
                lock_mutex(&self.step).on_start();
                self.revalidate_inputs();
                self.reset_state();
            }
            *calls += 1;
        }
        self.finished.start_listeners(visited);
    }

    fn call_on_stop(&self, visited: &mut Visited) {
        if !first_visit(visited, self) {
            return;
        }
        {
            let mut calls = lock_mutex(&self.start_calls);
            if *calls == 1 {
                lock_mutex(&self.step).on_stop();
            }
            *calls = calls.saturating_sub(1);
        }
        self.reset_state();
        self.finished.stop_listeners(visited);
    }

    fn parent_trigger(&self) -> Option<Arc<Trigger>> {
        self.parent.get()
    }

    fn set_parent_trigger(&self, parent: Weak<Trigger>) {
        self.parent.set(parent);
    }

    fn is_looped(&self) -> bool {
        self.looped
    }
}

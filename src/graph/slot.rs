//! Named, typed attachment points of a step.
//!
//! Outputs and buffers own their data from the moment the step is created.
//! Inputs hold no data until connected; connecting shares the upstream
//! output's buffer with the input.

use crate::error::{GraphError, Result};
use crate::graph::data::{new_data, DataPtr, DataType, DataValue};
use crate::graph::element::validate_name;
use crate::sync::{LockId, LockMode, LockSetHandle, Lockable};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// What a slot is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataRole {
    Input,
    Output,
    /// Step-internal state, exposed read-only for inspection.
    Buffer,
}

/// Validity of an input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid,
    Error,
    /// Not evaluated yet (or deferred by the step).
    Unknown,
    /// Nothing connected since the last disconnect.
    NotSet,
}

impl Validity {
    fn to_u8(self) -> u8 {
        match self {
            Validity::Valid => 0,
            Validity::Error => 1,
            Validity::Unknown => 2,
            Validity::NotSet => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Validity::Valid,
            1 => Validity::Error,
            2 => Validity::Unknown,
            _ => Validity::NotSet,
        }
    }

    /// Whether the value has to be (re)evaluated before use.
    pub fn needs_evaluation(self) -> bool {
        matches!(self, Validity::Unknown | Validity::NotSet)
    }
}

/// A named slot of a step.
#[derive(Debug)]
pub struct DataSlot {
    name: String,
    role: DataRole,
    data_type: DataType,
    mandatory: bool,
    data: Option<DataPtr>,
    validity: AtomicU8,
}

impl DataSlot {
    fn new(name: String, role: DataRole, data_type: DataType, mandatory: bool) -> Self {
        Self {
            name,
            role,
            data_type,
            mandatory,
            data: None,
            validity: AtomicU8::new(Validity::Unknown.to_u8()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DataRole {
        self.role
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn data(&self) -> Option<&DataPtr> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn validity(&self) -> Validity {
        Validity::from_u8(self.validity.load(Ordering::Acquire))
    }

    pub(crate) fn set_validity(&self, validity: Validity) {
        self.validity.store(validity.to_u8(), Ordering::Release);
    }
}

/// Declaration of a single slot, collected from [`Step::declare`].
///
/// [`Step::declare`]: crate::graph::step::Step::declare
#[derive(Debug, Clone)]
struct SlotDeclaration {
    name: String,
    role: DataRole,
    data_type: DataType,
    mandatory: bool,
    initial: Option<DataValue>,
}

/// Builder for the slots of a step.
#[derive(Debug, Default)]
pub struct SlotDeclarations {
    slots: Vec<SlotDeclaration>,
}

impl SlotDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, role: DataRole, data_type: DataType, mandatory: bool, initial: Option<DataValue>) -> &mut Self {
        self.slots.push(SlotDeclaration {
            name: name.to_string(),
            role,
            data_type,
            mandatory,
            initial,
        });
        self
    }

    /// A mandatory input accepting data of `data_type`.
    pub fn input(&mut self, name: &str, data_type: DataType) -> &mut Self {
        self.push(name, DataRole::Input, data_type, true, None)
    }

    /// An input that may stay unconnected.
    pub fn optional_input(&mut self, name: &str, data_type: DataType) -> &mut Self {
        self.push(name, DataRole::Input, data_type, false, None)
    }

    pub fn output(&mut self, name: &str, initial: impl Into<DataValue>) -> &mut Self {
        let initial = initial.into();
        self.push(name, DataRole::Output, initial.data_type(), true, Some(initial))
    }

    pub fn buffer(&mut self, name: &str, initial: impl Into<DataValue>) -> &mut Self {
        let initial = initial.into();
        self.push(name, DataRole::Buffer, initial.data_type(), true, Some(initial))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The slots of one step together with the locks guarding their data.
///
/// Lock sets: `"all"` (inputs read, outputs and buffers written) plus one set
/// per role.
pub struct StepSlots {
    slots: Vec<DataSlot>,
    locks: Lockable<DataValue>,
    inputs: LockSetHandle,
    outputs: LockSetHandle,
    buffers: LockSetHandle,
}

impl StepSlots {
    pub(crate) fn from_declarations(step: &str, declarations: SlotDeclarations) -> Result<Self> {
        let mut locks = Lockable::new();
        let inputs = locks.define_lock_set("inputs")?;
        let outputs = locks.define_lock_set("outputs")?;
        let buffers = locks.define_lock_set("buffers")?;

        let mut slots: Vec<DataSlot> = Vec::with_capacity(declarations.len());
        for declaration in declarations.slots {
            validate_name(&declaration.name)?;
            if slots.iter().any(|s| s.name == declaration.name) {
                return Err(GraphError::Duplicate(format!(
                    "{}.{}",
                    step, declaration.name
                )));
            }

            let mut slot = DataSlot::new(
                declaration.name,
                declaration.role,
                declaration.data_type,
                declaration.mandatory,
            );
            if let Some(initial) = declaration.initial {
                let data = new_data(initial);
                let set = if slot.role == DataRole::Buffer {
                    buffers
                } else {
                    outputs
                };
                locks.add_lock(data.clone(), LockMode::Write, set)?;
                slot.data = Some(data);
                slot.set_validity(Validity::Valid);
            } else {
                slot.set_validity(Validity::NotSet);
            }
            slots.push(slot);
        }

        Ok(Self {
            slots,
            locks,
            inputs,
            outputs,
            buffers,
        })
    }

    pub fn get(&self, name: &str) -> Option<&DataSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Slot with the given name and role.
    pub fn get_role(&self, role: DataRole, name: &str) -> Option<&DataSlot> {
        self.get(name).filter(|s| s.role == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSlot> {
        self.slots.iter()
    }

    pub fn by_role(&self, role: DataRole) -> impl Iterator<Item = &DataSlot> {
        self.slots.iter().filter(move |s| s.role == role)
    }

    pub fn lock_id(&self, name: &str) -> Option<LockId> {
        self.get(name).and_then(|s| s.data.as_ref()).map(|d| d.id())
    }

    pub fn locks(&self) -> &Lockable<DataValue> {
        &self.locks
    }

    pub fn lock_set(&self, role: DataRole) -> LockSetHandle {
        match role {
            DataRole::Input => self.inputs,
            DataRole::Output => self.outputs,
            DataRole::Buffer => self.buffers,
        }
    }

    fn slot_mut(&mut self, step: &str, name: &str) -> Result<&mut DataSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| GraphError::UnknownSlot {
                step: step.to_string(),
                slot: name.to_string(),
            })
    }

    /// Share `data` with the input `name`.
    pub(crate) fn connect_input(&mut self, step: &str, name: &str, data: DataPtr) -> Result<()> {
        let inputs = self.inputs;
        let slot = self.slot_mut(step, name)?;
        if slot.role != DataRole::Input {
            return Err(GraphError::RoleMismatch(format!(
                "{}.{} is not an input",
                step, name
            )));
        }
        if slot.data.is_some() {
            return Err(GraphError::InputAlreadyConnected(format!("{}.{}", step, name)));
        }
        slot.data = Some(data.clone());
        slot.set_validity(Validity::Unknown);
        self.locks.add_lock(data, LockMode::Read, inputs)
    }

    /// Detach the data of input `name`.
    pub(crate) fn disconnect_input(&mut self, step: &str, name: &str) -> Result<DataPtr> {
        let inputs = self.inputs;
        let slot = self.slot_mut(step, name)?;
        let data = slot.data.take().ok_or_else(|| GraphError::UnknownConnection {
            source_path: "?".to_string(),
            target_path: format!("{}.{}", step, name),
        })?;
        slot.set_validity(Validity::NotSet);
        self.locks.remove_lock(&data, LockMode::Read, inputs)?;
        Ok(data)
    }

    /// Forget cached validities so they are evaluated again.
    pub(crate) fn reset_validity(&self) {
        for slot in self.by_role(DataRole::Input) {
            if slot.has_data() {
                slot.set_validity(Validity::Unknown);
            } else {
                slot.set_validity(Validity::NotSet);
            }
        }
    }
}

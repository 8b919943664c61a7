//! Base graph node: a named element owned by a group.

use crate::error::{GraphError, Result};
use crate::graph::group::Group;
use crate::graph::looped_trigger::LoopedTrigger;
use crate::graph::step::StepNode;
use crate::graph::trigger::Trigger;
use crate::sync::{read_lock, write_lock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, Weak};

/// Separator between element and slot names in paths like `"gain.out"`.
pub const PATH_SEPARATOR: char = '.';

/// Element and slot names must be non-empty and free of the path separator.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(GraphError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Split `"element.slot"` at the last separator.
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    match path.rsplit_once(PATH_SEPARATOR) {
        Some((element, slot)) if !element.is_empty() && !slot.is_empty() => Ok((element, slot)),
        _ => Err(GraphError::InvalidPath(path.to_string())),
    }
}

/// Weak back-reference from an element to the group that owns it.
#[derive(Debug, Default)]
pub struct OwnerCell(RwLock<Weak<Group>>);

impl OwnerCell {
    pub fn get(&self) -> Option<Arc<Group>> {
        read_lock(&self.0).upgrade()
    }

    pub fn set(&self, group: Weak<Group>) {
        *write_lock(&self.0) = group;
    }

    pub fn clear(&self) {
        *write_lock(&self.0) = Weak::new();
    }
}

/// Common interface of everything a group can own.
pub trait Element: Send + Sync {
    fn name(&self) -> &str;

    fn owner_cell(&self) -> &OwnerCell;

    /// The group currently owning this element.
    fn group(&self) -> Option<Arc<Group>> {
        self.owner_cell().get()
    }
}

/// Kind of an element, as reported in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Step,
    Trigger,
    LoopedTrigger,
    Group,
}

/// An element owned by a group.
#[derive(Clone)]
pub enum ElementRef {
    Step(Arc<StepNode>),
    Trigger(Arc<Trigger>),
    LoopedTrigger(Arc<LoopedTrigger>),
    Group(Arc<Group>),
}

impl ElementRef {
    pub fn name(&self) -> &str {
        self.as_element().name()
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ElementRef::Step(_) => ElementKind::Step,
            ElementRef::Trigger(_) => ElementKind::Trigger,
            ElementRef::LoopedTrigger(_) => ElementKind::LoopedTrigger,
            ElementRef::Group(_) => ElementKind::Group,
        }
    }

    pub fn as_element(&self) -> &dyn Element {
        match self {
            ElementRef::Step(e) => e.as_ref(),
            ElementRef::Trigger(e) => e.as_ref(),
            ElementRef::LoopedTrigger(e) => e.as_ref(),
            ElementRef::Group(e) => e.as_ref(),
        }
    }

    pub fn as_step(&self) -> Option<&Arc<StepNode>> {
        match self {
            ElementRef::Step(step) => Some(step),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            ElementRef::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl From<Arc<StepNode>> for ElementRef {
    fn from(step: Arc<StepNode>) -> Self {
        ElementRef::Step(step)
    }
}

impl From<Arc<Trigger>> for ElementRef {
    fn from(trigger: Arc<Trigger>) -> Self {
        ElementRef::Trigger(trigger)
    }
}

impl From<Arc<LoopedTrigger>> for ElementRef {
    fn from(trigger: Arc<LoopedTrigger>) -> Self {
        ElementRef::LoopedTrigger(trigger)
    }
}

impl From<Arc<Group>> for ElementRef {
    fn from(group: Arc<Group>) -> Self {
        ElementRef::Group(group)
    }
}

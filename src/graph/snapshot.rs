//! Serializable views of a running graph for inspection tools.
//!
//! Step data is copied under the step's locks in read mode, so a snapshot
//! never observes a half-written output.

use crate::graph::data::{DataType, DataValue};
use crate::graph::element::{ElementKind, ElementRef};
use crate::graph::group::{Connection, Group};
use crate::graph::looped_trigger::LoopedTrigger;
use crate::graph::parameter::ParameterValue;
use crate::graph::slot::{DataRole, Validity};
use crate::graph::step::{StepNode, StepState};
use crate::graph::trigger::Trigger;
use crate::sync::{read_lock, LockMode, ALL_LOCKS};
use crate::thread::{LoopSettings, LoopStatistics, ThreadState};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub name: String,
    pub role: DataRole,
    pub data_type: DataType,
    pub mandatory: bool,
    pub validity: Validity,
    /// Current data; `None` for unconnected inputs.
    pub value: Option<DataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    pub name: String,
    pub type_key: String,
    pub state: StepState,
    pub annotation: String,
    pub looped: bool,
    pub started: bool,
    pub compute_count: u64,
    pub parameters: BTreeMap<String, ParameterValue>,
    pub actions: Vec<String>,
    pub slots: Vec<SlotSnapshot>,
    /// Listeners of the step's finished trigger.
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerSnapshot {
    pub name: String,
    pub kind: ElementKind,
    pub listeners: Vec<String>,
    pub last_round: u64,
    pub running: bool,
    pub thread_state: Option<ThreadState>,
    pub settings: Option<LoopSettings>,
    pub statistics: Option<LoopStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub running: bool,
    pub steps: Vec<StepSnapshot>,
    pub triggers: Vec<TriggerSnapshot>,
    pub groups: Vec<GroupSnapshot>,
    pub connections: Vec<Connection>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl GroupSnapshot {
    pub fn step(&self, name: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn trigger(&self, name: &str) -> Option<&TriggerSnapshot> {
        self.triggers.iter().find(|t| t.name == name)
    }

    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::GraphError::Config(format!("Failed to serialize snapshot: {}", e)))
    }
}

impl StepSnapshot {
    pub fn slot(&self, name: &str) -> Option<&SlotSnapshot> {
        self.slots.iter().find(|s| s.name == name)
    }
}

impl StepNode {
    pub fn snapshot(&self) -> StepSnapshot {
        let slots = {
            let slots = read_lock(&self.slots);
            let guards = slots.locks().lock_as(ALL_LOCKS, LockMode::Read);
            slots
                .iter()
                .map(|slot| SlotSnapshot {
                    name: slot.name().to_string(),
                    role: slot.role(),
                    data_type: slot.data_type(),
                    mandatory: slot.is_mandatory(),
                    validity: slot.validity(),
                    value: match (&guards, slot.data()) {
                        (Ok(guards), Some(data)) => guards.get(data.id()).cloned(),
                        _ => None,
                    },
                })
                .collect()
        };

        StepSnapshot {
            name: self.name().to_string(),
            type_key: self.type_key().to_string(),
            state: self.state(),
            annotation: self.annotation(),
            looped: self.is_looped(),
            started: self.is_started(),
            compute_count: self.compute_count(),
            parameters: self.parameters(),
            actions: self.actions().iter().map(|a| a.to_string()).collect(),
            slots,
            triggers: self.finished_trigger().listener_names(),
        }
    }
}

impl Trigger {
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            name: self.name().to_string(),
            kind: ElementKind::Trigger,
            listeners: self.listener_names(),
            last_round: self.last_round(),
            running: false,
            thread_state: None,
            settings: None,
            statistics: None,
        }
    }
}

impl LoopedTrigger {
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            name: self.name().to_string(),
            kind: ElementKind::LoopedTrigger,
            listeners: self.listener_names(),
            last_round: self.trigger().last_round(),
            running: self.is_running(),
            thread_state: Some(self.thread_state()),
            settings: Some(self.settings()),
            statistics: Some(self.statistics()),
        }
    }
}

impl Group {
    pub fn snapshot(&self) -> GroupSnapshot {
        let mut snapshot = GroupSnapshot {
            name: self.name().to_string(),
            running: self.is_running(),
            steps: Vec::new(),
            triggers: Vec::new(),
            groups: Vec::new(),
            connections: self.connections(),
            inputs: self.input_connectors(),
            outputs: self.output_connectors(),
        };
        for element in self.elements() {
            match element {
                ElementRef::Step(step) => snapshot.steps.push(step.snapshot()),
                ElementRef::Trigger(trigger) => snapshot.triggers.push(trigger.snapshot()),
                ElementRef::LoopedTrigger(trigger) => snapshot.triggers.push(trigger.snapshot()),
                ElementRef::Group(group) => snapshot.groups.push(group.snapshot()),
            }
        }
        snapshot
    }
}

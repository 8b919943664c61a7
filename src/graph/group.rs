//! Groups: named containers that own elements and their connections.
//!
//! Connecting `"a.out"` to `"b.in"` shares `a`'s output buffer with `b`'s
//! input and, unless `b` is looped, registers `b` on `a`'s finished trigger.
//! A nested group is addressed through its boundary connectors:
//! `"child.connector"` resolves to the connector step inside `child`.

use crate::error::{GraphError, Result};
use crate::graph::element::{split_path, validate_name, Element, ElementRef, OwnerCell, PATH_SEPARATOR};
use crate::graph::events::{EventBus, GraphEvent};
use crate::graph::looped_trigger::LoopedTrigger;
use crate::graph::registry::StepRegistry;
use crate::graph::slot::DataRole;
use crate::graph::step::{Step, StepNode, FINISHED_TRIGGER};
use crate::graph::steps::boundary::{GroupSink, GroupSource, BOUNDARY_INPUT, BOUNDARY_OUTPUT, GROUP_SINK, GROUP_SOURCE};
use crate::graph::trigger::{Trigger, Triggerable};
use crate::sync::{read_lock, write_lock};
use crate::thread::LoopSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// A data connection as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
}

struct Link {
    connection: Connection,
    source: Arc<StepNode>,
    target: Arc<StepNode>,
    target_slot: String,
}

/// A trigger registration as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConnection {
    pub trigger: String,
    pub listener: String,
}

/// A trigger addressed by name: a trigger element, a looped trigger or the
/// finished trigger of a step (`"step.processingDone"`).
#[derive(Clone)]
enum TriggerTarget {
    Plain(Arc<Trigger>),
    Looped(Arc<LoopedTrigger>),
}

impl TriggerTarget {
    fn driver(&self) -> &Arc<Trigger> {
        match self {
            TriggerTarget::Plain(trigger) => trigger,
            TriggerTarget::Looped(looped) => looped.trigger(),
        }
    }

    fn remove_listener(&self, listener: &Arc<dyn Triggerable>) -> bool {
        match self {
            TriggerTarget::Plain(trigger) => trigger.remove_listener(listener),
            TriggerTarget::Looped(looped) => looped.remove_listener(listener),
        }
    }
}

struct TriggerLink {
    connection: TriggerConnection,
    target: TriggerTarget,
    listener: Arc<dyn Triggerable>,
}

impl TriggerLink {
    fn is(&self, target: &TriggerTarget, listener: &Arc<dyn Triggerable>) -> bool {
        Arc::ptr_eq(self.target.driver(), target.driver()) && same_node(&self.listener, listener)
    }
}

fn same_node(a: &Arc<dyn Triggerable>, b: &Arc<dyn Triggerable>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// The element as a trigger listener, if it can be one.
fn as_listener(element: &ElementRef) -> Option<Arc<dyn Triggerable>> {
    match element {
        ElementRef::Step(step) => Some(step.clone() as Arc<dyn Triggerable>),
        ElementRef::Trigger(trigger) => Some(trigger.clone() as Arc<dyn Triggerable>),
        _ => None,
    }
}

/// The trigger an element fires, if any.
fn own_trigger(element: &ElementRef) -> Option<&Arc<Trigger>> {
    match element {
        ElementRef::Step(step) => Some(step.finished_trigger()),
        ElementRef::Trigger(trigger) => Some(trigger),
        ElementRef::LoopedTrigger(looped) => Some(looped.trigger()),
        ElementRef::Group(_) => None,
    }
}

/// A named container of steps, triggers and nested groups.
///
/// Elements are owned by exactly one group. Removing an element detaches
/// every data link and trigger registration that refers to it, including
/// those made by enclosing groups through dotted paths.
pub struct Group {
    name: String,
    self_ref: Weak<Group>,
    elements: RwLock<BTreeMap<String, ElementRef>>,
    links: RwLock<Vec<Link>>,
    trigger_links: RwLock<Vec<TriggerLink>>,
    inputs: RwLock<Vec<String>>,
    outputs: RwLock<Vec<String>>,
    events: RwLock<EventBus>,
    owner: OwnerCell,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("elements", &self.element_names())
            .field("connections", &self.connections())
            .finish()
    }
}

impl Group {
    /// Create an empty group with its own event bus.
    pub fn new(name: &str) -> Result<Arc<Self>> {
        Self::with_events(name, EventBus::default())
    }

    /// Create an empty group publishing on `events`.
    pub fn with_events(name: &str, events: EventBus) -> Result<Arc<Self>> {
        validate_name(name)?;
        Ok(Arc::new_cyclic(|self_ref| Self {
            name: name.to_string(),
            self_ref: self_ref.clone(),
            elements: RwLock::new(BTreeMap::new()),
            links: RwLock::new(Vec::new()),
            trigger_links: RwLock::new(Vec::new()),
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            events: RwLock::new(events),
            owner: OwnerCell::default(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ==================== Events ====================

    /// The bus this group (and all nested groups) publish on.
    pub fn events(&self) -> EventBus {
        read_lock(&self.events).clone()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<GraphEvent> {
        self.events().subscribe()
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        self.events().publish(event);
    }

    fn share_events(&self, events: &EventBus) {
        *write_lock(&self.events) = events.clone();
        for group in self.children() {
            group.share_events(events);
        }
    }

    // ==================== Elements ====================

    /// Take ownership of an element.
    pub fn add(&self, element: impl Into<ElementRef>) -> Result<()> {
        let element = element.into();
        let name = element.name().to_string();
        validate_name(&name)?;

        if let Some(owner) = element.as_element().group() {
            return Err(GraphError::Duplicate(format!(
                "'{}' already belongs to group '{}'",
                name,
                owner.name()
            )));
        }
        if let ElementRef::Group(group) = &element {
            let mut ancestor = self.self_ref.upgrade();
            while let Some(current) = ancestor {
                if Arc::ptr_eq(&current, group) {
                    return Err(GraphError::InvalidName(format!(
                        "group '{}' cannot contain itself",
                        name
                    )));
                }
                ancestor = current.owner.get();
            }
        }

        {
            let mut elements = write_lock(&self.elements);
            if elements.contains_key(&name) {
                return Err(GraphError::Duplicate(format!("{}.{}", self.name, name)));
            }
            elements.insert(name.clone(), element.clone());
        }

        element.as_element().owner_cell().set(self.self_ref.clone());
        if let ElementRef::Group(group) = &element {
            group.share_events(&self.events());
        }

        tracing::info!("Added {:?} '{}' to group '{}'", element.kind(), name, self.name);
        self.emit(GraphEvent::ElementAdded {
            name,
            kind: element.kind(),
        });
        Ok(())
    }

    /// Wrap `step` and add it under `name`.
    pub fn add_step(&self, name: &str, step: impl Step + 'static) -> Result<Arc<StepNode>> {
        let node = StepNode::new(name, step)?;
        self.add(node.clone())?;
        Ok(node)
    }

    /// Create a step through the registry and add it.
    pub fn create_step(&self, registry: &StepRegistry, type_key: &str, name: &str) -> Result<Arc<StepNode>> {
        let node = registry.create_node(type_key, name)?;
        self.add(node.clone())?;
        Ok(node)
    }

    /// Add a plain trigger, fired by hand or from another trigger.
    pub fn add_trigger(&self, name: &str) -> Result<Arc<Trigger>> {
        let trigger = Trigger::new(name);
        self.add(trigger.clone())?;
        Ok(trigger)
    }

    /// Add a looped trigger. It stays idle until started.
    pub fn add_looped_trigger(&self, name: &str, settings: LoopSettings) -> Result<Arc<LoopedTrigger>> {
        let trigger = LoopedTrigger::new(name, settings)?;
        self.add(trigger.clone())?;
        Ok(trigger)
    }

    /// Nest `child`; it shares this group's event bus from now on.
    pub fn add_group(&self, child: Arc<Group>) -> Result<()> {
        self.add(child)
    }

    /// Element by name. Dotted names walk into nested groups.
    pub fn element(&self, path: &str) -> Result<ElementRef> {
        if let Some((first, rest)) = path.split_once(PATH_SEPARATOR) {
            return match self.element(first)? {
                ElementRef::Group(group) => group.element(rest),
                _ => Err(GraphError::UnknownElement(path.to_string())),
            };
        }
        read_lock(&self.elements)
            .get(path)
            .cloned()
            .ok_or_else(|| GraphError::UnknownElement(path.to_string()))
    }

    /// Whether `name` (possibly dotted) resolves to an element.
    pub fn contains(&self, name: &str) -> bool {
        self.element(name).is_ok()
    }

    /// Step at `path`.
    pub fn step(&self, path: &str) -> Result<Arc<StepNode>> {
        match self.element(path)? {
            ElementRef::Step(step) => Ok(step),
            _ => Err(GraphError::UnknownElement(format!("step '{}'", path))),
        }
    }

    /// Plain trigger at `path`.
    pub fn trigger(&self, path: &str) -> Result<Arc<Trigger>> {
        match self.element(path)? {
            ElementRef::Trigger(trigger) => Ok(trigger),
            _ => Err(GraphError::UnknownTrigger(path.to_string())),
        }
    }

    /// Looped trigger at `path`.
    pub fn looped_trigger(&self, path: &str) -> Result<Arc<LoopedTrigger>> {
        match self.element(path)? {
            ElementRef::LoopedTrigger(trigger) => Ok(trigger),
            _ => Err(GraphError::UnknownTrigger(path.to_string())),
        }
    }

    /// Nested group at `path`.
    pub fn group(&self, path: &str) -> Result<Arc<Group>> {
        match self.element(path)? {
            ElementRef::Group(group) => Ok(group),
            _ => Err(GraphError::UnknownElement(format!("group '{}'", path))),
        }
    }

    /// Names of the direct elements, sorted.
    pub fn element_names(&self) -> Vec<String> {
        read_lock(&self.elements).keys().cloned().collect()
    }

    /// Direct elements, sorted by name.
    pub fn elements(&self) -> Vec<ElementRef> {
        read_lock(&self.elements).values().cloned().collect()
    }

    /// Direct steps, connectors included.
    pub fn steps(&self) -> Vec<Arc<StepNode>> {
        self.elements()
            .into_iter()
            .filter_map(|e| e.as_step().cloned())
            .collect()
    }

    /// Direct looped triggers.
    pub fn looped_triggers(&self) -> Vec<Arc<LoopedTrigger>> {
        self.elements()
            .into_iter()
            .filter_map(|e| match e {
                ElementRef::LoopedTrigger(trigger) => Some(trigger),
                _ => None,
            })
            .collect()
    }

    fn children(&self) -> Vec<Arc<Group>> {
        self.elements()
            .into_iter()
            .filter_map(|e| e.as_group().cloned())
            .collect()
    }

    /// Remove an element after detaching its connections and trigger
    /// registrations, here and in every enclosing group. Looped triggers are
    /// stopped; nested groups are emptied.
    pub fn remove_element(&self, name: &str) -> Result<ElementRef> {
        let element = read_lock(&self.elements)
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownElement(name.to_string()))?;

        match &element {
            ElementRef::Step(step) => step.finished_trigger().clear_listeners(),
            ElementRef::Trigger(trigger) => trigger.clear_listeners(),
            ElementRef::LoopedTrigger(trigger) => {
                trigger.stop();
                trigger.trigger().clear_listeners();
            }
            ElementRef::Group(group) => group.clear()?,
        }

        self.forget(&element)?;
        let mut ancestor = self.owner.get();
        while let Some(group) = ancestor {
            group.forget(&element)?;
            ancestor = group.owner.get();
        }

        write_lock(&self.elements).remove(name);
        element.as_element().owner_cell().clear();
        write_lock(&self.inputs).retain(|n| n != name);
        write_lock(&self.outputs).retain(|n| n != name);

        tracing::info!("Removed {:?} '{}' from group '{}'", element.kind(), name, self.name);
        self.emit(GraphEvent::ElementRemoved {
            name: name.to_string(),
            kind: element.kind(),
        });
        Ok(element)
    }

    /// Stop all loops and remove every element.
    pub fn clear(&self) -> Result<()> {
        self.stop_all();
        for name in self.element_names() {
            // may already be gone as a side effect of removing another element
            if read_lock(&self.elements).contains_key(&name) {
                self.remove_element(&name)?;
            }
        }
        Ok(())
    }

    /// Drop the data links and trigger registrations of this group that
    /// refer to `element`, which may live in a nested group.
    fn forget(&self, element: &ElementRef) -> Result<()> {
        if let ElementRef::Step(step) = element {
            let touching: Vec<Connection> = read_lock(&self.links)
                .iter()
                .filter(|l| Arc::ptr_eq(&l.source, step) || Arc::ptr_eq(&l.target, step))
                .map(|l| l.connection.clone())
                .collect();
            for connection in touching {
                self.disconnect(&connection.source, &connection.target)?;
            }
        }

        let listener = as_listener(element);
        let trigger = own_trigger(element);
        let stale: Vec<TriggerLink> = {
            let mut links = write_lock(&self.trigger_links);
            let (stale, kept): (Vec<TriggerLink>, Vec<TriggerLink>) =
                std::mem::take(&mut *links).into_iter().partition(|link| {
                    listener.as_ref().is_some_and(|l| same_node(&link.listener, l))
                        || trigger.is_some_and(|t| Arc::ptr_eq(t, link.target.driver()))
                });
            *links = kept;
            stale
        };
        for link in &stale {
            link.target.remove_listener(&link.listener);
            tracing::debug!(
                "Dropped trigger '{}' -> '{}' in group '{}'",
                link.connection.trigger,
                link.connection.listener,
                self.name
            );
        }

        if let Some(listener) = &listener {
            self.detach_listener(listener);
        }
        Ok(())
    }

    fn detach_listener(&self, listener: &Arc<dyn Triggerable>) {
        for element in self.elements() {
            match element {
                ElementRef::Step(step) => {
                    step.finished_trigger().remove_listener(listener);
                }
                ElementRef::Trigger(trigger) => {
                    trigger.remove_listener(listener);
                }
                ElementRef::LoopedTrigger(trigger) => {
                    trigger.remove_listener(listener);
                }
                ElementRef::Group(_) => {}
            }
        }
    }

    // ==================== Boundary Connectors ====================

    /// Create an input connector: a pass-through step named `name` that the
    /// parent group connects into as `"<group>.<name>"`.
    pub fn add_input_connector(&self, name: &str) -> Result<Arc<StepNode>> {
        let node = StepNode::from_boxed(name, GROUP_SOURCE, Box::new(GroupSource))?;
        self.add(node.clone())?;
        write_lock(&self.inputs).push(name.to_string());
        Ok(node)
    }

    /// Create an output connector the parent group reads from as
    /// `"<group>.<name>"`.
    pub fn add_output_connector(&self, name: &str) -> Result<Arc<StepNode>> {
        let node = StepNode::from_boxed(name, GROUP_SINK, Box::new(GroupSink))?;
        self.add(node.clone())?;
        write_lock(&self.outputs).push(name.to_string());
        Ok(node)
    }

    /// Input connector names in creation order.
    pub fn input_connectors(&self) -> Vec<String> {
        read_lock(&self.inputs).clone()
    }

    /// Output connector names in creation order.
    pub fn output_connectors(&self) -> Vec<String> {
        read_lock(&self.outputs).clone()
    }

    fn connector(&self, name: &str, outputs: bool) -> Result<Arc<StepNode>> {
        let list = if outputs { &self.outputs } else { &self.inputs };
        if !read_lock(list).iter().any(|n| n == name) {
            return Err(GraphError::UnknownSlot {
                step: self.name.clone(),
                slot: name.to_string(),
            });
        }
        self.step(name)
    }

    // ==================== Data Connections ====================

    fn resolve(&self, path: &str, role: DataRole) -> Result<(Arc<StepNode>, String)> {
        let (element, slot) = split_path(path)?;
        match self.element(element)? {
            ElementRef::Step(step) => Ok((step, slot.to_string())),
            ElementRef::Group(group) => match role {
                DataRole::Input => Ok((group.connector(slot, false)?, BOUNDARY_INPUT.to_string())),
                _ => Ok((group.connector(slot, true)?, BOUNDARY_OUTPUT.to_string())),
            },
            _ => Err(GraphError::RoleMismatch(format!(
                "'{}' has no data slots",
                element
            ))),
        }
    }

    /// Connect output `source` (`"step.slot"`) to input `target`.
    pub fn connect(&self, source: &str, target: &str) -> Result<()> {
        let (source_step, source_slot) = self.resolve(source, DataRole::Output)?;
        let (target_step, target_slot) = self.resolve(target, DataRole::Input)?;

        let data = source_step.output_data(&source_slot)?;
        match target_step.slot_role(&target_slot) {
            Some(DataRole::Input) => {}
            Some(_) => {
                return Err(GraphError::RoleMismatch(format!(
                    "{} is not an input",
                    target
                )))
            }
            None => {
                return Err(GraphError::UnknownSlot {
                    step: target_step.name().to_string(),
                    slot: target_slot,
                })
            }
        }
        target_step.connect_input(&target_slot, data)?;

        if !target_step.is_looped() {
            source_step
                .finished_trigger()
                .add_listener(target_step.clone());
        }

        let connection = Connection {
            source: source.to_string(),
            target: target.to_string(),
        };
        write_lock(&self.links).push(Link {
            connection,
            source: source_step,
            target: target_step,
            target_slot,
        });

        tracing::info!("Connected {} -> {} in group '{}'", source, target, self.name);
        self.emit(GraphEvent::Connected {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    /// Undo [`connect`](Self::connect); the target input becomes `NotSet`.
    pub fn disconnect(&self, source: &str, target: &str) -> Result<()> {
        let link = {
            let mut links = write_lock(&self.links);
            let index = links
                .iter()
                .position(|l| l.connection.source == source && l.connection.target == target)
                .ok_or_else(|| GraphError::UnknownConnection {
                    source_path: source.to_string(),
                    target_path: target.to_string(),
                })?;
            links.remove(index)
        };

        link.target.disconnect_input(&link.target_slot)?;

        let still_linked = read_lock(&self.links)
            .iter()
            .any(|l| Arc::ptr_eq(&l.source, &link.source) && Arc::ptr_eq(&l.target, &link.target));
        if !still_linked {
            let listener: Arc<dyn Triggerable> = link.target.clone();
            link.source.finished_trigger().remove_listener(&listener);
        }

        tracing::info!("Disconnected {} -> {} in group '{}'", source, target, self.name);
        self.emit(GraphEvent::Disconnected {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    /// Data connections made in this group, in connection order.
    pub fn connections(&self) -> Vec<Connection> {
        read_lock(&self.links)
            .iter()
            .map(|l| l.connection.clone())
            .collect()
    }

    // ==================== Trigger Connections ====================

    fn resolve_trigger(&self, path: &str) -> Result<TriggerTarget> {
        if let Ok((step, trigger)) = split_path(path) {
            if trigger == FINISHED_TRIGGER {
                if let Ok(step) = self.step(step) {
                    return Ok(TriggerTarget::Plain(step.finished_trigger().clone()));
                }
            }
        }
        match self.element(path) {
            Ok(ElementRef::Trigger(trigger)) => Ok(TriggerTarget::Plain(trigger)),
            Ok(ElementRef::LoopedTrigger(trigger)) => Ok(TriggerTarget::Looped(trigger)),
            _ => Err(GraphError::UnknownTrigger(path.to_string())),
        }
    }

    fn resolve_listener(&self, path: &str) -> Result<Arc<dyn Triggerable>> {
        match self.element(path)? {
            ElementRef::Step(step) => Ok(step as Arc<dyn Triggerable>),
            ElementRef::Trigger(trigger) => Ok(trigger as Arc<dyn Triggerable>),
            _ => Err(GraphError::RoleMismatch(format!(
                "'{}' cannot be triggered",
                path
            ))),
        }
    }

    /// Register `listener` (a step or trigger) on `trigger`.
    pub fn connect_trigger(&self, trigger: &str, listener: &str) -> Result<()> {
        let target = self.resolve_trigger(trigger)?;
        let node = self.resolve_listener(listener)?;

        match &target {
            TriggerTarget::Looped(looped) => {
                looped.add_listener(node.clone())?;
            }
            TriggerTarget::Plain(plain) => {
                if node.is_looped() {
                    return Err(GraphError::RoleMismatch(format!(
                        "looped step '{}' can only be driven by a looped trigger",
                        listener
                    )));
                }
                plain.add_listener(node.clone());
            }
        }

        {
            let mut links = write_lock(&self.trigger_links);
            if !links.iter().any(|l| l.is(&target, &node)) {
                links.push(TriggerLink {
                    connection: TriggerConnection {
                        trigger: trigger.to_string(),
                        listener: listener.to_string(),
                    },
                    target,
                    listener: node,
                });
            }
        }

        tracing::info!("Trigger '{}' -> '{}' in group '{}'", trigger, listener, self.name);
        self.emit(GraphEvent::TriggerConnected {
            trigger: trigger.to_string(),
            listener: listener.to_string(),
        });
        Ok(())
    }

    /// Undo [`connect_trigger`](Self::connect_trigger).
    pub fn disconnect_trigger(&self, trigger: &str, listener: &str) -> Result<()> {
        let target = self.resolve_trigger(trigger)?;
        let node = self.resolve_listener(listener)?;
        let removed = target.remove_listener(&node);
        write_lock(&self.trigger_links).retain(|l| !l.is(&target, &node));
        if !removed {
            return Err(GraphError::UnknownConnection {
                source_path: trigger.to_string(),
                target_path: listener.to_string(),
            });
        }

        self.emit(GraphEvent::TriggerDisconnected {
            trigger: trigger.to_string(),
            listener: listener.to_string(),
        });
        Ok(())
    }

    /// Trigger registrations made through
    /// [`connect_trigger`](Self::connect_trigger) in this group, in
    /// registration order.
    pub fn trigger_connections(&self) -> Vec<TriggerConnection> {
        read_lock(&self.trigger_links)
            .iter()
            .map(|l| l.connection.clone())
            .collect()
    }

    /// Listeners of `looped` in registration order, as paths relative to
    /// this group. A listener registered without a path is named directly
    /// when it is an element of this group and skipped otherwise.
    pub(crate) fn listener_paths(&self, looped: &Arc<LoopedTrigger>) -> Vec<String> {
        let target = TriggerTarget::Looped(looped.clone());
        let links = read_lock(&self.trigger_links);
        let mut paths = Vec::new();
        for listener in looped.trigger().listeners() {
            if let Some(link) = links.iter().find(|l| l.is(&target, &listener)) {
                paths.push(link.connection.listener.clone());
                continue;
            }
            let direct = read_lock(&self.elements)
                .get(listener.name())
                .and_then(as_listener)
                .is_some_and(|element| same_node(&element, &listener));
            if direct {
                paths.push(listener.name().to_string());
            } else {
                tracing::warn!(
                    "Listener '{}' of '{}' cannot be addressed from group '{}'",
                    listener.name(),
                    looped.name(),
                    self.name
                );
            }
        }
        paths
    }

    // ==================== Lifecycle ====================

    /// Start every looped trigger, including those of nested groups.
    /// Returns how many were started.
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for trigger in self.looped_triggers() {
            if trigger.start() {
                started += 1;
            }
        }
        for group in self.children() {
            started += group.start_all();
        }
        started
    }

    /// Stop every looped trigger, including those of nested groups.
    pub fn stop_all(&self) {
        for trigger in self.looped_triggers() {
            trigger.stop();
        }
        for group in self.children() {
            group.stop_all();
        }
    }

    /// Whether any looped trigger in this group or below is running.
    pub fn is_running(&self) -> bool {
        self.looped_triggers().iter().any(|t| t.is_running())
            || self.children().iter().any(|g| g.is_running())
    }
}

impl Element for Group {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_cell(&self) -> &OwnerCell {
        &self.owner
    }
}

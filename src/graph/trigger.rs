//! Trigger propagation.
//!
//! A [`Trigger`] holds an ordered list of [`Triggerable`] listeners and calls
//! them in registration order when fired. Every firing of a root trigger
//! starts a new round; each listener reacts to the first arrival of a round
//! and ignores later ones, so feedback loops read the previous round's values
//! instead of recursing.

use crate::graph::element::{Element, OwnerCell};
use crate::sync::{read_lock, write_lock};
use crate::thread::StepTime;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

static NEXT_ROUND: AtomicU64 = AtomicU64::new(1);

/// Allocate a new, process-wide unique round number.
pub fn next_round() -> u64 {
    NEXT_ROUND.fetch_add(1, Ordering::Relaxed)
}

/// Arguments passed along one propagation round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerArgs {
    pub round: u64,
    pub time: StepTime,
}

impl TriggerArgs {
    pub fn new(time: StepTime) -> Self {
        Self {
            round: next_round(),
            time,
        }
    }
}

/// Listeners already reached during a start/stop propagation.
pub type Visited = HashSet<usize>;

/// Record `node`; returns `false` if it was reached before.
pub(crate) fn first_visit<T: ?Sized>(visited: &mut Visited, node: &T) -> bool {
    visited.insert(node as *const T as *const () as usize)
}

/// Something that can be told to recompute.
pub trait Triggerable: Send + Sync {
    fn name(&self) -> &str;

    /// React to a trigger round.
    fn on_trigger(&self, args: &TriggerArgs);

    /// A looped trigger driving this listener is starting.
    fn call_on_start(&self, visited: &mut Visited);

    /// A looped trigger driving this listener has stopped.
    fn call_on_stop(&self, visited: &mut Visited);

    /// The trigger that first registered this listener.
    fn parent_trigger(&self) -> Option<Arc<Trigger>>;

    fn set_parent_trigger(&self, parent: Weak<Trigger>);

    /// Whether this listener may only be driven by looped triggers.
    fn is_looped(&self) -> bool {
        false
    }
}

/// Weak reference to the primary driver of a listener.
#[derive(Debug, Default)]
pub struct ParentTrigger(RwLock<Weak<Trigger>>);

impl ParentTrigger {
    pub fn get(&self) -> Option<Arc<Trigger>> {
        read_lock(&self.0).upgrade()
    }

    pub fn set(&self, parent: Weak<Trigger>) {
        *write_lock(&self.0) = parent;
    }
}

fn same_listener(a: &Weak<dyn Triggerable>, b: &Arc<dyn Triggerable>) -> bool {
    a.as_ptr() as *const () == Arc::as_ptr(b) as *const ()
}

/// Propagation node firing an ordered chain of listeners.
pub struct Trigger {
    name: String,
    looped: bool,
    listeners: RwLock<Vec<Weak<dyn Triggerable>>>,
    last_round: AtomicU64,
    parent: ParentTrigger,
    owner: OwnerCell,
}

impl Trigger {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), false))
    }

    pub(crate) fn new_looped(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), true))
    }

    fn build(name: String, looped: bool) -> Self {
        Self {
            name,
            looped,
            listeners: RwLock::new(Vec::new()),
            last_round: AtomicU64::new(0),
            parent: ParentTrigger::default(),
            owner: OwnerCell::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this trigger belongs to a looped trigger.
    pub fn is_looped_driver(&self) -> bool {
        self.looped
    }

    /// Append a listener. Registering the same listener twice has no effect.
    /// The first trigger to register a listener becomes its primary driver.
    pub fn add_listener(self: &Arc<Self>, listener: Arc<dyn Triggerable>) -> bool {
        {
            let mut listeners = write_lock(&self.listeners);
            listeners.retain(|l| l.strong_count() > 0);
            if listeners.iter().any(|l| same_listener(l, &listener)) {
                return false;
            }
            listeners.push(Arc::downgrade(&listener));
        }

        if listener.parent_trigger().is_none() {
            listener.set_parent_trigger(Arc::downgrade(self));
        }
        tracing::debug!(
            "Trigger '{}' now drives '{}'",
            self.name,
            listener.name()
        );
        true
    }

    /// Remove a listener, clearing its primary-driver reference if it pointed
    /// here.
    pub fn remove_listener(&self, listener: &Arc<dyn Triggerable>) -> bool {
        let removed = {
            let mut listeners = write_lock(&self.listeners);
            let before = listeners.len();
            listeners.retain(|l| !same_listener(l, listener) && l.strong_count() > 0);
            listeners.len() != before
        };

        if let Some(parent) = listener.parent_trigger() {
            if std::ptr::eq(Arc::as_ptr(&parent), self) {
                listener.set_parent_trigger(Weak::new());
            }
        }
        removed
    }

    pub fn is_listener(&self, listener: &Arc<dyn Triggerable>) -> bool {
        read_lock(&self.listeners)
            .iter()
            .any(|l| same_listener(l, listener))
    }

    /// Live listeners in registration order.
    pub fn listeners(&self) -> Vec<Arc<dyn Triggerable>> {
        read_lock(&self.listeners)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.listeners()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    pub fn clear_listeners(&self) {
        for listener in self.listeners() {
            self.remove_listener(&listener);
        }
    }

    /// Fire all listeners in registration order.
    ///
    /// The listener list is copied first, so listeners may modify the chain
    /// while being triggered.
    pub fn trigger(&self, args: &TriggerArgs) {
        self.last_round.store(args.round, Ordering::Release);
        let listeners = self.listeners();
        tracing::trace!(
            "Trigger '{}' round {} -> {} listener(s)",
            self.name,
            args.round,
            listeners.len()
        );
        for listener in listeners {
            listener.on_trigger(args);
        }
    }

    /// Start a new round at this trigger. Returns the round number.
    pub fn fire(&self, time: StepTime) -> u64 {
        let args = TriggerArgs::new(time);
        self.trigger(&args);
        args.round
    }

    /// Last round this trigger fired in (0 if never).
    pub fn last_round(&self) -> u64 {
        self.last_round.load(Ordering::Acquire)
    }

    pub(crate) fn start_listeners(&self, visited: &mut Visited) {
        for listener in self.listeners() {
            listener.call_on_start(visited);
        }
    }

    pub(crate) fn stop_listeners(&self, visited: &mut Visited) {
        for listener in self.listeners() {
            listener.call_on_stop(visited);
        }
    }
}

impl Element for Trigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_cell(&self) -> &OwnerCell {
        &self.owner
    }
}

impl Triggerable for Trigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_trigger(&self, args: &TriggerArgs) {
        if self.last_round.swap(args.round, Ordering::AcqRel) == args.round {
            return;
        }
        self.trigger(args);
    }

    fn call_on_start(&self, visited: &mut Visited) {
        if first_visit(visited, self) {
            self.start_listeners(visited);
        }
    }

    fn call_on_stop(&self, visited: &mut Visited) {
        if first_visit(visited, self) {
            self.stop_listeners(visited);
        }
    }

    fn parent_trigger(&self) -> Option<Arc<Trigger>> {
        self.parent.get()
    }

    fn set_parent_trigger(&self, parent: Weak<Trigger>) {
        self.parent.set(parent);
    }
}

//! Notifications about graph changes, delivered over crossbeam channels.
//!
//! Publishing never blocks: a subscriber whose queue is full misses the event
//! and the bus counts it as dropped.

use crate::graph::element::ElementKind;
use crate::graph::step::StepState;
use crate::sync::lock_mutex;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Default queue length of a subscription.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    ElementAdded { name: String, kind: ElementKind },
    ElementRemoved { name: String, kind: ElementKind },
    Connected { source: String, target: String },
    Disconnected { source: String, target: String },
    TriggerConnected { trigger: String, listener: String },
    TriggerDisconnected { trigger: String, listener: String },
    StepStateChanged {
        step: String,
        state: StepState,
        annotation: String,
    },
    ComputeFailed { step: String, message: String },
    LoopStarted { trigger: String },
    LoopStopped { trigger: String },
}

#[derive(Debug)]
struct BusInner {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<GraphEvent>>>,
    dropped: AtomicU64,
}

/// Fan-out of [`GraphEvent`]s. Clones share the same subscribers; nested
/// groups publish on their parent's bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                subscribers: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// New receiver for all events published from now on.
    pub fn subscribe(&self) -> Receiver<GraphEvent> {
        let (tx, rx) = bounded(self.inner.capacity);
        lock_mutex(&self.inner.subscribers).push(tx);
        rx
    }

    pub fn publish(&self, event: GraphEvent) {
        let mut subscribers = lock_mutex(&self.inner.subscribers);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock_mutex(&self.inner.subscribers).len()
    }

    /// Events lost to full subscriber queues.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn same_bus(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

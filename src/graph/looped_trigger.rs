//! A trigger that fires itself periodically on its own thread.

use crate::error::{GraphError, Result};
use crate::graph::element::{validate_name, Element, OwnerCell};
use crate::graph::events::{EventBus, GraphEvent};
use crate::graph::trigger::{Trigger, TriggerArgs, Triggerable, Visited};
use crate::sync::{lock_mutex, read_lock, write_lock};
use crate::thread::{
    LoopMode, LoopSettings, LoopStatistics, LoopedThreadWorker, SharedLoopSettings,
    SharedLoopStatistics, StepTime, StopToken, ThreadState, ThreadWrapper, Worker,
};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

/// Runs the pacing loop, then tells the chain that it stopped. Runs on the
/// worker thread so the chain is stopped exactly when the loop has exited,
/// whichever way the stop was requested.
struct ChainWorker<F> {
    name: String,
    looped: LoopedThreadWorker<F>,
    trigger: Weak<Trigger>,
    events: Option<EventBus>,
}

impl<F> Worker for ChainWorker<F>
where
    F: FnMut(StepTime) -> ControlFlow<()> + Send + 'static,
{
    fn work(&mut self, stop: &StopToken) {
        self.looped.work(stop);

        if let Some(trigger) = self.trigger.upgrade() {
            trigger.stop_listeners(&mut Visited::new());
        }
        tracing::info!("Looped trigger '{}' stopped", self.name);
        if let Some(events) = &self.events {
            events.publish(GraphEvent::LoopStopped {
                trigger: self.name.clone(),
            });
        }
    }
}

/// Trigger driven by a background loop at a target interval.
pub struct LoopedTrigger {
    name: String,
    trigger: Arc<Trigger>,
    settings: SharedLoopSettings,
    statistics: SharedLoopStatistics,
    thread: ThreadWrapper,
    lifecycle: Mutex<()>,
    manual_time: Mutex<Duration>,
    owner: OwnerCell,
}

impl fmt::Debug for LoopedTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopedTrigger")
            .field("name", &self.name)
            .field("state", &self.thread.state())
            .field("settings", &self.settings())
            .finish()
    }
}

impl LoopedTrigger {
    pub fn new(name: &str, settings: LoopSettings) -> Result<Arc<Self>> {
        validate_name(name)?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            trigger: Trigger::new_looped(name),
            settings: Arc::new(RwLock::new(settings)),
            statistics: Arc::new(Mutex::new(LoopStatistics::default())),
            thread: ThreadWrapper::new(format!("loop-{}", name)),
            lifecycle: Mutex::new(()),
            manual_time: Mutex::new(Duration::ZERO),
            owner: OwnerCell::default(),
        }))
    }

    pub fn with_interval(name: &str, interval: Duration) -> Result<Arc<Self>> {
        Self::new(name, LoopSettings::with_interval(interval))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trigger fired on every iteration.
    pub fn trigger(&self) -> &Arc<Trigger> {
        &self.trigger
    }

    /// Register a listener. A listener whose primary driver is another looped
    /// trigger is rejected.
    pub fn add_listener(&self, listener: Arc<dyn Triggerable>) -> Result<bool> {
        if let Some(parent) = listener.parent_trigger() {
            if parent.is_looped_driver() && !Arc::ptr_eq(&parent, &self.trigger) {
                return Err(GraphError::AlreadyLooped {
                    step: listener.name().to_string(),
                    trigger: parent.name().to_string(),
                });
            }
        }

        let _lifecycle = lock_mutex(&self.lifecycle);
        let added = self.trigger.add_listener(listener.clone());
        if added && self.is_running() {
            listener.call_on_start(&mut Visited::new());
        }
        Ok(added)
    }

    /// Unregister a listener; a running loop stops it first.
    pub fn remove_listener(&self, listener: &Arc<dyn Triggerable>) -> bool {
        let _lifecycle = lock_mutex(&self.lifecycle);
        let removed = self.trigger.remove_listener(listener);
        if removed && self.is_running() {
            listener.call_on_stop(&mut Visited::new());
        }
        removed
    }

    /// Listener names in registration order.
    pub fn listener_names(&self) -> Vec<String> {
        self.trigger.listener_names()
    }

    fn events(&self) -> Option<EventBus> {
        self.owner.get().map(|group| group.events())
    }

    /// Start the loop. Returns `false` if it is already running or still
    /// stopping.
    pub fn start(&self) -> bool {
        if self.thread.is_current_thread() {
            tracing::warn!("Looped trigger '{}' cannot restart itself", self.name);
            return false;
        }
        let _lifecycle = lock_mutex(&self.lifecycle);
        if !self.thread.is_idle() {
            tracing::warn!(
                "Looped trigger '{}' has already been started. Ignoring.",
                self.name
            );
            return false;
        }

        self.trigger.start_listeners(&mut Visited::new());

        let weak = Arc::downgrade(&self.trigger);
        let fire = move |time: StepTime| match weak.upgrade() {
            Some(trigger) => {
                trigger.fire(time);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        };
        let events = self.events();
        let worker = ChainWorker {
            name: self.name.clone(),
            looped: LoopedThreadWorker::new(self.settings.clone(), self.statistics.clone(), fire),
            trigger: Arc::downgrade(&self.trigger),
            events: events.clone(),
        };

        if !self.thread.start(worker) {
            self.trigger.stop_listeners(&mut Visited::new());
            return false;
        }

        tracing::info!(
            "Looped trigger '{}' started ({:?})",
            self.name,
            self.settings()
        );
        if let Some(events) = events {
            events.publish(GraphEvent::LoopStarted {
                trigger: self.name.clone(),
            });
        }
        true
    }

    /// Stop the loop and wait for the worker to exit. Listeners have been
    /// stopped when this returns.
    ///
    /// From a step running on this loop the stop is only requested; the loop
    /// exits after the current round.
    pub fn stop(&self) {
        if self.thread.is_current_thread() {
            self.thread.stop();
            return;
        }
        let _lifecycle = lock_mutex(&self.lifecycle);
        self.thread.stop();
    }

    /// Like [`stop`](Self::stop) but waits at most `timeout`.
    pub fn stop_with_timeout(&self, timeout: Duration) -> bool {
        if self.thread.is_current_thread() {
            self.thread.stop();
            return true;
        }
        let _lifecycle = lock_mutex(&self.lifecycle);
        self.thread.stop_with_timeout(timeout)
    }

    /// Whether the loop thread is starting or running. A requested stop
    /// counts as not running.
    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    pub fn thread_state(&self) -> ThreadState {
        self.thread.state()
    }

    pub fn settings(&self) -> LoopSettings {
        read_lock(&self.settings).clone()
    }

    /// Applies from the next iteration on.
    pub fn set_settings(&self, settings: LoopSettings) {
        *write_lock(&self.settings) = settings;
    }

    pub fn set_interval(&self, interval: Duration) {
        write_lock(&self.settings).interval = interval;
    }

    pub fn set_step_size(&self, step_size: Duration) {
        write_lock(&self.settings).step_size = step_size;
    }

    pub fn set_mode(&self, mode: LoopMode) {
        write_lock(&self.settings).mode = mode;
    }

    /// Pacing statistics of the current or last run.
    pub fn statistics(&self) -> LoopStatistics {
        lock_mutex(&self.statistics).clone()
    }

    /// Fire one round on the calling thread, advancing logical time by the
    /// configured step size. Does nothing until the loop thread is idle.
    pub fn single_step(&self) -> Option<u64> {
        if !self.thread.is_idle() {
            return None;
        }
        let dt = self.settings().step_size;
        let time = {
            let mut total = lock_mutex(&self.manual_time);
            *total += dt;
            StepTime::new(dt, *total)
        };
        let args = TriggerArgs::new(time);
        self.trigger.trigger(&args);
        Some(args.round)
    }
}

impl Drop for LoopedTrigger {
    fn drop(&mut self) {
        if !self.thread.is_idle() {
            self.thread.stop();
        }
    }
}

impl Element for LoopedTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_cell(&self) -> &OwnerCell {
        &self.owner
    }
}

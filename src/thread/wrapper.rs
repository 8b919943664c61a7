//! Restartable background thread with a lifecycle state machine.
//!
//! States run `Idle -> Starting -> Running -> Stopping -> Idle`. Start and
//! stop calls are serialized by a control lock, so `start(); stop()` issued
//! back to back (from the same or different threads) always ends in `Idle`.
//!
//! Cancellation is cooperative: `stop()` raises a flag that the worker checks
//! between iterations, and wakes the worker if it is sleeping through
//! [`StopToken::sleep`]. The worker thread is never interrupted mid-iteration.

use crate::sync::lock_mutex;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

/// Lifecycle state of a [`ThreadWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Work executed on the background thread.
pub trait Worker: Send + 'static {
    /// Run until `stop` reports a stop request (or the work is done).
    fn work(&mut self, stop: &StopToken);
}

struct Shared {
    state: Mutex<ThreadState>,
    changed: Condvar,
    stop_requested: AtomicBool,
    stop_signal: Mutex<Option<Sender<()>>>,
    worker_thread: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn set_state(&self, state: ThreadState) {
        *lock_mutex(&self.state) = state;
        self.changed.notify_all();
    }

    /// Move a starting or running thread to `Stopping`.
    fn begin_stop(&self) {
        let mut state = lock_mutex(&self.state);
        if matches!(*state, ThreadState::Starting | ThreadState::Running) {
            *state = ThreadState::Stopping;
            self.changed.notify_all();
        }
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(signal) = lock_mutex(&self.stop_signal).as_ref() {
            // A full channel already carries a pending wakeup.
            let _ = signal.try_send(());
        }
    }
}

/// Handed to the worker; reports stop requests and offers an interruptible
/// sleep.
pub struct StopToken {
    shared: Arc<Shared>,
    signal: Receiver<()>,
}

impl StopToken {
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a stop is requested first. Returns `true`
    /// if the thread should stop.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_stop_requested() {
            return true;
        }
        match self.signal.recv_timeout(duration) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => self.is_stop_requested(),
        }
    }

    /// Ask the owning wrapper to stop from inside the worker.
    pub fn request_stop(&self) {
        self.shared.begin_stop();
        self.shared.request_stop();
    }
}

/// Resets the state to `Idle` when the worker thread exits, including by
/// panic.
struct IdleOnExit(Arc<Shared>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        *lock_mutex(&self.0.worker_thread) = None;
        self.0.set_state(ThreadState::Idle);
    }
}

/// A restartable background thread.
pub struct ThreadWrapper {
    name: String,
    shared: Arc<Shared>,
    /// Serializes start/stop and holds the handle of the current thread.
    control: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadWrapper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(ThreadState::Idle),
                changed: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                stop_signal: Mutex::new(None),
                worker_thread: Mutex::new(None),
            }),
            control: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        *lock_mutex(&self.shared.state)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ThreadState::Starting | ThreadState::Running)
    }

    pub fn is_idle(&self) -> bool {
        self.state() == ThreadState::Idle
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    /// Whether the caller is running on this wrapper's worker thread.
    pub fn is_current_thread(&self) -> bool {
        *lock_mutex(&self.shared.worker_thread) == Some(std::thread::current().id())
    }

    /// Spawn the worker. Returns `false` if the thread was not idle.
    pub fn start<W: Worker>(&self, mut worker: W) -> bool {
        let mut handle = lock_mutex(&self.control);

        {
            let mut state = lock_mutex(&self.shared.state);
            if *state != ThreadState::Idle {
                tracing::warn!(
                    "Thread '{}' has already been started. Ignoring.",
                    self.name
                );
                return false;
            }
            *state = ThreadState::Starting;
        }

        // The previous thread (if any) already reached Idle, so this returns
        // promptly.
        if let Some(previous) = handle.take() {
            if previous.join().is_err() {
                tracing::error!("Previous worker of thread '{}' panicked", self.name);
            }
        }

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        let (signal_tx, signal_rx) = bounded(1);
        *lock_mutex(&self.shared.stop_signal) = Some(signal_tx);

        let shared = self.shared.clone();
        let token = StopToken {
            shared: shared.clone(),
            signal: signal_rx,
        };

        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                *lock_mutex(&shared.worker_thread) = Some(std::thread::current().id());
                let _idle = IdleOnExit(shared.clone());
                {
                    let mut state = lock_mutex(&shared.state);
                    if *state == ThreadState::Starting && !token.is_stop_requested() {
                        *state = ThreadState::Running;
                        shared.changed.notify_all();
                    }
                }
                worker.work(&token);
            });

        match spawned {
            Ok(join) => {
                tracing::debug!("Thread '{}' started", self.name);
                *handle = Some(join);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn thread '{}': {}", self.name, e);
                self.shared.set_state(ThreadState::Idle);
                false
            }
        }
    }

    /// Request a stop and block until the worker has exited.
    ///
    /// Called from the worker thread itself, this only requests the stop.
    pub fn stop(&self) {
        self.stop_inner(None);
    }

    /// Like [`stop`](Self::stop), but waits at most `timeout`. Returns
    /// `false` if the worker was still running when the timeout elapsed; the
    /// state then stays `Stopping` until the worker exits on its own.
    pub fn stop_with_timeout(&self, timeout: Duration) -> bool {
        self.stop_inner(Some(timeout))
    }

    fn stop_inner(&self, timeout: Option<Duration>) -> bool {
        if self.is_current_thread() {
            tracing::debug!("Thread '{}' requested its own stop", self.name);
            self.shared.begin_stop();
            self.shared.request_stop();
            return true;
        }

        let mut handle = lock_mutex(&self.control);

        {
            let mut state = lock_mutex(&self.shared.state);
            match *state {
                ThreadState::Idle => {
                    drop(state);
                    if let Some(finished) = handle.take() {
                        let _ = finished.join();
                    }
                    return true;
                }
                ThreadState::Starting | ThreadState::Running => {
                    *state = ThreadState::Stopping;
                }
                ThreadState::Stopping => {}
            }
        }

        self.shared.request_stop();

        let state = lock_mutex(&self.shared.state);
        match timeout {
            None => {
                let _idle = self
                    .shared
                    .changed
                    .wait_while(state, |s| *s != ThreadState::Idle)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(timeout) => {
                let (_state, result) = self
                    .shared
                    .changed
                    .wait_timeout_while(state, timeout, |s| *s != ThreadState::Idle)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    tracing::warn!(
                        "Thread '{}' is still running after call of stop()!",
                        self.name
                    );
                    return false;
                }
            }
        }

        if let Some(finished) = handle.take() {
            if finished.join().is_err() {
                tracing::error!("Worker of thread '{}' panicked", self.name);
            }
        }
        tracing::debug!("Thread '{}' stopped", self.name);
        true
    }
}

impl Drop for ThreadWrapper {
    fn drop(&mut self) {
        if !self.is_idle() {
            self.stop();
        }
    }
}

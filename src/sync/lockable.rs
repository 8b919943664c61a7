//! Deadlock-free aggregate locking.
//!
//! Every [`Lock`] gets a process-wide [`LockId`] in creation order. Whenever a
//! caller needs several locks at once, the requests are sorted by that id,
//! duplicates are merged (a write request wins over a read request for the
//! same lock) and the locks are acquired in ascending order. [`LockGuards`]
//! releases them in descending order when dropped.
//!
//! Since every caller acquires overlapping sets in the same relative order, no
//! cycle of waits can form.
//!
//! [`Lockable`] groups locks into named lock sets. The set `"all"` (handle
//! [`ALL_LOCKS`]) always exists and contains every lock added to any set.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(0);

/// Handle of the lock set containing every lock.
pub const ALL_LOCKS: LockSetHandle = 0;

/// Name of the lock set containing every lock.
pub const ALL_LOCKS_NAME: &str = "all";

/// Index of a lock set inside a [`Lockable`].
pub type LockSetHandle = usize;

/// Stable identity of a lock; defines the global acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LockId(u64);

impl LockId {
    fn next() -> Self {
        LockId(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// How a lock is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    /// Combine two requests for the same lock.
    pub fn merge(self, other: LockMode) -> LockMode {
        if self == LockMode::Write || other == LockMode::Write {
            LockMode::Write
        } else {
            LockMode::Read
        }
    }
}

/// A value guarded by a read/write lock with a global ordering id.
#[derive(Debug)]
pub struct Lock<T> {
    id: LockId,
    value: RwLock<T>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: LockId::next(),
            value: RwLock::new(value),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    /// Lock for reading. Poisoning is ignored: the guarded values stay
    /// structurally valid even if a writer panicked.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.value.write().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Guard<'a, T> {
    Read(RwLockReadGuard<'a, T>),
    Write(RwLockWriteGuard<'a, T>),
}

/// A set of held locks, sorted by id. Dropping it releases the locks in
/// descending id order.
pub struct LockGuards<'a, T> {
    guards: Vec<(LockId, Guard<'a, T>)>,
}

impl<'a, T> LockGuards<'a, T> {
    fn position(&self, id: LockId) -> Option<usize> {
        self.guards.binary_search_by_key(&id, |(held, _)| *held).ok()
    }

    /// Value of a held lock, regardless of its mode.
    pub fn get(&self, id: LockId) -> Option<&T> {
        let index = self.position(id)?;
        match &self.guards[index].1 {
            Guard::Read(guard) => Some(&**guard),
            Guard::Write(guard) => Some(&**guard),
        }
    }

    /// Mutable value of a lock held for writing. Read locks yield `None`.
    pub fn get_mut(&mut self, id: LockId) -> Option<&mut T> {
        let index = self.position(id)?;
        match &mut self.guards[index].1 {
            Guard::Read(_) => None,
            Guard::Write(guard) => Some(&mut **guard),
        }
    }

    /// Mode a lock is held in.
    pub fn mode(&self, id: LockId) -> Option<LockMode> {
        let index = self.position(id)?;
        Some(match self.guards[index].1 {
            Guard::Read(_) => LockMode::Read,
            Guard::Write(_) => LockMode::Write,
        })
    }

    /// Ids of the held locks in acquisition order.
    pub fn ids(&self) -> Vec<LockId> {
        self.guards.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl<T> Drop for LockGuards<'_, T> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

fn merge_requests<L, F>(mut requests: Vec<(L, LockMode)>, id: F) -> Vec<(L, LockMode)>
where
    F: Fn(&L) -> LockId,
{
    requests.sort_by_key(|(lock, _)| id(lock));

    let mut merged: Vec<(L, LockMode)> = Vec::with_capacity(requests.len());
    for (lock, mode) in requests {
        if let Some((last, last_mode)) = merged.last_mut() {
            if id(last) == id(&lock) {
                *last_mode = last_mode.merge(mode);
                continue;
            }
        }
        merged.push((lock, mode));
    }
    merged
}

/// The order in which a set of requests is acquired: ascending ids, one entry
/// per lock, write winning over read.
pub fn acquisition_order(
    requests: impl IntoIterator<Item = (LockId, LockMode)>,
) -> Vec<(LockId, LockMode)> {
    merge_requests(requests.into_iter().collect(), |id| *id)
}

/// Acquire all requested locks in the global order.
pub fn lock_all<'a, T>(
    requests: impl IntoIterator<Item = (&'a Lock<T>, LockMode)>,
) -> LockGuards<'a, T> {
    let ordered = merge_requests(requests.into_iter().collect(), |lock: &&'a Lock<T>| {
        lock.id()
    });

    let guards = ordered
        .into_iter()
        .map(|(lock, mode)| {
            let guard = match mode {
                LockMode::Read => Guard::Read(lock.read()),
                LockMode::Write => Guard::Write(lock.write()),
            };
            (lock.id(), guard)
        })
        .collect();

    LockGuards { guards }
}

struct LockSet<T> {
    name: String,
    entries: Vec<(Arc<Lock<T>>, LockMode)>,
}

/// Registry of locks grouped into named lock sets.
pub struct Lockable<T> {
    sets: Vec<LockSet<T>>,
}

impl<T> Default for Lockable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lockable<T> {
    pub fn new() -> Self {
        Self {
            sets: vec![LockSet {
                name: ALL_LOCKS_NAME.to_string(),
                entries: Vec::new(),
            }],
        }
    }

    /// Define a new, empty lock set.
    pub fn define_lock_set(&mut self, name: &str) -> Result<LockSetHandle> {
        if self.sets.iter().any(|set| set.name == name) {
            return Err(GraphError::Duplicate(format!("lock set '{}'", name)));
        }
        self.sets.push(LockSet {
            name: name.to_string(),
            entries: Vec::new(),
        });
        Ok(self.sets.len() - 1)
    }

    pub fn lock_set_handle(&self, name: &str) -> Result<LockSetHandle> {
        self.sets
            .iter()
            .position(|set| set.name == name)
            .ok_or_else(|| GraphError::UnknownLockSet(name.to_string()))
    }

    pub fn lock_set_names(&self) -> Vec<&str> {
        self.sets.iter().map(|set| set.name.as_str()).collect()
    }

    fn set(&self, handle: LockSetHandle) -> Result<&LockSet<T>> {
        self.sets
            .get(handle)
            .ok_or_else(|| GraphError::UnknownLockSet(format!("#{}", handle)))
    }

    fn set_mut(&mut self, handle: LockSetHandle) -> Result<&mut LockSet<T>> {
        self.sets
            .get_mut(handle)
            .ok_or_else(|| GraphError::UnknownLockSet(format!("#{}", handle)))
    }

    /// Add a lock to a lock set. Locks added to any set are also added to
    /// the `"all"` set.
    pub fn add_lock(&mut self, lock: Arc<Lock<T>>, mode: LockMode, set: LockSetHandle) -> Result<()> {
        self.set(set)?;
        if set != ALL_LOCKS {
            self.sets[ALL_LOCKS].entries.push((lock.clone(), mode));
        }
        self.set_mut(set)?.entries.push((lock, mode));
        Ok(())
    }

    /// Remove one entry for `lock` with the given mode from a lock set (and
    /// from the `"all"` set).
    pub fn remove_lock(&mut self, lock: &Lock<T>, mode: LockMode, set: LockSetHandle) -> Result<()> {
        let target = self.set_mut(set)?;
        let index = target
            .entries
            .iter()
            .position(|(held, held_mode)| held.id() == lock.id() && *held_mode == mode)
            .ok_or_else(|| GraphError::LockNotFound(target.name.clone()))?;
        target.entries.remove(index);

        if set != ALL_LOCKS {
            let all = &mut self.sets[ALL_LOCKS];
            if let Some(index) = all
                .entries
                .iter()
                .position(|(held, held_mode)| held.id() == lock.id() && *held_mode == mode)
            {
                all.entries.remove(index);
            }
        }
        Ok(())
    }

    /// Number of entries in a lock set.
    pub fn len(&self, set: LockSetHandle) -> usize {
        self.sets.get(set).map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn contains(&self, set: LockSetHandle, id: LockId) -> bool {
        self.sets
            .get(set)
            .map(|s| s.entries.iter().any(|(lock, _)| lock.id() == id))
            .unwrap_or(false)
    }

    /// Lock every lock of a set in its registered mode.
    pub fn lock(&self, set: LockSetHandle) -> Result<LockGuards<'_, T>> {
        let set = self.set(set)?;
        Ok(lock_all(
            set.entries.iter().map(|(lock, mode)| (lock.as_ref(), *mode)),
        ))
    }

    /// Lock every lock of a set in the given mode, e.g. read-only inspection
    /// of locks that are normally written.
    pub fn lock_as(&self, set: LockSetHandle, mode: LockMode) -> Result<LockGuards<'_, T>> {
        let set = self.set(set)?;
        Ok(lock_all(
            set.entries.iter().map(|(lock, _)| (lock.as_ref(), mode)),
        ))
    }

    pub fn lock_all(&self) -> LockGuards<'_, T> {
        lock_all(
            self.sets[ALL_LOCKS]
                .entries
                .iter()
                .map(|(lock, mode)| (lock.as_ref(), *mode)),
        )
    }
}

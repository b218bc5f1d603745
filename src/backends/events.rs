// SPDX-License-Identifier: GPL-3.0-only

//! Event fan-out between capture threads and their consumers
//!
//! Events are delivered synchronously on the emitting thread to whoever is
//! subscribed at that moment. Nothing is buffered: an event emitted with no
//! subscribers is dropped.

use super::types::Frame;
use crate::errors::BackendError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of observers for one kind of event
pub struct Observers<T> {
    list: Mutex<Vec<Observer<T>>>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            list: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer
    pub fn subscribe(&self, observer: Observer<T>) {
        if let Ok(mut list) = self.list.lock() {
            list.push(observer);
        }
    }

    /// Deliver `event` to every current observer
    ///
    /// The list is snapshotted first so observers may subscribe further
    /// observers without deadlocking.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Observer<T>> = match self.list.lock() {
            Ok(list) => list.clone(),
            Err(_) => return,
        };
        for observer in snapshot {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.list.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut list) = self.list.lock() {
            list.clear();
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Event sources of a single preview session
#[derive(Default)]
pub struct SessionEvents {
    pub frames: Observers<Frame>,
    pub errors: Observers<BackendError>,
    pub finished: Observers<()>,
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a running preview session
///
/// Returned by `start_preview`. Subscriptions made through a handle only see
/// events of that session; a later session gets a new handle, so glue code
/// never has to know which worker thread is behind it.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    events: Arc<SessionEvents>,
}

impl SessionHandle {
    pub(crate) fn new(events: Arc<SessionEvents>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            events,
        }
    }

    /// Unique id of this session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscribe to frames of this session (only backends that deliver pixels emit any)
    pub fn on_frame<F>(&self, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.events.frames.subscribe(Arc::new(callback));
    }

    /// Subscribe to errors raised while this session runs
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&BackendError) + Send + Sync + 'static,
    {
        self.events.errors.subscribe(Arc::new(callback));
    }

    /// Subscribe to the end of this session's capture
    pub fn on_finished<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.finished.subscribe(Arc::new(move |_: &()| callback()));
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_without_observers_is_dropped() {
        let observers: Observers<u32> = Observers::new();
        observers.emit(&5);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_every_observer_is_called() {
        let observers: Observers<u32> = Observers::new();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = Arc::clone(&total);
            observers.subscribe(Arc::new(move |v: &u32| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            }));
        }
        observers.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionHandle::new(Arc::new(SessionEvents::default()));
        let b = SessionHandle::new(Arc::new(SessionEvents::default()));
        assert_ne!(a.id(), b.id());
    }
}

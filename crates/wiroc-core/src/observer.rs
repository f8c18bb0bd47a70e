//! Publish/subscribe with disposable subscription handles
//!
//! Every event source in the engine (reassembled messages, connection
//! changes, decoded batches) is an [`Observers`] list. Registering returns a
//! [`Subscription`]; the callback stays registered until the handle is
//! dropped or [`Subscription::unsubscribe`] is called.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ObserverList<T> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T> ObserverList<T> {
    fn remove(&self, id: u64) {
        self.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
    }
}

/// A set of callbacks notified in registration order
pub struct Observers<T> {
    inner: Arc<ObserverList<T>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverList {
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().push((id, Arc::new(callback)));

        let list: Weak<ObserverList<T>> = Arc::downgrade(&self.inner);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(list) = list.upgrade() {
                    list.remove(id);
                }
            })),
        }
    }

    /// Invoke every registered callback with `value`
    ///
    /// The callback list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered callback; unregisters on drop
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unregister now
    pub fn unsubscribe(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Keep the callback registered for the lifetime of the source
    pub fn detach(mut self) {
        self.dispose = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

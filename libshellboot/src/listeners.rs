//! Listener sets for status notifications
//!
//! Listeners are invoked synchronously, once per notification. A
//! notification works on a snapshot of the set taken before the first
//! listener runs, so a listener may add or remove listeners (itself
//! included) without affecting delivery to the others in that round.

use parking_lot::Mutex;
use std::sync::Arc;

/// Handle returned by [`ListenerSet::add`], used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct ListenerSet<T> {
    inner: Mutex<ListenerSetInner<T>>,
}

struct ListenerSetInner<T> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<T>)>,
}

impl<T: Copy> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ListenerSetInner {
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false when the listener was already removed
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener with `value`, in registration order
    pub fn notify(&self, value: T) {
        // The lock must not be held while listeners run: they are allowed
        // to call back into this set.
        let snapshot: Vec<Listener<T>> = self
            .inner
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }
}

impl<T: Copy> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

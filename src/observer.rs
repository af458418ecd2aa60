use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entries<T> {
    handlers: Mutex<Vec<(u64, Handler<T>)>>,
    next_id: AtomicU64,
}

/// Subscriber registry owned by one component. Every `subscribe` returns a
/// [`Subscription`] handle; there is no ambient registry.
pub struct Registry<T> {
    entries: Arc<Entries<T>>,
}

/// Handle returned by [`Registry::subscribe`]. Dropping the handle keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    remove: Box<dyn Fn(u64) + Send + Sync>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        (self.remove)(self.id);
    }
}

impl<T: 'static> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Entries {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.entries.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .handlers
            .lock()
            .expect("observer registry poisoned")
            .push((id, Arc::new(handler)));

        let weak: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription {
            id,
            remove: Box::new(move |id| {
                if let Some(entries) = weak.upgrade() {
                    entries
                        .handlers
                        .lock()
                        .expect("observer registry poisoned")
                        .retain(|(hid, _)| *hid != id);
                }
            }),
        }
    }

    /// Invoke every handler with `value`, in subscription order. A panicking
    /// handler is logged and skipped; the remaining handlers still run.
    pub fn notify(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .entries
            .handlers
            .lock()
            .expect("observer registry poisoned")
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                warn!("subscriber panicked during notification, skipping");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .handlers
            .lock()
            .expect("observer registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.len())
            .finish()
    }
}

//! Listener callbacks and the registration bookkeeping shared by the event bus
//! and the store's subscription registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

/// A change callback, invoked with `(new_value, old_value)`.
///
/// `None` stands for "no value": the key was absent before, was deleted, or
/// was cleared.
pub type Listener = Arc<dyn Fn(Option<&Value>, Option<&Value>) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(Option<&Value>, Option<&Value>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifier of one registration inside a [`ListenerSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Ordered set of listeners for one key.
///
/// Registering the same `Arc` twice collapses onto the existing entry, so a
/// listener is never invoked twice for one notification. Distinct closures
/// with identical code are distinct entries.
#[derive(Clone, Default)]
pub struct ListenerSet {
    entries: Vec<(ListenerId, Listener)>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `listener` under `id`, or return the id it is already held under.
    pub fn insert(&mut self, id: ListenerId, listener: Listener) -> ListenerId {
        if let Some((existing, _)) = self
            .entries
            .iter()
            .find(|(_, l)| same_listener(l, &listener))
        {
            return *existing;
        }
        self.entries.push((id, listener));
        id
    }

    /// Remove the registration `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(eid, _)| *eid != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone of the listeners in registration order.
    ///
    /// Callers invoke the snapshot after releasing their lock, so a listener
    /// may subscribe or unsubscribe from inside its own callback.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Handle returned by every subscribe operation.
///
/// Calling [`Unsubscribe::unsubscribe`] removes exactly the registration it
/// was returned for; further calls do nothing. Dropping the handle does NOT
/// unsubscribe.
pub struct Unsubscribe {
    done: AtomicBool,
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Unsubscribe {
    /// Build a handle that runs `remove` on the first `unsubscribe` call.
    pub fn new<F>(remove: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            done: AtomicBool::new(false),
            remove: Box::new(remove),
        }
    }

    /// A handle with nothing to remove.
    pub fn noop() -> Self {
        Self {
            done: AtomicBool::new(true),
            remove: Box::new(|| {}),
        }
    }

    /// Remove the registration. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            (self.remove)();
        }
    }

    /// Returns `true` once `unsubscribe` has run.
    pub fn is_unsubscribed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}

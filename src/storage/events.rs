//! Store notifications.
//!
//! Listeners subscribe to one [`EventKind`] and are called synchronously,
//! in registration order, every time the store emits an event of that kind.
//! A listener that panics is logged and skipped; the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::error;

use crate::error::ErrorCode;
use crate::model::{Envelope, Snapshot};

/// Kinds of store events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Save,
    Load,
    Clear,
    Error,
    AutoSave,
    Cleanup,
    ExternalChange,
}

impl EventKind {
    /// Get the string representation used in logs and CLI output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::Clear => "clear",
            Self::Error => "error",
            Self::AutoSave => "autoSave",
            Self::Cleanup => "cleanup",
            Self::ExternalChange => "externalChange",
        }
    }
}

/// An event emitted by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// An envelope was written under the fixed key.
    Save { envelope: Envelope },

    /// A snapshot was read back.
    Load {
        snapshot: Snapshot,
        saved_at: DateTime<Utc>,
    },

    /// The fixed key was removed.
    Clear,

    /// An operation failed at the store boundary.
    Error { code: ErrorCode, message: String },

    /// An auto-save tick persisted a changed snapshot.
    AutoSave {
        timestamp: DateTime<Utc>,
        data_size: usize,
    },

    /// Stale entries were evicted.
    Cleanup { removed: usize },

    /// Another execution context changed the fixed key. Advisory only.
    ExternalChange {
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl StoreEvent {
    /// The kind listeners subscribe to for this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Save { .. } => EventKind::Save,
            Self::Load { .. } => EventKind::Load,
            Self::Clear => EventKind::Clear,
            Self::Error { .. } => EventKind::Error,
            Self::AutoSave { .. } => EventKind::AutoSave,
            Self::Cleanup { .. } => EventKind::Cleanup,
            Self::ExternalChange { .. } => EventKind::ExternalChange,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    listener: Listener,
}

/// Ordered listener registry.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.lock().len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Registration {
            id,
            kind,
            listener: Arc::new(listener),
        });
        Subscription(id)
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != subscription.0);
        listeners.len() != before
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|r| r.kind == kind).count()
    }

    /// Deliver `event` to every listener of its kind.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may subscribe or unsubscribe from inside a callback.
    pub fn emit(&self, event: &StoreEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(event = kind.as_str(), "Listener panicked; continuing dispatch");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_kind_strings() {
        assert_eq!(EventKind::AutoSave.as_str(), "autoSave");
        assert_eq!(EventKind::ExternalChange.as_str(), "externalChange");
        assert_eq!(StoreEvent::Clear.kind(), EventKind::Clear);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(EventKind::Clear, move |_| order.lock().unwrap().push(n));
        }
        bus.emit(&StoreEvent::Clear);

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_only_matching_kind_is_called() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::Save, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&StoreEvent::Clear);
        bus.emit(&StoreEvent::Cleanup { removed: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::Clear, |_| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::Clear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&StoreEvent::Clear);
        bus.emit(&StoreEvent::Clear);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.subscribe(EventKind::Clear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        bus.emit(&StoreEvent::Clear);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(EventKind::Clear), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner_bus = Arc::clone(&bus);
        let inner_slot = Arc::clone(&slot);
        let sub = bus.subscribe(EventKind::Clear, move |_| {
            if let Some(sub) = inner_slot.lock().unwrap().take() {
                inner_bus.unsubscribe(sub);
            }
        });
        *slot.lock().unwrap() = Some(sub);

        bus.emit(&StoreEvent::Clear);
        assert_eq!(bus.listener_count(EventKind::Clear), 0);
    }
}

//! In-process publish/subscribe for lifecycle notifications.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use wizard_core::Event;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handler invoked for every matching event.
pub type EventHandler = Arc<dyn Fn(&Event) -> Result<(), BoxError> + Send + Sync>;

struct Registration {
    id: u64,
    pattern: String,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    handlers: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Synchronous event bus.
///
/// Handlers run on the emitting task, in subscription order. A handler
/// returning an error is logged and skipped; it never reaches other
/// handlers or the emitter. Nothing is persisted.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event type, `prefix:*`, or `*`
    pub fn on<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let pattern = pattern.into();
        debug!(subscription_id = id, pattern = %pattern, "Event handler subscribed");

        self.inner.handlers.write().push(Registration {
            id,
            pattern,
            handler: Arc::new(handler),
        });

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every matching handler, returning how many ran
    pub fn emit(&self, event: &Event) -> usize {
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking
        let handlers: Vec<(u64, EventHandler)> = self
            .inner
            .handlers
            .read()
            .iter()
            .filter(|r| event.matches(&r.pattern))
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect();

        for (id, handler) in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    subscription_id = id,
                    event_type = %event.event_type,
                    error = %e,
                    "Event handler failed"
                ),
                Err(panic) => warn!(
                    subscription_id = id,
                    event_type = %event.event_type,
                    panic = panic_message(panic.as_ref()),
                    "Event handler panicked"
                ),
            }
        }

        handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Handle returned by [`EventBus::on`]; dropping it keeps the handler registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler; false when it was already gone
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|r| r.id != self.id);
        handlers.len() < before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use wizard_core::event_types;

    fn recorder(bus: &EventBus, pattern: &str) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.on(pattern, move |e: &Event| {
            sink.lock().push(e.event_type.clone());
            Ok(())
        });
        (seen, sub)
    }

    #[test]
    fn test_emit_reaches_matching_handlers() {
        let bus = EventBus::new();
        let (exact, _a) = recorder(&bus, event_types::WIZARD_SAVED);
        let (wizard, _b) = recorder(&bus, "wizard:*");
        let (all, _c) = recorder(&bus, "*");

        assert_eq!(bus.emit(&Event::new(event_types::WIZARD_SAVED, ())), 3);
        assert_eq!(bus.emit(&Event::new(event_types::TASK_DONE, ())), 1);

        assert_eq!(exact.lock().len(), 1);
        assert_eq!(wizard.lock().len(), 1);
        assert_eq!(*all.lock(), vec!["wizard:saved", "task:done"]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        bus.on("task:done", |_e: &Event| Err("boom".into()));
        let (seen, _sub) = recorder(&bus, "task:done");

        assert_eq!(bus.emit(&Event::new("task:done", ())), 2);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        bus.on("wizard:step", |_e: &Event| -> Result<(), BoxError> {
            panic!("subscriber bug")
        });
        let (seen, _sub) = recorder(&bus, "wizard:step");

        assert_eq!(bus.emit(&Event::new("wizard:step", ())), 2);
        assert_eq!(*seen.lock(), vec!["wizard:step"]);

        // Still usable afterwards
        bus.emit(&Event::new("wizard:step", ()));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (seen, sub) = recorder(&bus, "*");
        assert_eq!(bus.handler_count(), 1);

        assert!(sub.unsubscribe());
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.emit(&Event::new("wizard:step", ())), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.on("wizard:initialized", move |_e: &Event| {
            inner.on("wizard:step", |_e: &Event| Ok(()));
            Ok(())
        });

        bus.emit(&Event::new("wizard:initialized", ()));
        assert_eq!(bus.handler_count(), 2);
    }
}

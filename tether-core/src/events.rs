use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Name of the event that carries local failures: decode errors, protocol
/// violations, handler panics, transport faults.
pub const ERROR_EVENT: &str = "error";

/// Handle returned by `on`/`once`, consumed by `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    token: u64,
    once: bool,
    handler: Handler,
}

/// Synchronous named-event pub/sub for one peer.
///
/// Handlers for a name run in registration order on the emitting thread.
/// `emit` works on a snapshot, so re-registration from inside a handler only
/// affects later emits. A panicking handler is caught and reported on the
/// `error` event; it never stops the remaining handlers.
#[derive(Default)]
pub struct EventDispatcher {
    next_token: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<Entry>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event, false, Arc::new(handler))
    }

    /// Like `on`, but the registration is removed before the handler body
    /// runs, so it fires at most once.
    pub fn once<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event, true, Arc::new(handler))
    }

    fn register(&self, event: &str, once: bool, handler: Handler) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(event.to_string())
            .or_default()
            .push(Entry { token, once, handler });
        Subscription(token)
    }

    /// Remove a registration. Returns whether anything was removed.
    pub fn off(&self, event: &str, subscription: Subscription) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        match handlers.get_mut(event) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.token != subscription.0);
                entries.len() != before
            }
            None => false,
        }
    }

    pub fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event` at this moment, in
    /// registration order.
    pub fn emit(&self, event: &str, payload: &Value) {
        let snapshot: Vec<Handler> = {
            let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
            match handlers.get_mut(event) {
                Some(entries) => {
                    let snapshot = entries.iter().map(|e| Arc::clone(&e.handler)).collect();
                    entries.retain(|entry| !entry.once);
                    snapshot
                }
                None => return,
            }
        };

        for handler in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
            if let Err(cause) = outcome {
                let message = panic_to_string(&cause);
                if event == ERROR_EVENT {
                    // Never re-enter error handlers from an error handler.
                    tracing::error!("error handler panicked: {}", message);
                } else {
                    tracing::warn!(event, "event handler panicked: {}", message);
                    self.emit(ERROR_EVENT, &Value::String(message));
                }
            }
        }
    }
}

fn panic_to_string(cause: &Box<dyn Any + Send>) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = cause.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked with unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Value) + Send + Sync>)
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_make = Arc::clone(&log);
        let make = move |tag: &str| {
            let log = Arc::clone(&log_for_make);
            let tag = tag.to_string();
            let f: Box<dyn Fn(&Value) + Send + Sync> = Box::new(move |_payload: &Value| {
                log.lock().unwrap().push(tag.clone());
            });
            f
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let events = EventDispatcher::new();
        let (log, make) = recorder();

        events.on("tick", make("a"));
        events.on("tick", make("b"));
        events.on("tick", make("c"));
        events.emit("tick", &Value::Null);

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_payload_reaches_handlers() {
        let events = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);

        events.on("data", move |payload| {
            *seen_clone.lock().unwrap() = Some(payload.clone());
        });
        events.emit("data", &json!({"x": 42}));

        assert_eq!(seen.lock().unwrap().take(), Some(json!({"x": 42})));
    }

    #[test]
    fn test_off_removes_only_that_subscription() {
        let events = EventDispatcher::new();
        let (log, make) = recorder();

        let first = events.on("tick", make("a"));
        events.on("tick", make("b"));

        assert!(events.off("tick", first));
        assert!(!events.off("tick", first));
        events.emit("tick", &Value::Null);

        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let events = EventDispatcher::new();
        let (log, make) = recorder();

        events.once("tick", make("once"));
        events.on("tick", make("always"));
        events.emit("tick", &Value::Null);
        events.emit("tick", &Value::Null);

        assert_eq!(*log.lock().unwrap(), vec!["once", "always", "always"]);
    }

    #[test]
    fn test_once_is_unregistered_before_its_body_runs() {
        let events = Arc::new(EventDispatcher::new());
        let observed = Arc::new(Mutex::new(usize::MAX));

        let events_inner = Arc::clone(&events);
        let observed_inner = Arc::clone(&observed);
        events.once("tick", move |_| {
            *observed_inner.lock().unwrap() = events_inner.handler_count("tick");
        });
        events.emit("tick", &Value::Null);

        assert_eq!(*observed.lock().unwrap(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_the_rest() {
        let events = EventDispatcher::new();
        let (log, make) = recorder();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);

        events.on(ERROR_EVENT, move |payload| {
            errors_clone.lock().unwrap().push(payload.clone());
        });
        events.on("tick", make("before"));
        events.on("tick", |_| panic!("boom"));
        events.on("tick", make("after"));
        events.emit("tick", &Value::Null);

        assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_panicking_error_handler_does_not_recurse() {
        let events = EventDispatcher::new();
        events.on(ERROR_EVENT, |_| panic!("error handler gone wrong"));
        // Must terminate rather than recurse into the error handlers.
        events.emit(ERROR_EVENT, &Value::String("original".to_string()));
    }

    #[test]
    fn test_handler_registered_during_emit_waits_for_the_next_emit() {
        let events = Arc::new(EventDispatcher::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let events_inner = Arc::clone(&events);
        let log_inner = Arc::clone(&log);
        events.on("tick", move |_| {
            log_inner.lock().unwrap().push("outer");
            let log_late = Arc::clone(&log_inner);
            events_inner.on("tick", move |_| {
                log_late.lock().unwrap().push("late");
            });
        });

        events.emit("tick", &Value::Null);
        assert_eq!(*log.lock().unwrap(), vec!["outer"]);

        events.emit("tick", &Value::Null);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "outer", "late"]);
    }
}

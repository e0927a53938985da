//! Event listener registry.
//!
//! Listeners are kept in registration order and invoked synchronously on the
//! inbound path. A panicking listener is caught and logged; the remaining
//! listeners still run and the store is unaffected.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

use devlink_core::ListenerId;
use devlink_core::wire::EventDetails;

use crate::device::DeviceHandle;

/// Callback invoked for every applied sync frame.
///
/// Receives the device the frame was about (if it is still mirrored), the
/// event details and the raw event data. Must not block.
pub type EventListener = dyn Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync;

type Entries = IndexMap<ListenerId, Arc<EventListener>>;

/// Ordered set of event listeners owned by one session.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it runs after every listener registered before it.
    pub fn register<F>(&self, listener: F) -> ListenerRegistration
    where
        F: Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        let _ = self.entries.lock().insert(id.clone(), Arc::new(listener));
        debug!(listener_id = %id, "listener registered");
        ListenerRegistration {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every listener and return how many were registered.
    ///
    /// Outstanding [`ListenerRegistration`]s become no-ops.
    pub fn clear(&self) -> usize {
        // drop the closures outside the lock
        let drained = std::mem::take(&mut *self.entries.lock());
        drained.len()
    }

    /// Invoke every listener in registration order.
    ///
    /// The lock is released before any listener runs, so listeners may
    /// register or remove listeners. One removed mid-dispatch is skipped.
    /// Returns how many listeners completed without panicking.
    pub fn dispatch(&self, device: Option<&DeviceHandle>, details: &EventDetails, data: &Value) -> usize {
        let listeners: Vec<(ListenerId, Arc<EventListener>)> = self
            .entries
            .lock()
            .iter()
            .map(|(id, listener)| (id.clone(), Arc::clone(listener)))
            .collect();

        let mut completed = 0;
        for (id, listener) in listeners {
            if !self.entries.lock().contains_key(&id) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener(device.cloned(), details, data);
            }));
            match outcome {
                Ok(()) => completed += 1,
                Err(payload) => {
                    error!(
                        listener_id = %id,
                        property = details.property.as_deref().unwrap_or_default(),
                        panic = panic_message(payload.as_ref()),
                        "error in listener"
                    );
                }
            }
        }
        completed
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle returned by listener registration.
///
/// Dropping it leaves the listener in place; call [`remove`](Self::remove).
pub struct ListenerRegistration {
    id: ListenerId,
    entries: Weak<Mutex<Entries>>,
}

impl ListenerRegistration {
    /// Id of the registered listener.
    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    /// Remove the listener.
    ///
    /// Returns `true` if this call removed it; repeated calls, or calls after
    /// the owning session is gone, return `false`.
    pub fn remove(&self) -> bool {
        let Some(entries) = self.entries.upgrade() else {
            return false;
        };
        let removed = entries.lock().shift_remove(&self.id).is_some();
        if removed {
            debug!(listener_id = %self.id, "listener removed");
        }
        removed
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(property: &str) -> EventDetails {
        EventDetails {
            property: Some(property.into()),
            event_time: Some(1),
            event_interface: None,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_factory = Arc::clone(&log);
        let factory = move |tag: &str| {
            let log = Arc::clone(&log_for_factory);
            let tag = tag.to_string();
            Box::new(move |_: Option<DeviceHandle>, d: &EventDetails, v: &Value| {
                log.lock().push(format!("{tag}:{}:{v}", d.property.as_deref().unwrap_or("")));
            }) as Box<dyn Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync>
        };
        (log, factory)
    }

    #[test]
    fn invoked_once_per_event_in_order() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let _reg = registry.register(make("a"));

        for n in 0..3 {
            let _ = registry.dispatch(None, &details("on"), &json!(n));
        }
        assert_eq!(*log.lock(), vec!["a:on:0", "a:on:1", "a:on:2"]);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let _first = registry.register(make("first"));
        let _second = registry.register(make("second"));
        let _third = registry.register(make("third"));

        assert_eq!(registry.dispatch(None, &details("p"), &json!(1)), 3);
        assert_eq!(*log.lock(), vec!["first:p:1", "second:p:1", "third:p:1"]);
    }

    #[test]
    fn removal_stops_invocations_and_is_idempotent() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let reg = registry.register(make("a"));

        let _ = registry.dispatch(None, &details("p"), &json!(1));
        assert!(reg.remove());
        assert!(!reg.remove());
        let _ = registry.dispatch(None, &details("p"), &json!(2));

        assert_eq!(*log.lock(), vec!["a:p:1"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let _bad = registry.register(|_, _, _| panic!("listener exploded"));
        let _good = registry.register(make("good"));

        let completed = registry.dispatch(None, &details("p"), &json!(true));
        assert_eq!(completed, 1);
        assert_eq!(*log.lock(), vec!["good:p:true"]);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let registry = Arc::new(ListenerRegistry::new());
        let (log, make) = recorder();
        let victim: Arc<Mutex<Option<ListenerRegistration>>> = Arc::new(Mutex::new(None));

        let victim_slot = Arc::clone(&victim);
        let _remover = registry.register(move |_, _, _| {
            if let Some(reg) = victim_slot.lock().as_ref() {
                let _ = reg.remove();
            }
        });
        *victim.lock() = Some(registry.register(make("victim")));

        assert_eq!(registry.dispatch(None, &details("p"), &json!(1)), 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn clear_drops_all_listeners() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let first = registry.register(make("a"));
        let _second = registry.register(make("b"));

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch(None, &details("p"), &json!(1)), 0);
        assert!(log.lock().is_empty());
        assert!(!first.remove());
    }

    #[test]
    fn removal_after_registry_dropped_is_noop() {
        let registry = ListenerRegistry::new();
        let reg = registry.register(|_, _, _| {});
        drop(registry);
        assert!(!reg.remove());
    }

    #[test]
    fn panic_message_extracts_strings() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}

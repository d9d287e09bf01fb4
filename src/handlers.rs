//! Handler table
//!
//! Maps event names to callbacks. Registration may race with dispatch from
//! the reader task, so the map sits behind a read/write lock. Handlers are
//! invoked after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::event::Event;

/// Callback invoked for each event with a matching name
///
/// Runs on the reader task: further frames are not read until it returns.
/// Long-running work should be handed off (e.g. `tokio::spawn`).
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Callback invoked with the name of an event that had no handler
pub type MissHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler was found and invoked
    Handled,
    /// No handler registered for the name; the event was dropped
    Missed,
}

/// Event name -> handler mapping
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<String, EventHandler>>,
    miss_hook: RwLock<Option<MissHook>>,
}

impl HandlerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the handler for `name`
    pub fn register(&self, name: impl Into<String>, handler: EventHandler) {
        let name = name.into();
        trace!("Registering handler for '{}'", name);
        self.handlers.write().insert(name, handler);
    }

    /// Remove the handler for `name`, returning whether one existed
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    /// Check if a handler is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Drop every handler and the miss hook
    ///
    /// Handlers often capture a handle to their own connection; clearing the
    /// table when the connection ends breaks that reference cycle.
    pub fn clear(&self) {
        self.handlers.write().clear();
        *self.miss_hook.write() = None;
    }

    /// Set the hook called for unhandled event names
    pub fn set_miss_hook(&self, hook: MissHook) {
        *self.miss_hook.write() = Some(hook);
    }

    /// Look up and invoke the handler for `event.name`
    pub fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let handler = self.handlers.read().get(&event.name).cloned();

        match handler {
            Some(handler) => {
                handler(event);
                DispatchOutcome::Handled
            }
            None => {
                trace!("No handler for '{}', dropping event", event.name);
                let hook = self.miss_hook.read().clone();
                if let Some(hook) = hook {
                    hook(&event.name);
                }
                DispatchOutcome::Missed
            }
        }
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("HandlerTable")
            .field("events", &names)
            .finish()
    }
}

//! Named-event registry with prioritized handlers.
//!
//! Events are created by name at startup; handlers attach with a priority
//! (higher runs first, FIFO among equals) and may veto further processing by
//! returning [`Verdict::Reject`]. A handler that errors is logged with its
//! identity and the event name and treated as neutral: it neither stops
//! iteration nor fails the trigger.

use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use stray_proto::Message;
use tracing::{error, warn};

/// Chat message event names.
pub const ON_PUBMSG: &str = "on_pubmsg";
/// Post-veto message event, fired after `on_pubmsg` accepts.
pub const ON_MESSAGE: &str = "on_message";
/// Fired once during shutdown, before the farewell.
pub const ON_QUIT: &str = "on_quit";

/// What a handler decided about the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Continue with the remaining handlers / downstream processing.
    Accept,
    /// Veto: stop processing this event.
    Reject,
}

/// Handler outcome; an `Err` is isolated and treated as neutral.
pub type HandlerResult = anyhow::Result<Verdict>;

/// A handler callback.
pub type Callback = Arc<dyn Fn(&ChatEvent) -> HandlerResult + Send + Sync>;

/// Payload passed to event handlers.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A public channel message, before command processing.
    Pubmsg {
        /// Sender nickname.
        source: String,
        /// Channel the message arrived on.
        channel: String,
        /// Message text.
        text: String,
    },
    /// The same message with its full frame attached.
    Message {
        /// Sender nickname.
        source: String,
        /// Channel the message arrived on.
        channel: String,
        /// Message text.
        text: String,
        /// The parsed inbound frame.
        message: Message,
    },
    /// The client is shutting down.
    Quit,
}

struct HandlerEntry {
    name: String,
    priority: i32,
    callback: Callback,
}

/// Registry of named events and their ordered handler lists.
pub struct EventRegistry {
    events: RwLock<HashMap<String, Vec<HandlerEntry>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Register an event name with an empty handler list.
    pub fn create_event(&self, event: &str) {
        self.events
            .write()
            .entry(event.to_string())
            .or_insert_with(Vec::new);
    }

    /// Attach a handler to an event. Higher priority runs first; equal
    /// priorities run in registration order.
    ///
    /// Attaching to an unregistered event is a configuration error: logged,
    /// not created implicitly.
    pub fn add_handler<F>(&self, event: &str, name: impl Into<String>, priority: i32, callback: F)
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let mut events = self.events.write();
        match events.get_mut(event) {
            Some(entries) => {
                entries.push(HandlerEntry {
                    name: name.into(),
                    priority,
                    callback: Arc::new(callback),
                });
                // Stable sort: ties keep their insertion order.
                entries.sort_by_key(|e| Reverse(e.priority));
            }
            None => {
                error!(event = %event, "add_handler: no such event");
            }
        }
    }

    /// Detach a handler by its registered name.
    #[allow(dead_code)] // plugin teardown surface
    pub fn remove_handler(&self, event: &str, name: &str) {
        let mut events = self.events.write();
        match events.get_mut(event) {
            Some(entries) => {
                if let Some(pos) = entries.iter().position(|e| e.name == name) {
                    entries.remove(pos);
                }
            }
            None => {
                error!(event = %event, "remove_handler: no such event");
            }
        }
    }

    /// Fire an event.
    ///
    /// Handlers run in priority order. With `stop_on_reject`, the first
    /// [`Verdict::Reject`] short-circuits and is returned; otherwise every
    /// handler runs and the result is Accept. An unregistered event name
    /// logs an error and returns Reject without running anything.
    pub fn trigger(&self, event: &str, stop_on_reject: bool, payload: &ChatEvent) -> Verdict {
        let callbacks: Vec<(String, Callback)> = {
            let events = self.events.read();
            match events.get(event) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.name.clone(), Arc::clone(&e.callback)))
                    .collect(),
                None => {
                    error!(event = %event, "trigger: no such event");
                    return Verdict::Reject;
                }
            }
        };

        for (name, callback) in callbacks {
            match callback.as_ref()(payload) {
                Ok(Verdict::Reject) if stop_on_reject => return Verdict::Reject,
                Ok(_) => {}
                Err(e) => {
                    // Isolated: a broken handler is a neutral result.
                    warn!(handler = %name, event = %event, error = %e, "handler failed");
                }
            }
        }

        Verdict::Accept
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

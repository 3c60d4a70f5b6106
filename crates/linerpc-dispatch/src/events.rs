//! Event publication and forwarding.
//!
//! Objects publish events through an [`EventEmitter`] onto an
//! [`EventBus`]. Anything interested implements [`EventSubscriber`].
//! The [`EventForwarder`] is the piece that knows which events leave the
//! process: it maps `(object, event)` to an outgoing command and turns an
//! [`EmittedEvent`] into a [`ForwardRequest`] for the connection layer.
//!
//! ```text
//! object ─emit─→ EventBus ─publish─→ subscriber ─forward─→ ForwardRequest ─→ peer
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use linerpc_protocol::Value;
use parking_lot::RwLock;

use crate::object::bare_name;
use crate::{BoundObject, DispatchError, Marshaler, ObjectId, TypeDescriptor};

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// One event occurrence: which object fired it, its name and raw
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub source: ObjectId,
    pub event: String,
    pub args: Vec<Value>,
}

/// Receives every event published on a bus.
///
/// Called on the thread that emitted the event.
pub trait EventSubscriber: Send + Sync + 'static {
    fn on_event(&self, event: &EmittedEvent);
}

/// A process-local fan-out of events to subscribers. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Delivers `event` to every subscriber, in subscription order.
    pub fn publish(&self, event: &EmittedEvent) {
        // Snapshot so a subscriber may subscribe others without deadlocking.
        let subscribers = self.subscribers.read().clone();
        tracing::trace!(
            source = %event.source,
            event = %event.event,
            subscribers = subscribers.len(),
            "publishing event"
        );
        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// What an object holds to publish its own events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    source: ObjectId,
    bus: EventBus,
}

impl EventEmitter {
    pub fn new(source: ObjectId, bus: EventBus) -> Self {
        Self { source, bus }
    }

    pub fn source(&self) -> ObjectId {
        self.source
    }

    pub fn emit(&self, event: impl Into<String>, args: Vec<Value>) {
        self.bus.publish(&EmittedEvent {
            source: self.source,
            event: event.into(),
            args,
        });
    }
}

// ---------------------------------------------------------------------------
// Forwarder
// ---------------------------------------------------------------------------

/// Links an object's event to an outgoing command.
#[derive(Debug, Clone)]
struct EventBinding {
    command: String,
    async_call: bool,
    params: Vec<TypeDescriptor>,
}

/// An event translated into an outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    pub command: String,
    pub args: Vec<Value>,
    pub async_call: bool,
}

/// Registry of events that are re-published to the peer.
#[derive(Debug)]
pub struct EventForwarder {
    bindings: RwLock<HashMap<(ObjectId, String), EventBinding>>,
    marshaler: Arc<Marshaler>,
}

impl EventForwarder {
    pub fn new(marshaler: Arc<Marshaler>) -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            marshaler,
        }
    }

    /// Forwards `event` of `object` to the peer as `command`.
    ///
    /// `event` may carry a signature (`notify(integer,text)`); only the
    /// name is used. Subscribing again replaces the earlier binding.
    ///
    /// # Errors
    ///
    /// [`DispatchError::EventNotFound`] if the object declares no such
    /// event.
    pub fn subscribe(
        &self,
        object: &BoundObject,
        event: &str,
        command: impl Into<String>,
        async_call: bool,
    ) -> Result<(), DispatchError> {
        let name = bare_name(event);
        let descriptor =
            object
                .interface()
                .event(name)
                .ok_or_else(|| DispatchError::EventNotFound {
                    object: object.type_name().to_string(),
                    event: name.to_string(),
                })?;
        let binding = EventBinding {
            command: command.into(),
            async_call,
            params: descriptor.params().to_vec(),
        };
        tracing::debug!(
            object = %object,
            event = %descriptor.signature(),
            command = %binding.command,
            async_call,
            "event subscribed"
        );
        self.bindings
            .write()
            .insert((object.id(), name.to_string()), binding);
        Ok(())
    }

    /// Forwards every event of `object` under its own name, async.
    pub fn subscribe_all(&self, object: &BoundObject) {
        let mut bindings = self.bindings.write();
        for event in object.interface().events() {
            bindings.insert(
                (object.id(), event.name().to_string()),
                EventBinding {
                    command: event.name().to_string(),
                    async_call: true,
                    params: event.params().to_vec(),
                },
            );
        }
    }

    /// Stops forwarding `event` of `object`. Returns whether it was bound.
    pub fn unsubscribe(&self, object: &BoundObject, event: &str) -> bool {
        self.bindings
            .write()
            .remove(&(object.id(), bare_name(event).to_string()))
            .is_some()
    }

    /// Translates an emitted event into an outgoing call.
    ///
    /// Returns `None` when the event isn't bound (it may have been
    /// unsubscribed concurrently) or its arguments don't marshal against
    /// the declared parameters. Both cases are logged and never fatal.
    pub fn forward(&self, event: &EmittedEvent) -> Option<ForwardRequest> {
        let binding = self
            .bindings
            .read()
            .get(&(event.source, event.event.clone()))
            .cloned();
        let Some(binding) = binding else {
            tracing::debug!(source = %event.source, event = %event.event, "event not bound, dropped");
            return None;
        };

        if binding.params.len() != event.args.len() {
            tracing::warn!(
                source = %event.source,
                event = %event.event,
                expected = binding.params.len(),
                found = event.args.len(),
                "event argument count mismatch, dropped"
            );
            return None;
        }

        let args = binding
            .params
            .iter()
            .zip(event.args.iter().cloned())
            .map(|(desc, arg)| self.marshaler.from_native(desc, arg))
            .collect::<Result<Vec<_>, _>>();
        match args {
            Ok(args) => Some(ForwardRequest {
                command: binding.command,
                args,
                async_call: binding.async_call,
            }),
            Err(e) => {
                tracing::warn!(
                    source = %event.source,
                    event = %event.event,
                    error = %e,
                    "event arguments failed to marshal, dropped"
                );
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interface;
    use parking_lot::Mutex;

    fn notifier() -> Arc<BoundObject> {
        BoundObject::new(
            Interface::builder("Notifier")
                .event("notify", vec![TypeDescriptor::Integer, TypeDescriptor::Text])
                .event("tick", vec![])
                .build(),
        )
    }

    fn forwarder() -> EventForwarder {
        EventForwarder::new(Arc::new(Marshaler::new()))
    }

    fn emitted(obj: &BoundObject, event: &str, args: Vec<Value>) -> EmittedEvent {
        EmittedEvent {
            source: obj.id(),
            event: event.to_string(),
            args,
        }
    }

    #[test]
    fn test_forward_bound_event_builds_request() {
        let obj = notifier();
        let fwd = forwarder();
        fwd.subscribe(&obj, "notify(integer,text)", "notify", true).unwrap();

        let req = fwd
            .forward(&emitted(&obj, "notify", vec![Value::Integer(42), Value::from("hi")]))
            .unwrap();
        assert_eq!(
            req,
            ForwardRequest {
                command: "notify".into(),
                args: vec![Value::Integer(42), Value::from("hi")],
                async_call: true,
            }
        );
    }

    #[test]
    fn test_subscribe_unknown_event_fails() {
        let obj = notifier();
        let err = forwarder().subscribe(&obj, "missing", "x", true).unwrap_err();
        assert_eq!(
            err,
            DispatchError::EventNotFound {
                object: "Notifier".into(),
                event: "missing".into()
            }
        );
    }

    #[test]
    fn test_forward_unbound_event_dropped() {
        let obj = notifier();
        assert!(forwarder().forward(&emitted(&obj, "tick", vec![])).is_none());
    }

    #[test]
    fn test_forward_after_unsubscribe_dropped() {
        let obj = notifier();
        let fwd = forwarder();
        fwd.subscribe_all(&obj);
        assert_eq!(fwd.len(), 2);
        assert!(fwd.unsubscribe(&obj, "tick"));
        assert!(fwd.forward(&emitted(&obj, "tick", vec![])).is_none());
    }

    #[test]
    fn test_forward_mismatched_arguments_dropped() {
        let obj = notifier();
        let fwd = forwarder();
        fwd.subscribe(&obj, "notify", "notify", false).unwrap();
        assert!(fwd.forward(&emitted(&obj, "notify", vec![Value::Integer(1)])).is_none());
        assert!(
            fwd.forward(&emitted(
                &obj,
                "notify",
                vec![Value::from("no"), Value::from("hi")]
            ))
            .is_none()
        );
    }

    #[test]
    fn test_forward_keeps_sync_flag_and_command_alias() {
        let obj = notifier();
        let fwd = forwarder();
        fwd.subscribe(&obj, "tick", "on_tick", false).unwrap();
        let req = fwd.forward(&emitted(&obj, "tick", vec![])).unwrap();
        assert_eq!(req.command, "on_tick");
        assert!(!req.async_call);
    }

    struct Recorder(Mutex<Vec<EmittedEvent>>);

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &EmittedEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_emitter_publishes_to_every_subscriber() {
        let bus = EventBus::new();
        let a = Arc::new(Recorder(Mutex::new(Vec::new())));
        let b = Arc::new(Recorder(Mutex::new(Vec::new())));
        bus.subscribe(a.clone());
        bus.subscribe(b.clone());

        let emitter = EventEmitter::new(ObjectId::new(9), bus.clone());
        emitter.emit("tick", vec![]);

        assert_eq!(a.0.lock().len(), 1);
        assert_eq!(b.0.lock()[0].source, ObjectId::new(9));
        assert_eq!(bus.subscriber_count(), 2);
    }
}

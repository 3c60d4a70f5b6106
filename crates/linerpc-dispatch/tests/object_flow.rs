//! An object registered end to end: its methods through the dispatcher,
//! its events through the bus and the forwarder.

use std::sync::Arc;

use linerpc_dispatch::{
    BoundObject, CommandDispatcher, DispatchError, EmittedEvent, EventBus, EventEmitter,
    EventForwarder, EventSubscriber, ForwardRequest, Interface, IntoValue, Marshaler, RpcObject,
    TypeDescriptor,
};
use linerpc_protocol::Value;
use parking_lot::Mutex;

// =========================================================================
// Fixtures
// =========================================================================

/// An application enum carried as an integer.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Light {
    Red = 0,
    Green = 2,
}

#[derive(Default)]
struct TrafficLight {
    emitter: Mutex<Option<EventEmitter>>,
    state: Mutex<i64>,
}

impl TrafficLight {
    fn switch(&self, to: i64) -> i64 {
        let previous = std::mem::replace(&mut *self.state.lock(), to);
        let emitter = self.emitter.lock().clone();
        if let Some(emitter) = emitter {
            emitter.emit(
                "switched",
                vec![Value::opaque("Light", previous), Value::opaque("Light", to)],
            );
        }
        previous
    }
}

impl RpcObject for TrafficLight {
    fn interface(self: Arc<Self>) -> Interface {
        let light = Arc::clone(&self);
        Interface::builder("TrafficLight")
            .method("switch", move |to: i64| light.switch(to))
            .method("describe", |names: Vec<String>, sep: String| names.join(&sep))
            .event(
                "switched",
                vec![TypeDescriptor::named("Light"), TypeDescriptor::named("Light")],
            )
            .build()
    }

    fn attach(&self, emitter: EventEmitter) {
        *self.emitter.lock() = Some(emitter);
    }
}

/// Forwards every event and records the resulting requests.
struct Outbox {
    forwarder: Arc<EventForwarder>,
    sent: Mutex<Vec<ForwardRequest>>,
}

impl EventSubscriber for Outbox {
    fn on_event(&self, event: &EmittedEvent) {
        if let Some(request) = self.forwarder.forward(event) {
            self.sent.lock().push(request);
        }
    }
}

struct Setup {
    dispatcher: CommandDispatcher,
    forwarder: Arc<EventForwarder>,
    outbox: Arc<Outbox>,
    bound: Arc<BoundObject>,
}

fn setup(marshaler: Marshaler) -> Setup {
    let marshaler = Arc::new(marshaler);
    let dispatcher = CommandDispatcher::with_shared_marshaler(Arc::clone(&marshaler));
    let forwarder = Arc::new(EventForwarder::new(marshaler));
    let outbox = Arc::new(Outbox {
        forwarder: Arc::clone(&forwarder),
        sent: Mutex::new(Vec::new()),
    });
    let bus = EventBus::new();
    bus.subscribe(outbox.clone());

    let light = Arc::new(TrafficLight::default());
    let bound = BoundObject::new(Arc::clone(&light).interface());
    light.attach(EventEmitter::new(bound.id(), bus));
    dispatcher.register_all(&bound);

    Setup {
        dispatcher,
        forwarder,
        outbox,
        bound,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn test_command_emits_event_forwarded_with_registered_type() {
    let s = setup(Marshaler::with_integer_types(["Light"]));
    s.forwarder
        .subscribe(&s.bound, "switched(Light,Light)", "light_switched", true)
        .unwrap();

    let previous = s
        .dispatcher
        .dispatch("switch", vec![(Light::Green as i64).into_value()])
        .unwrap();
    assert_eq!(previous, Value::Integer(Light::Red as i64));

    let sent = s.outbox.sent.lock();
    assert_eq!(
        *sent,
        vec![ForwardRequest {
            command: "light_switched".into(),
            args: vec![Value::Integer(0), Value::Integer(2)],
            async_call: true,
        }]
    );
}

#[test]
fn test_unregistered_event_type_is_dropped_not_nulled() {
    let s = setup(Marshaler::new());
    s.forwarder.subscribe_all(&s.bound);

    s.dispatcher
        .dispatch("switch", vec![Value::Integer(1)])
        .unwrap();
    assert!(s.outbox.sent.lock().is_empty());
}

#[test]
fn test_nested_container_arguments_dispatch() {
    let s = setup(Marshaler::new());
    let out = s
        .dispatcher
        .dispatch(
            "describe",
            vec![Value::from(vec!["a", "b", "c"]), Value::from("-")],
        )
        .unwrap();
    assert_eq!(out, Value::from("a-b-c"));

    let err = s
        .dispatcher
        .dispatch("describe", vec![Value::from(vec![1i64]), Value::from("-")])
        .unwrap_err();
    assert_eq!(err, DispatchError::SignatureMismatch("describe".into()));
}

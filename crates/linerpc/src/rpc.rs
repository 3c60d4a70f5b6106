//! The `Rpc` facade: objects on one side, a peer connection on the other.
//!
//! This is the entry point. It ties together all the layers: registered
//! objects feed the dispatcher and the event bus, the connection feeds
//! incoming commands to the dispatcher, and bound events go out to the
//! peer.

use std::sync::Arc;
use std::time::Duration;

use linerpc_dispatch::{
    BoundObject, CommandDispatcher, EventBus, EventEmitter, EventForwarder, Marshaler, RpcObject,
};
use linerpc_protocol::{DecodeOptions, Value};
use linerpc_transport::{ByteStream, Transport, TransportError, connect_tcp};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::forward::{ForwardingSubscriber, PeerSlot};
use crate::{ConnectionConfig, ConnectionHandle, RpcError, spawn_connection};

/// A registered object, as returned by [`Rpc::register`].
pub type ObjectRef = Arc<BoundObject>;

/// Builder for configuring an [`Rpc`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use linerpc::Rpc;
///
/// let rpc = Rpc::builder()
///     .call_timeout(Duration::from_secs(10))
///     .integer_type("Color")
///     .build();
/// assert!(rpc.commands().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RpcBuilder {
    config: ConnectionConfig,
    marshaler: Marshaler,
}

impl RpcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole connection configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    pub fn decode(mut self, decode: DecodeOptions) -> Self {
        self.config.decode = decode;
        self
    }

    /// Carries the named application type as an integer on the wire.
    pub fn integer_type(mut self, type_name: impl Into<String>) -> Self {
        self.marshaler.treat_as_integer(type_name);
        self
    }

    pub fn build(self) -> Rpc {
        let marshaler = Arc::new(self.marshaler);
        let dispatcher = Arc::new(CommandDispatcher::with_shared_marshaler(Arc::clone(
            &marshaler,
        )));
        let forwarder = Arc::new(EventForwarder::new(marshaler));
        let peer: PeerSlot = Arc::new(RwLock::new(None));

        let bus = EventBus::new();
        bus.subscribe(Arc::new(ForwardingSubscriber::new(
            Arc::clone(&forwarder),
            Arc::clone(&peer),
        )));

        Rpc {
            dispatcher,
            forwarder,
            bus,
            peer,
            config: self.config,
        }
    }
}

/// Exposes objects to one peer and calls into it.
///
/// Register objects, bind their members and events, then attach a
/// stream with [`set_peer`](Self::set_peer):
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use linerpc::prelude::*;
///
/// struct Calculator;
///
/// impl RpcObject for Calculator {
///     fn interface(self: Arc<Self>) -> Interface {
///         Interface::builder("Calculator")
///             .method("add", |a: i64, b: i64| a + b)
///             .build()
///     }
/// }
///
/// # async fn run() -> Result<(), RpcError> {
/// let rpc = Rpc::new();
/// let calc = rpc.register(Arc::new(Calculator));
/// rpc.bind_all_members(&calc);
///
/// let peer = rpc.connect_tcp("127.0.0.1:9000").await?;
/// peer.closed().await;
/// # Ok(())
/// # }
/// ```
pub struct Rpc {
    dispatcher: Arc<CommandDispatcher>,
    forwarder: Arc<EventForwarder>,
    bus: EventBus,
    peer: PeerSlot,
    config: ConnectionConfig,
}

impl Rpc {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RpcBuilder {
        RpcBuilder::new()
    }

    // -----------------------------------------------------------------------
    // Objects and bindings
    // -----------------------------------------------------------------------

    /// Registers `object` and hands it an emitter for its events.
    ///
    /// Registration alone exposes nothing; bind members and events next.
    pub fn register<T: RpcObject>(&self, object: Arc<T>) -> ObjectRef {
        let bound = BoundObject::new(Arc::clone(&object).interface());
        object.attach(EventEmitter::new(bound.id(), self.bus.clone()));
        tracing::debug!(object = %bound, "object registered");
        bound
    }

    /// Exposes every method under its own name and forwards every event
    /// as an async command of the same name.
    pub fn bind_all_members(&self, object: &ObjectRef) {
        self.bind_incoming(object);
        self.bind_outgoing(object);
    }

    /// Exposes every method under its own name.
    pub fn bind_incoming(&self, object: &ObjectRef) {
        self.dispatcher.register_all(object);
    }

    /// Forwards every event as an async command of the same name.
    pub fn bind_outgoing(&self, object: &ObjectRef) {
        self.forwarder.subscribe_all(object);
    }

    /// Exposes `member` of `object` as `command`. Every overload of the
    /// member becomes a candidate.
    pub fn bind_method_as(&self, command: &str, object: &ObjectRef, member: &str) {
        self.dispatcher.register(command, object, member);
    }

    /// Forwards `event` of `object` to the peer as `command`.
    ///
    /// With `async_call` false, emitting the event blocks the emitting
    /// thread until the peer responds.
    pub fn bind_event_as(
        &self,
        object: &ObjectRef,
        event: &str,
        command: &str,
        async_call: bool,
    ) -> Result<(), RpcError> {
        self.forwarder
            .subscribe(object, event, command, async_call)
            .map_err(RpcError::from)
    }

    /// Stops forwarding `event` of `object`.
    pub fn unbind_event(&self, object: &ObjectRef, event: &str) -> bool {
        self.forwarder.unsubscribe(object, event)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.dispatcher.commands()
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    // -----------------------------------------------------------------------
    // Peer
    // -----------------------------------------------------------------------

    /// Serves `stream` as the peer, replacing and closing any previous one.
    pub fn set_peer<S: ByteStream>(&self, stream: S) -> ConnectionHandle {
        let handle = spawn_connection(stream, Arc::clone(&self.dispatcher), self.config.clone());
        if let Some(previous) = self.peer.write().replace(handle.clone()) {
            tracing::info!(stream_id = %previous.id(), "replacing peer");
            previous.close();
        }
        handle
    }

    /// Waits for one stream on `transport` and makes it the peer.
    pub async fn accept_from<T: Transport>(
        &self,
        transport: &mut T,
    ) -> Result<ConnectionHandle, RpcError> {
        let stream = transport.accept().await.map_err(|e| {
            tracing::error!(error = %e, "accept failed");
            TransportError::AcceptFailed(std::io::Error::other(e))
        })?;
        Ok(self.set_peer(stream))
    }

    /// Connects to a TCP peer at `addr` and makes it the peer.
    pub async fn connect_tcp(&self, addr: &str) -> Result<ConnectionHandle, RpcError> {
        let stream = connect_tcp(addr).await?;
        Ok(self.set_peer(stream))
    }

    pub fn peer(&self) -> Option<ConnectionHandle> {
        self.peer.read().clone()
    }

    fn require_peer(&self) -> Result<ConnectionHandle, RpcError> {
        self.peer().ok_or(RpcError::NotConnected)
    }

    // -----------------------------------------------------------------------
    // Outgoing calls
    // -----------------------------------------------------------------------

    /// Calls `command` on the peer and waits for its result.
    pub async fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.require_peer()?.call(command, args).await
    }

    /// Calls `command` on the peer and converts the result with serde.
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        command: &str,
        args: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.call(command, args).await?;
        Ok(value.into_serde()?)
    }

    /// See [`ConnectionHandle::call_blocking`].
    pub fn call_blocking(&self, command: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.require_peer()?.call_blocking(command, args)
    }

    /// Sends `command` to the peer without waiting.
    pub fn call_async(&self, command: &str, args: Vec<Value>) -> Result<(), RpcError> {
        self.require_peer()?.call_async(command, args)
    }
}

impl Default for Rpc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linerpc_dispatch::{Interface, TypeDescriptor};

    struct Echo;

    impl RpcObject for Echo {
        fn interface(self: Arc<Self>) -> Interface {
            Interface::builder("Echo")
                .method("echo", |s: String| s)
                .method("echo", |n: i64| n)
                .event("echoed", vec![TypeDescriptor::Text])
                .build()
        }
    }

    #[test]
    fn test_bind_all_members_registers_each_name_once() {
        let rpc = Rpc::new();
        let echo = rpc.register(Arc::new(Echo));
        rpc.bind_all_members(&echo);
        assert_eq!(rpc.commands(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_bind_method_as_alias() {
        let rpc = Rpc::new();
        let echo = rpc.register(Arc::new(Echo));
        rpc.bind_method_as("repeat", &echo, "echo(text)");
        let out = rpc
            .dispatcher()
            .dispatch("repeat", vec![Value::from("hi")])
            .unwrap();
        assert_eq!(out, Value::from("hi"));
    }

    #[test]
    fn test_bind_event_as_unknown_event_fails() {
        let rpc = Rpc::new();
        let echo = rpc.register(Arc::new(Echo));
        assert!(matches!(
            rpc.bind_event_as(&echo, "missing", "x", true),
            Err(RpcError::Dispatch(_))
        ));
        assert!(rpc.bind_event_as(&echo, "echoed(text)", "on_echo", true).is_ok());
        assert!(rpc.unbind_event(&echo, "echoed"));
    }

    #[test]
    fn test_calls_without_peer_fail_not_connected() {
        let rpc = Rpc::new();
        assert!(rpc.peer().is_none());
        assert!(matches!(
            rpc.call_async("x", vec![]),
            Err(RpcError::NotConnected)
        ));
        assert!(matches!(
            rpc.call_blocking("x", vec![]),
            Err(RpcError::NotConnected)
        ));
    }
}

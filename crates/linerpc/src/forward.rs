//! Glue between the event bus and the peer connection.

use std::sync::Arc;

use linerpc_dispatch::{EmittedEvent, EventForwarder, EventSubscriber};
use parking_lot::RwLock;

use crate::ConnectionHandle;

/// The current peer, shared between the facade and its subscriber.
pub(crate) type PeerSlot = Arc<RwLock<Option<ConnectionHandle>>>;

/// Subscribes to the bus and sends bound events to the peer.
///
/// Async events go out with `call_async` and never block the emitting
/// thread. Synchronous ones block it until the peer responds, except on
/// a current-thread runtime's own thread, where they are dropped with a
/// warning (see [`ConnectionHandle::call_blocking`]).
pub(crate) struct ForwardingSubscriber {
    forwarder: Arc<EventForwarder>,
    peer: PeerSlot,
}

impl ForwardingSubscriber {
    pub(crate) fn new(forwarder: Arc<EventForwarder>, peer: PeerSlot) -> Self {
        Self { forwarder, peer }
    }
}

impl EventSubscriber for ForwardingSubscriber {
    fn on_event(&self, event: &EmittedEvent) {
        let Some(request) = self.forwarder.forward(event) else {
            return;
        };
        let Some(peer) = self.peer.read().clone() else {
            tracing::debug!(command = %request.command, "no peer connected, event dropped");
            return;
        };

        let result = if request.async_call {
            peer.call_async(&request.command, request.args)
        } else {
            peer.call_blocking(&request.command, request.args).map(drop)
        };
        if let Err(e) = result {
            tracing::warn!(
                stream_id = %peer.id(),
                command = %request.command,
                error = %e,
                "forwarding event failed"
            );
        }
    }
}

//! Transport service contracts.
//!
//! Payloads are opaque JSON values; the sync and invoke layers own their shapes.

use std::{future::Future, pin::Pin, rc::Rc};

use command_contract::Player;
use serde_json::Value;

/// Object-safe boxed future used by the network traits.
pub type NetworkFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Observer-side callback for fire-and-forget messages from the authoritative side.
pub type ClientMessageHandler = Rc<dyn Fn(Value)>;

/// Authoritative-side callback for fire-and-forget messages from an observer.
pub type ServerMessageHandler = Rc<dyn Fn(&Player, Value)>;

/// Authoritative-side request/response handler.
pub type InvokeHandler = Rc<dyn Fn(Player, Value) -> NetworkFuture<'static, Value>>;

/// Authoritative-side callback for an observer leaving, keyed by player id.
pub type DisconnectHandler = Rc<dyn Fn(u64)>;

/// Callbacks the authoritative side installs on its transport.
#[derive(Clone)]
pub struct ServerHandlers {
    /// Incoming event.
    pub on_message: ServerMessageHandler,
    /// Incoming request.
    pub on_invoke: InvokeHandler,
    /// Connection closed.
    pub on_disconnect: DisconnectHandler,
}

/// Transport as seen from the authoritative side.
pub trait ServerNetwork {
    /// Installs the incoming-traffic callbacks.
    fn connect(&self, handlers: ServerHandlers);

    /// Sends an event to one observer.
    fn fire(&self, observer: &Player, payload: Value);
}

/// Transport as seen from an observer.
pub trait ClientNetwork {
    /// Installs the incoming-event callback.
    fn connect(&self, on_message: ClientMessageHandler);

    /// Sends an event to the authoritative side.
    fn fire(&self, payload: Value);

    /// Sends a request and waits for the authoritative side's response.
    fn invoke<'a>(&'a self, payload: Value) -> NetworkFuture<'a, Result<Value, String>>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Transport that delivers nothing, for single-process hosts.
pub struct NoopNetwork;

impl ServerNetwork for NoopNetwork {
    fn connect(&self, _handlers: ServerHandlers) {}

    fn fire(&self, _observer: &Player, _payload: Value) {}
}

impl ClientNetwork for NoopNetwork {
    fn connect(&self, _on_message: ClientMessageHandler) {}

    fn fire(&self, _payload: Value) {}

    fn invoke<'a>(&'a self, _payload: Value) -> NetworkFuture<'a, Result<Value, String>> {
        Box::pin(async { Err("network unavailable: invoke".to_string()) })
    }
}

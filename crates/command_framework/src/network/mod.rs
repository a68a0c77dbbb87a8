//! Transport contracts between the authoritative side and observers, plus an in-process adapter.

mod loopback;
mod service;

pub use loopback::{LoopbackClient, LoopbackNetwork};
pub use service::{
    ClientMessageHandler, ClientNetwork, DisconnectHandler, InvokeHandler, NetworkFuture,
    NoopNetwork, ServerHandlers, ServerMessageHandler, ServerNetwork,
};

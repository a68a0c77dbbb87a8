//! In-process transport connecting one authoritative side with any number of observers.
//!
//! Events are queued and only delivered by [`LoopbackNetwork::pump`], which lets tests control
//! ordering and simulate lost traffic. Requests are answered immediately.

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    rc::Rc,
};

use command_contract::Player;
use serde_json::Value;
use tracing::trace;

use super::service::{
    ClientMessageHandler, ClientNetwork, NetworkFuture, ServerHandlers, ServerNetwork,
};

enum Delivery {
    ToServer { from: Player, payload: Value },
    ToClient { id: u64, payload: Value },
}

struct Endpoint {
    player: Player,
    on_message: Option<ClientMessageHandler>,
}

#[derive(Default)]
struct LoopbackState {
    server: Option<ServerHandlers>,
    clients: BTreeMap<u64, Endpoint>,
    queue: VecDeque<Delivery>,
}

/// Shared loopback transport; clones address the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Rc<RefCell<LoopbackState>>,
}

impl LoopbackNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an observer endpoint for `player`.
    pub fn client(&self, player: Player) -> LoopbackClient {
        self.inner.borrow_mut().clients.insert(
            player.id,
            Endpoint {
                player: player.clone(),
                on_message: None,
            },
        );
        LoopbackClient {
            network: self.clone(),
            player,
        }
    }

    /// Detaches an observer and notifies the authoritative side.
    pub fn disconnect(&self, id: u64) {
        let handlers = {
            let mut state = self.inner.borrow_mut();
            state.clients.remove(&id);
            state.server.clone()
        };
        if let Some(handlers) = handlers {
            (handlers.on_disconnect)(id);
        }
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Discards every queued event, returning how many were lost.
    pub fn drop_pending(&self) -> usize {
        let mut state = self.inner.borrow_mut();
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }

    /// Delivers queued events, including ones queued during delivery, until none remain.
    ///
    /// Returns how many events were processed.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        loop {
            let Some(delivery) = self.inner.borrow_mut().queue.pop_front() else {
                return processed;
            };
            processed += 1;
            match delivery {
                Delivery::ToServer { from, payload } => {
                    let handlers = self.inner.borrow().server.clone();
                    match handlers {
                        Some(handlers) => (handlers.on_message)(&from, payload),
                        None => trace!(from = from.id, "no server connected; event dropped"),
                    }
                }
                Delivery::ToClient { id, payload } => {
                    let handler = self
                        .inner
                        .borrow()
                        .clients
                        .get(&id)
                        .and_then(|endpoint| endpoint.on_message.clone());
                    match handler {
                        Some(handler) => handler(payload),
                        None => trace!(to = id, "observer not listening; event dropped"),
                    }
                }
            }
        }
    }

    fn endpoint_player(&self, id: u64) -> Option<Player> {
        self.inner
            .borrow()
            .clients
            .get(&id)
            .map(|endpoint| endpoint.player.clone())
    }
}

impl ServerNetwork for LoopbackNetwork {
    fn connect(&self, handlers: ServerHandlers) {
        self.inner.borrow_mut().server = Some(handlers);
    }

    fn fire(&self, observer: &Player, payload: Value) {
        self.inner.borrow_mut().queue.push_back(Delivery::ToClient {
            id: observer.id,
            payload,
        });
    }
}

/// Observer endpoint on a [`LoopbackNetwork`].
#[derive(Clone)]
pub struct LoopbackClient {
    network: LoopbackNetwork,
    player: Player,
}

impl LoopbackClient {
    /// Identity this endpoint sends as.
    pub fn player(&self) -> &Player {
        &self.player
    }
}

impl ClientNetwork for LoopbackClient {
    fn connect(&self, on_message: ClientMessageHandler) {
        if let Some(endpoint) = self
            .network
            .inner
            .borrow_mut()
            .clients
            .get_mut(&self.player.id)
        {
            endpoint.on_message = Some(on_message);
        }
    }

    fn fire(&self, payload: Value) {
        self.network
            .inner
            .borrow_mut()
            .queue
            .push_back(Delivery::ToServer {
                from: self.player.clone(),
                payload,
            });
    }

    fn invoke<'a>(&'a self, payload: Value) -> NetworkFuture<'a, Result<Value, String>> {
        Box::pin(async move {
            let Some(player) = self.network.endpoint_player(self.player.id) else {
                return Err("observer disconnected".to_string());
            };
            let handlers = self.network.inner.borrow().server.clone();
            let Some(handlers) = handlers else {
                return Err("no server connected".to_string());
            };
            Ok((handlers.on_invoke)(player, payload).await)
        })
    }
}

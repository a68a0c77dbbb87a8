//! Side-specific runtimes and the per-thread "started" slot.
//!
//! A host starts exactly one side per thread: [`start_server`] for the authoritative catalog
//! or [`start_client`] for an observer. Both return an explicit handle; the free accessors
//! ([`registry`], [`dispatcher`], [`server`], [`client`]) reach the same handle for call sites
//! that cannot have it threaded through.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use command_contract::{InvokeRequest, InvokeResponse, Player, Reply};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    builtin_types::builtin_types,
    command::{Command, Guard},
    config::FrameworkConfig,
    context::{stamp_reply, CommandContext},
    dispatcher::Dispatcher,
    error::{CommandError, RegistryError, RuntimeError, SyncError},
    history::CommandHistory,
    logging,
    network::{ClientNetwork, NetworkFuture, ServerHandlers, ServerNetwork},
    registry::Registry,
    roster::{NoopRoster, Roster},
    sync::{SyncClient, SyncServer, Visibility},
};

/// Host collaborators and settings for either side.
#[derive(Clone)]
pub struct StartOptions {
    /// Serializable settings.
    pub config: FrameworkConfig,
    /// Guards run before every command.
    pub guards: Vec<Guard>,
    /// Identity lookup for the player and team types.
    pub roster: Rc<dyn Roster>,
    /// Per-observer command visibility; authoritative side only.
    pub visibility: Option<Visibility>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self::new(FrameworkConfig::default())
    }
}

impl StartOptions {
    /// Options with `config` and no guards, roster, or visibility filter.
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            config,
            guards: Vec::new(),
            roster: Rc::new(NoopRoster),
            visibility: None,
        }
    }

    /// Appends a global guard.
    pub fn guard(
        mut self,
        guard: impl Fn(&mut CommandContext) -> Result<bool, CommandError> + 'static,
    ) -> Self {
        self.guards.push(Rc::new(guard));
        self
    }

    /// Sets the roster.
    pub fn roster(mut self, roster: Rc<dyn Roster>) -> Self {
        self.roster = roster;
        self
    }

    /// Sets the visibility filter.
    pub fn visibility(
        mut self,
        visibility: impl Fn(&Player, &Command) -> bool + 'static,
    ) -> Self {
        self.visibility = Some(Rc::new(visibility));
        self
    }
}

fn prepare_registry(options: &StartOptions) -> Result<Registry, RuntimeError> {
    let registry = Registry::new();
    if options.config.register_builtin_types {
        let types = builtin_types(options.roster.clone()).map_err(RegistryError::from)?;
        registry.register_types(types);
    }
    Ok(registry)
}

fn failure(text: &str) -> Reply {
    stamp_reply(false, text)
}

struct ServerShared {
    registry: Registry,
    dispatcher: Dispatcher,
    sync: SyncServer,
}

/// Authoritative side: owns the catalog, answers sync requests, and runs forwarded commands.
#[derive(Clone)]
pub struct ServerRuntime {
    shared: Rc<ServerShared>,
}

impl ServerRuntime {
    /// Builds the runtime and installs its handlers on `network`.
    pub fn new(
        options: StartOptions,
        network: Rc<dyn ServerNetwork>,
    ) -> Result<Self, RuntimeError> {
        let registry = prepare_registry(&options)?;
        let dispatcher = Dispatcher::new(registry.clone(), options.config.messages.clone())
            .with_guards(options.guards.clone());
        let sync = SyncServer::new(registry.clone(), network.clone(), options.visibility.clone());
        let runtime = Self {
            shared: Rc::new(ServerShared {
                registry,
                dispatcher,
                sync,
            }),
        };
        network.connect(runtime.handlers());
        Ok(runtime)
    }

    /// Catalog.
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Dispatcher for locally typed lines and forwarded invocations.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// Sync protocol state.
    pub fn sync(&self) -> &SyncServer {
        &self.shared.sync
    }

    /// Handles a raw event from an observer.
    pub fn handle_message(&self, from: &Player, payload: Value) {
        self.shared.sync.handle_message(from, payload);
    }

    /// Forgets an observer that disconnected.
    pub fn observer_disconnected(&self, id: u64) {
        self.shared.sync.on_observer_disconnected(id);
    }

    /// Runs a forwarded invocation as `from` and encodes the response.
    ///
    /// Malformed payloads get the generic error reply. Commands hidden from `from` answer as if
    /// they did not exist.
    pub async fn handle_invoke(&self, from: Player, payload: Value) -> Value {
        let messages = self.shared.dispatcher.messages();
        let response = match serde_json::from_value::<InvokeRequest>(payload) {
            Err(error) => {
                warn!(observer = from.id, %error, "malformed invoke payload");
                InvokeResponse {
                    reply: Some(failure(&messages.error)),
                }
            }
            Ok(request) => {
                let visible = self
                    .shared
                    .registry
                    .get_command(&request.path)
                    .is_some_and(|command| self.shared.sync.is_visible(&from, &command));
                if visible {
                    let context = self
                        .shared
                        .dispatcher
                        .execute(&request.path, request.args, Some(from))
                        .await;
                    InvokeResponse {
                        reply: context.into_reply(),
                    }
                } else {
                    InvokeResponse {
                        reply: Some(failure(&messages.not_found)),
                    }
                }
            }
        };
        serde_json::to_value(&response).unwrap_or_else(|error| {
            warn!(%error, "could not encode invoke response");
            Value::Null
        })
    }

    fn handlers(&self) -> ServerHandlers {
        let on_message = Rc::downgrade(&self.shared);
        let on_invoke = Rc::downgrade(&self.shared);
        let on_disconnect = Rc::downgrade(&self.shared);
        ServerHandlers {
            on_message: Rc::new(move |from: &Player, payload: Value| {
                if let Some(shared) = on_message.upgrade() {
                    shared.sync.handle_message(from, payload);
                }
            }),
            on_invoke: Rc::new(
                move |from: Player, payload: Value| -> NetworkFuture<'static, Value> {
                    let shared: Weak<ServerShared> = on_invoke.clone();
                    Box::pin(async move {
                        let Some(shared) = shared.upgrade() else {
                            return Value::Null;
                        };
                        ServerRuntime { shared }.handle_invoke(from, payload).await
                    })
                },
            ),
            on_disconnect: Rc::new(move |id: u64| {
                if let Some(shared) = on_disconnect.upgrade() {
                    shared.sync.on_observer_disconnected(id);
                }
            }),
        }
    }
}

struct ClientShared {
    registry: Registry,
    dispatcher: Dispatcher,
    sync: SyncClient,
    history: CommandHistory,
    config: FrameworkConfig,
}

/// Observer side: mirrors the authoritative catalog and forwards mirrored commands.
#[derive(Clone)]
pub struct ClientRuntime {
    shared: Rc<ClientShared>,
}

impl ClientRuntime {
    /// Builds the runtime and installs its handler on `network`. Does not request a sync.
    pub fn new(
        options: StartOptions,
        network: Rc<dyn ClientNetwork>,
    ) -> Result<Self, RuntimeError> {
        let registry = prepare_registry(&options)?;
        let history = CommandHistory::new(options.config.history_length);
        let dispatcher = Dispatcher::new(registry.clone(), options.config.messages.clone())
            .with_guards(options.guards.clone())
            .with_remote(network.clone(), options.config.invoke_timeout())
            .with_history(history.clone());
        let sync = SyncClient::new(registry.clone(), network.clone());
        let runtime = Self {
            shared: Rc::new(ClientShared {
                registry,
                dispatcher,
                sync,
                history,
                config: options.config,
            }),
        };

        let shared = Rc::downgrade(&runtime.shared);
        network.connect(Rc::new(move |payload: Value| {
            if let Some(shared) = shared.upgrade() {
                shared.sync.handle_message(payload);
            }
        }));
        Ok(runtime)
    }

    /// Requests the catalog and waits up to the configured sync timeout for it.
    pub async fn initial_sync(&self) -> Result<(), SyncError> {
        let timeout = self.shared.config.sync_timeout();
        self.shared.sync.wait_for_initial_sync(timeout).await
    }

    /// Local registry, holding local and mirrored commands.
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Dispatcher for typed lines.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// Sync protocol state.
    pub fn sync(&self) -> &SyncClient {
        &self.shared.sync
    }

    /// Executed lines, oldest first.
    pub fn history(&self) -> &CommandHistory {
        &self.shared.history
    }

    /// Handles a raw event from the authoritative side.
    pub fn handle_message(&self, payload: Value) {
        self.shared.sync.handle_message(payload);
    }

    /// Runs one typed line.
    pub async fn run_command(&self, line: &str, executor: Option<&Player>) -> CommandContext {
        self.shared.dispatcher.run_command(line, executor).await
    }
}

#[derive(Clone)]
enum ActiveRuntime {
    Server(ServerRuntime),
    Client(ClientRuntime),
}

impl ActiveRuntime {
    fn side(&self) -> &'static str {
        match self {
            ActiveRuntime::Server(_) => "server",
            ActiveRuntime::Client(_) => "client",
        }
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<ActiveRuntime>> = const { RefCell::new(None) };
}

fn active() -> Result<ActiveRuntime, RuntimeError> {
    ACTIVE.with(|slot| slot.borrow().clone().ok_or(RuntimeError::NotStarted))
}

fn claim(runtime: ActiveRuntime) -> Result<(), RuntimeError> {
    ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        *slot = Some(runtime);
        Ok(())
    })
}

fn ensure_vacant() -> Result<(), RuntimeError> {
    ACTIVE.with(|slot| {
        if slot.borrow().is_some() {
            Err(RuntimeError::AlreadyStarted)
        } else {
            Ok(())
        }
    })
}

/// Starts the authoritative side on this thread.
pub fn start_server(
    options: StartOptions,
    network: Rc<dyn ServerNetwork>,
) -> Result<ServerRuntime, RuntimeError> {
    ensure_vacant()?;
    logging::install(options.config.log_level);
    let runtime = ServerRuntime::new(options, network)?;
    claim(ActiveRuntime::Server(runtime.clone()))?;
    info!("command framework started as server");
    Ok(runtime)
}

/// Starts an observer on this thread and waits for its initial catalog.
///
/// The slot is released again when the initial sync fails.
pub async fn start_client(
    options: StartOptions,
    network: Rc<dyn ClientNetwork>,
) -> Result<ClientRuntime, RuntimeError> {
    ensure_vacant()?;
    logging::install(options.config.log_level);
    let runtime = ClientRuntime::new(options, network)?;
    claim(ActiveRuntime::Client(runtime.clone()))?;

    if let Err(error) = runtime.initial_sync().await {
        shutdown();
        return Err(error.into());
    }
    info!(
        commands = runtime.sync().synced_commands().len(),
        "command framework started as client"
    );
    Ok(runtime)
}

/// Whether a runtime is running on this thread.
pub fn is_started() -> bool {
    ACTIVE.with(|slot| slot.borrow().is_some())
}

/// Registry of the running side.
pub fn registry() -> Result<Registry, RuntimeError> {
    Ok(match active()? {
        ActiveRuntime::Server(runtime) => runtime.registry().clone(),
        ActiveRuntime::Client(runtime) => runtime.registry().clone(),
    })
}

/// Dispatcher of the running side.
pub fn dispatcher() -> Result<Dispatcher, RuntimeError> {
    Ok(match active()? {
        ActiveRuntime::Server(runtime) => runtime.dispatcher().clone(),
        ActiveRuntime::Client(runtime) => runtime.dispatcher().clone(),
    })
}

/// The running authoritative runtime.
pub fn server() -> Result<ServerRuntime, RuntimeError> {
    match active()? {
        ActiveRuntime::Server(runtime) => Ok(runtime),
        other => Err(RuntimeError::WrongSide {
            expected: "server",
            actual: other.side(),
        }),
    }
}

/// The running observer runtime.
pub fn client() -> Result<ClientRuntime, RuntimeError> {
    match active()? {
        ActiveRuntime::Client(runtime) => Ok(runtime),
        other => Err(RuntimeError::WrongSide {
            expected: "client",
            actual: other.side(),
        }),
    }
}

/// Releases this thread's slot. Returns whether a runtime was running.
pub fn shutdown() -> bool {
    ACTIVE.with(|slot| slot.borrow_mut().take().is_some())
}

//! Catalog replication from the authoritative registry to observers.
//!
//! The authoritative side answers a `BeginSync` request with a full snapshot and, from then on,
//! pushes a fresh snapshot to every enrolled observer after each registry change. Observers
//! reconcile their local registry against each snapshot; nothing is ever sent as a delta.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::{Rc, Weak},
    time::Duration,
};

use command_contract::{ClientMessage, CommandPath, GroupOptions, Player, ServerMessage, SyncData};
use futures::channel::oneshot;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    command::{Command, CommandBuilder},
    error::SyncError,
    network::{ClientNetwork, ServerNetwork},
    registry::{Registry, RegistrySubscription},
};

/// Per-observer command visibility predicate. Groups are always visible.
pub type Visibility = Rc<dyn Fn(&Player, &Command) -> bool>;

struct SyncServerInner {
    registry: Registry,
    network: Rc<dyn ServerNetwork>,
    visibility: Option<Visibility>,
    observers: RefCell<BTreeMap<u64, Player>>,
    subscription: RefCell<Option<RegistrySubscription>>,
}

/// Authoritative side of the sync protocol.
#[derive(Clone)]
pub struct SyncServer {
    inner: Rc<SyncServerInner>,
}

impl SyncServer {
    /// Starts broadcasting `registry` changes to enrolled observers over `network`.
    pub fn new(
        registry: Registry,
        network: Rc<dyn ServerNetwork>,
        visibility: Option<Visibility>,
    ) -> Self {
        let inner = Rc::new(SyncServerInner {
            registry: registry.clone(),
            network,
            visibility,
            observers: RefCell::new(BTreeMap::new()),
            subscription: RefCell::new(None),
        });
        let weak: Weak<SyncServerInner> = Rc::downgrade(&inner);
        let subscription = registry.subscribe(move |_, event| {
            if let Some(inner) = weak.upgrade() {
                debug!(?event, "registry changed; broadcasting snapshot");
                SyncServer { inner }.broadcast();
            }
        });
        *inner.subscription.borrow_mut() = Some(subscription);
        Self { inner }
    }

    /// Handles a raw event from `from`. Malformed payloads are logged and dropped.
    pub fn handle_message(&self, from: &Player, payload: Value) {
        match serde_json::from_value::<ServerMessage>(payload) {
            Ok(ServerMessage::BeginSync) => self.begin_sync(from),
            Err(error) => warn!(observer = from.id, %error, "malformed sync message"),
        }
    }

    /// Pushes the current snapshot to `observer` alone and enrolls it for future broadcasts.
    pub fn begin_sync(&self, observer: &Player) {
        info!(observer = observer.id, "observer requested command sync");
        self.push(observer);
        self.inner
            .observers
            .borrow_mut()
            .insert(observer.id, observer.clone());
    }

    /// Pushes a fresh snapshot to every enrolled observer.
    pub fn broadcast(&self) {
        for observer in self.observers() {
            self.push(&observer);
        }
    }

    /// Removes an observer from the broadcast set.
    pub fn on_observer_disconnected(&self, id: u64) {
        if self.inner.observers.borrow_mut().remove(&id).is_some() {
            debug!(observer = id, "observer left command sync");
        }
    }

    /// Enrolled observers, ordered by id.
    pub fn observers(&self) -> Vec<Player> {
        self.inner.observers.borrow().values().cloned().collect()
    }

    /// Whether `command` is visible to `observer`.
    pub fn is_visible(&self, observer: &Player, command: &Command) -> bool {
        self.inner
            .visibility
            .as_ref()
            .map_or(true, |visible| visible(observer, command))
    }

    /// Catalog as `observer` is allowed to see it.
    pub fn snapshot_for(&self, observer: &Player) -> SyncData {
        self.inner
            .registry
            .sync_data(|command| self.is_visible(observer, command))
    }

    fn push(&self, observer: &Player) {
        let message = ClientMessage::Snapshot {
            data: self.snapshot_for(observer),
        };
        match serde_json::to_value(&message) {
            Ok(payload) => self.inner.network.fire(observer, payload),
            Err(error) => warn!(observer = observer.id, %error, "could not encode snapshot"),
        }
    }
}

#[derive(Default)]
struct SyncClientState {
    commands: BTreeSet<CommandPath>,
    groups: BTreeSet<CommandPath>,
    snapshots: u64,
    initial: Option<oneshot::Sender<()>>,
}

struct SyncClientInner {
    registry: Registry,
    network: Rc<dyn ClientNetwork>,
    state: RefCell<SyncClientState>,
}

/// Observer side of the sync protocol.
///
/// Paths defined locally before a snapshot mentions them stay local: the snapshot entry is
/// skipped with a warning and never marked as synced.
#[derive(Clone)]
pub struct SyncClient {
    inner: Rc<SyncClientInner>,
}

impl SyncClient {
    /// Creates an observer reconciling into `registry`.
    pub fn new(registry: Registry, network: Rc<dyn ClientNetwork>) -> Self {
        Self {
            inner: Rc::new(SyncClientInner {
                registry,
                network,
                state: RefCell::new(SyncClientState::default()),
            }),
        }
    }

    /// Handles a raw event from the authoritative side. Malformed payloads are logged and dropped.
    pub fn handle_message(&self, payload: Value) {
        match serde_json::from_value::<ClientMessage>(payload) {
            Ok(ClientMessage::Snapshot { data }) => self.apply_snapshot(data),
            Err(error) => warn!(%error, "malformed sync message"),
        }
    }

    /// Asks the authoritative side for a snapshot and enrollment.
    pub fn request_sync(&self) {
        match serde_json::to_value(ServerMessage::BeginSync) {
            Ok(payload) => self.inner.network.fire(payload),
            Err(error) => warn!(%error, "could not encode sync request"),
        }
    }

    /// Requests a sync and waits for the first snapshot.
    ///
    /// Returns at once when a snapshot was already applied. Waiting needs a Tokio runtime for the
    /// deadline; without one this fails with [`SyncError::NoRuntime`] and sends nothing.
    pub async fn wait_for_initial_sync(&self, timeout: Duration) -> Result<(), SyncError> {
        if self.is_synced() {
            return Ok(());
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SyncError::NoRuntime);
        }
        let (sender, receiver) = oneshot::channel();
        self.inner.state.borrow_mut().initial = Some(sender);
        self.request_sync();

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(oneshot::Canceled)) => Err(SyncError::Cancelled),
            Err(_) => {
                self.inner.state.borrow_mut().initial = None;
                warn!(?timeout, "no command snapshot arrived in time");
                Err(SyncError::InitialSyncTimeout(timeout))
            }
        }
    }

    /// Whether at least one snapshot has been applied.
    pub fn is_synced(&self) -> bool {
        self.inner.state.borrow().snapshots > 0
    }

    /// Command paths currently sourced from snapshots.
    pub fn synced_commands(&self) -> Vec<CommandPath> {
        self.inner.state.borrow().commands.iter().cloned().collect()
    }

    /// Group paths currently sourced from snapshots.
    pub fn synced_groups(&self) -> Vec<CommandPath> {
        self.inner.state.borrow().groups.iter().cloned().collect()
    }

    /// Reconciles the local registry against a complete snapshot.
    ///
    /// Stale synced commands go first, then stale synced groups deepest first, then changed
    /// groups in place, new groups shallowest first, and finally commands. A stale group that
    /// still holds locally registered entries is kept and stops counting as synced. Entries that
    /// fail to register are logged and skipped; the rest of the snapshot still applies.
    pub fn apply_snapshot(&self, data: SyncData) {
        let registry = &self.inner.registry;
        let incoming_commands = data
            .commands
            .into_values()
            .map(|options| (options.path(), options))
            .collect::<BTreeMap<_, _>>();
        let incoming_groups = data
            .groups
            .into_values()
            .map(|options| (options.path(), options))
            .collect::<BTreeMap<_, _>>();

        let (stale_commands, mut stale_groups) = {
            let state = self.inner.state.borrow();
            let commands = state
                .commands
                .iter()
                .filter(|path| !incoming_commands.contains_key(*path))
                .cloned()
                .collect::<Vec<_>>();
            let groups = state
                .groups
                .iter()
                .filter(|path| !incoming_groups.contains_key(*path))
                .cloned()
                .collect::<Vec<_>>();
            (commands, groups)
        };

        for path in stale_commands {
            registry.unregister_command(&path);
            self.inner.state.borrow_mut().commands.remove(&path);
            debug!(path = %path, "retracted synced command");
        }

        stale_groups.sort_by(|left, right| right.len().cmp(&left.len()));
        for path in stale_groups {
            if self.has_local_descendants(&path) {
                warn!(path = %path, "retracted group still holds local entries; keeping it");
                self.inner.state.borrow_mut().groups.remove(&path);
                continue;
            }
            registry.unregister_group(&path);
            let mut state = self.inner.state.borrow_mut();
            state.groups.remove(&path);
            state.commands.retain(|command| !command.is_descendant_of(&path));
            debug!(path = %path, "retracted synced group");
        }

        let (known_groups, mut new_groups): (Vec<_>, Vec<_>) = incoming_groups
            .into_iter()
            .partition(|(path, _)| self.inner.state.borrow().groups.contains(path));
        for (path, options) in known_groups {
            if registry.update_group(options) {
                debug!(path = %path, "refreshed synced group");
            }
        }
        new_groups.sort_by_key(|(path, _)| path.len());
        for (path, options) in new_groups {
            self.add_group(path, options);
        }

        for (path, options) in incoming_commands {
            let synced = self.inner.state.borrow().commands.contains(&path);
            if synced {
                let unchanged = registry
                    .get_command(&path)
                    .is_some_and(|command| command.options() == &options);
                if unchanged {
                    continue;
                }
                registry.unregister_command(&path);
                self.inner.state.borrow_mut().commands.remove(&path);
            } else if registry.has_command(&path) {
                warn!(path = %path, "shared command; keeping the local definition");
                continue;
            }

            match registry.register(CommandBuilder::from_options(options).remote()) {
                Ok(_) => {
                    self.inner.state.borrow_mut().commands.insert(path);
                }
                Err(error) => warn!(path = %path, %error, "skipping synced command"),
            }
        }

        let initial = {
            let mut state = self.inner.state.borrow_mut();
            state.snapshots += 1;
            state.initial.take()
        };
        if let Some(initial) = initial {
            let _ = initial.send(());
        }
    }

    fn has_local_descendants(&self, group: &CommandPath) -> bool {
        let registry = &self.inner.registry;
        let state = self.inner.state.borrow();
        let local_command = registry.commands().iter().any(|command| {
            !state.commands.contains(command.path())
                && command
                    .options()
                    .all_paths()
                    .iter()
                    .any(|path| path.is_descendant_of(group))
        });
        local_command
            || registry
                .groups()
                .iter()
                .map(GroupOptions::path)
                .any(|path| path.is_descendant_of(group) && !state.groups.contains(&path))
    }

    fn add_group(&self, path: CommandPath, options: GroupOptions) {
        let registry = &self.inner.registry;
        if registry.has_group(&path) {
            debug!(path = %path, "group already defined locally");
            return;
        }
        match registry.register_group(options) {
            Ok(()) => {
                self.inner.state.borrow_mut().groups.insert(path);
            }
            Err(error) => warn!(path = %path, %error, "skipping synced group"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use command_contract::{ArgumentSpec, CommandOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        builtin_types::builtin_types,
        network::{LoopbackClient, LoopbackNetwork, NetworkFuture, ServerHandlers},
        roster::NoopRoster,
    };

    fn typed_registry() -> Registry {
        let registry = Registry::new();
        registry.register_types(builtin_types(Rc::new(NoopRoster)).expect("builtins"));
        registry
    }

    fn noop(name: &str) -> CommandBuilder {
        CommandBuilder::new(name).handler(|_, _| Ok(()))
    }

    fn serve(network: &LoopbackNetwork, sync: &SyncServer) {
        let on_message = sync.clone();
        let on_disconnect = sync.clone();
        network.connect(ServerHandlers {
            on_message: Rc::new(move |from: &Player, payload: Value| {
                on_message.handle_message(from, payload)
            }),
            on_invoke: Rc::new(|_: Player, _: Value| -> NetworkFuture<'static, Value> {
                Box::pin(async { json!({ "reply": null }) })
            }),
            on_disconnect: Rc::new(move |id: u64| on_disconnect.on_observer_disconnected(id)),
        });
    }

    fn observe(network: &LoopbackNetwork, player: Player) -> (Registry, SyncClient) {
        let registry = typed_registry();
        let endpoint: LoopbackClient = network.client(player);
        let client = SyncClient::new(registry.clone(), Rc::new(endpoint.clone()));
        let handler = client.clone();
        endpoint.connect(Rc::new(move |payload: Value| handler.handle_message(payload)));
        (registry, client)
    }

    fn server_catalog() -> Registry {
        let registry = typed_registry();
        registry
            .register_groups([
                GroupOptions::new("admin"),
                GroupOptions::new("bans").parent("admin"),
            ])
            .expect("groups");
        registry
            .register(
                noop("kick")
                    .group("admin")
                    .argument(ArgumentSpec::new("who", "string")),
            )
            .expect("kick");
        registry.register(noop("list").group("admin/bans")).expect("list");
        registry.register(noop("ping")).expect("ping");
        registry
    }

    fn paths(raw: &[&str]) -> Vec<CommandPath> {
        raw.iter().map(|path| CommandPath::new(path)).collect()
    }

    #[test]
    fn observer_converges_on_the_snapshot_and_follows_removals() {
        let network = LoopbackNetwork::new();
        let server_registry = server_catalog();
        let server = SyncServer::new(server_registry.clone(), Rc::new(network.clone()), None);
        serve(&network, &server);
        let (registry, client) = observe(&network, Player::new(1, "ada"));

        client.request_sync();
        network.pump();

        assert!(client.is_synced());
        assert_eq!(
            client.synced_commands(),
            paths(&["admin/bans/list", "admin/kick", "ping"])
        );
        assert_eq!(client.synced_groups(), paths(&["admin", "admin/bans"]));
        let kick = registry
            .get_command(&CommandPath::new("admin/kick"))
            .expect("mirrored");
        assert!(kick.is_remote());

        server_registry.unregister_command(&CommandPath::new("ping"));
        server_registry.unregister_group(&CommandPath::new("admin/bans"));
        network.pump();

        assert_eq!(client.synced_commands(), paths(&["admin/kick"]));
        assert_eq!(client.synced_groups(), paths(&["admin"]));
        assert!(!registry.has_command(&CommandPath::new("ping")));
        assert!(!registry.has_group(&CommandPath::new("admin/bans")));
    }

    #[test]
    fn every_observer_receives_later_registrations() {
        let network = LoopbackNetwork::new();
        let server_registry = server_catalog();
        let server = SyncServer::new(server_registry.clone(), Rc::new(network.clone()), None);
        serve(&network, &server);
        let (first, first_client) = observe(&network, Player::new(1, "ada"));
        let (second, second_client) = observe(&network, Player::new(2, "bo"));
        first_client.request_sync();
        second_client.request_sync();
        network.pump();

        server_registry.register(noop("pong")).expect("pong");
        assert_eq!(network.drop_pending(), 2);
        server_registry.register(noop("zap")).expect("zap");
        network.pump();

        for registry in [&first, &second] {
            assert!(registry.has_command(&CommandPath::new("pong")));
            assert!(registry.has_command(&CommandPath::new("zap")));
        }

        network.disconnect(2);
        assert_eq!(server.observers(), vec![Player::new(1, "ada")]);
    }

    #[test]
    fn local_definitions_win_over_synced_ones() {
        let network = LoopbackNetwork::new();
        let server = SyncServer::new(server_catalog(), Rc::new(network.clone()), None);
        serve(&network, &server);
        let (registry, client) = observe(&network, Player::new(1, "ada"));
        registry.register(noop("ping")).expect("local ping");
        registry.register_group(GroupOptions::new("admin")).expect("local group");

        client.request_sync();
        network.pump();

        assert!(!registry
            .get_command(&CommandPath::new("ping"))
            .expect("ping")
            .is_remote());
        assert!(!client.synced_commands().contains(&CommandPath::new("ping")));
        assert!(!client.synced_groups().contains(&CommandPath::new("admin")));
        assert!(registry.has_command(&CommandPath::new("admin/kick")));
    }

    #[test]
    fn visibility_filters_commands_per_observer() {
        let network = LoopbackNetwork::new();
        let visibility: Visibility = Rc::new(|observer: &Player, command: &Command| {
            observer.id == 1 || command.path().part(0) != Some("admin")
        });
        let server = SyncServer::new(
            server_catalog(),
            Rc::new(network.clone()),
            Some(visibility),
        );
        serve(&network, &server);
        let (_, admin) = observe(&network, Player::new(1, "ada"));
        let (_, guest) = observe(&network, Player::new(2, "bo"));
        admin.request_sync();
        guest.request_sync();
        network.pump();

        assert_eq!(admin.synced_commands().len(), 3);
        assert_eq!(guest.synced_commands(), paths(&["ping"]));
        assert_eq!(guest.synced_groups(), paths(&["admin", "admin/bans"]));
    }

    #[test]
    fn unresolvable_types_and_changed_options_are_reconciled() {
        let network = LoopbackNetwork::new();
        let registry = Registry::new();
        let endpoint = network.client(Player::new(1, "a"));
        let client = SyncClient::new(registry.clone(), Rc::new(endpoint));
        let mut data = SyncData::default();
        data.commands.insert(
            "odd".to_string(),
            CommandOptions {
                name: "odd".to_string(),
                arguments: vec![ArgumentSpec::new("v", "vector")],
                ..CommandOptions::default()
            },
        );
        data.commands.insert(
            "ping".to_string(),
            CommandOptions {
                name: "ping".to_string(),
                ..CommandOptions::default()
            },
        );
        client.apply_snapshot(data.clone());
        assert_eq!(client.synced_commands(), paths(&["ping"]));

        data.commands.get_mut("ping").expect("ping").description = "pong back".to_string();
        client.apply_snapshot(data);
        let ping = registry
            .get_command(&CommandPath::new("ping"))
            .expect("ping");
        assert_eq!(ping.options().description, "pong back");
    }

    #[test]
    fn retracted_group_keeps_local_commands_registered_under_it() {
        let network = LoopbackNetwork::new();
        let registry = typed_registry();
        let endpoint = network.client(Player::new(1, "a"));
        let client = SyncClient::new(registry.clone(), Rc::new(endpoint));
        let mut data = SyncData::default();
        data.groups.insert("admin".to_string(), GroupOptions::new("admin"));
        data.groups.insert(
            "admin/bans".to_string(),
            GroupOptions::new("bans").parent("admin"),
        );
        client.apply_snapshot(data);
        registry.register(noop("fps").group("admin")).expect("local command");

        client.apply_snapshot(SyncData::default());

        assert!(registry.has_command(&CommandPath::new("admin/fps")));
        assert!(registry.has_group(&CommandPath::new("admin")));
        assert!(!registry.has_group(&CommandPath::new("admin/bans")));
        assert!(client.synced_groups().is_empty());
    }

    #[test]
    fn changed_group_options_are_applied_in_place() {
        let network = LoopbackNetwork::new();
        let registry = typed_registry();
        let endpoint = network.client(Player::new(1, "a"));
        let client = SyncClient::new(registry.clone(), Rc::new(endpoint));
        let mut data = SyncData::default();
        data.groups.insert("admin".to_string(), GroupOptions::new("admin"));
        data.commands.insert(
            "admin/kick".to_string(),
            CommandOptions {
                name: "kick".to_string(),
                group: Some(CommandPath::new("admin")),
                ..CommandOptions::default()
            },
        );
        client.apply_snapshot(data.clone());

        data.groups.insert(
            "admin".to_string(),
            GroupOptions::new("admin").description("moderation tools"),
        );
        client.apply_snapshot(data);

        let admin = registry
            .get_group(&CommandPath::new("admin"))
            .expect("group");
        assert_eq!(admin.options().description, "moderation tools");
        assert!(registry.has_command(&CommandPath::new("admin/kick")));
        assert_eq!(client.synced_groups(), paths(&["admin"]));
    }

    #[test]
    fn initial_sync_outside_tokio_fails_without_panicking() {
        let network = LoopbackNetwork::new();
        let endpoint = network.client(Player::new(1, "a"));
        let client = SyncClient::new(Registry::new(), Rc::new(endpoint));
        assert_eq!(
            futures::executor::block_on(client.wait_for_initial_sync(Duration::from_secs(1))),
            Err(SyncError::NoRuntime)
        );
    }

    #[test]
    fn malformed_messages_are_ignored() {
        let network = LoopbackNetwork::new();
        let endpoint = network.client(Player::new(1, "a"));
        let client = SyncClient::new(Registry::new(), Rc::new(endpoint));
        client.handle_message(json!({ "kind": "snapshot", "data": 7 }));
        assert!(!client.is_synced());
    }

    #[tokio::test]
    async fn initial_sync_resolves_on_first_snapshot() {
        let network = LoopbackNetwork::new();
        let server = SyncServer::new(server_catalog(), Rc::new(network.clone()), None);
        serve(&network, &server);
        let (_, client) = observe(&network, Player::new(1, "ada"));

        let pumped = Cell::new(0);
        let pump = async {
            tokio::task::yield_now().await;
            pumped.set(network.pump());
        };
        let (result, ()) = tokio::join!(client.wait_for_initial_sync(Duration::from_secs(5)), pump);
        assert_eq!(result, Ok(()));
        assert_eq!(pumped.get(), 2);
        assert_eq!(client.wait_for_initial_sync(Duration::ZERO).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_sync_times_out_without_a_snapshot() {
        let network = LoopbackNetwork::new();
        let (_, client) = observe(&network, Player::new(1, "ada"));
        let timeout = Duration::from_secs(10);
        assert_eq!(
            client.wait_for_initial_sync(timeout).await,
            Err(SyncError::InitialSyncTimeout(timeout))
        );
    }
}

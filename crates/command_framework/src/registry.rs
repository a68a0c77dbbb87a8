//! Authoritative command and group catalog with a child-path index and change events.
//!
//! The registry owns every command (keyed by its primary and alias paths), every group, the
//! argument type table, and a prefix index mapping each registered path prefix to its immediate
//! children. Handles are cheap clones over shared single-threaded state.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap, HashSet},
    rc::{Rc, Weak},
};

use command_contract::{CommandPath, GroupOptions, SyncData};
use tracing::{debug, warn};

use crate::{
    command::{validate_name, Command, CommandBuilder},
    error::RegistryError,
    group::Group,
    types::{Type, TypeRegistry},
};

/// Child-index key holding every depth-1 path.
const ROOT_KEY: &str = "";

/// Kind of entry a path is being validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A command or one of its aliases.
    Command,
    /// A group.
    Group,
}

/// Catalog change, emitted once the registry is consistent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A command was registered under its primary path.
    CommandAdded(CommandPath),
    /// A command was unregistered.
    CommandRemoved(CommandPath),
    /// A group was registered.
    GroupAdded(CommandPath),
    /// A registered group's options changed in place.
    GroupUpdated(CommandPath),
    /// A group was unregistered.
    GroupRemoved(CommandPath),
}

/// Callback receiving registry events.
pub type RegistryListener = Rc<dyn Fn(&Registry, &RegistryEvent)>;

/// A set of groups and commands registered together under a stable source id.
///
/// Registering the same module id twice is a no-op.
pub trait CommandModule {
    /// Stable source id.
    fn id(&self) -> &str;

    /// Groups the module's commands live in.
    fn groups(&self) -> Vec<GroupOptions> {
        Vec::new()
    }

    /// Commands to register.
    fn commands(&self) -> Vec<CommandBuilder>;
}

#[derive(Default)]
struct RegistryState {
    commands: HashMap<CommandPath, Rc<Command>>,
    groups: HashMap<CommandPath, Group>,
    types: TypeRegistry,
    children: HashMap<String, Vec<CommandPath>>,
    modules: HashSet<String>,
    next_listener: u64,
    listeners: BTreeMap<u64, RegistryListener>,
}

impl RegistryState {
    fn occupied(&self, path: &CommandPath) -> bool {
        self.commands.contains_key(path)
            || self.groups.contains_key(path)
            || self
                .children
                .get(path.as_str())
                .is_some_and(|children| !children.is_empty())
    }

    fn cache_path(&mut self, path: &CommandPath) {
        for depth in 0..path.len() {
            let key = index_key(&path.slice(0, depth));
            let child = path.slice(0, depth + 1);
            let siblings = self.children.entry(key).or_default();
            if siblings.contains(&child) {
                continue;
            }
            let tail = child.tail().unwrap_or_default();
            let at = siblings.partition_point(|sibling| sibling.tail().unwrap_or_default() < tail);
            siblings.insert(at, child);
        }
    }

    fn uncache_path(&mut self, path: &CommandPath) {
        for depth in (1..=path.len()).rev() {
            let child = path.slice(0, depth);
            if self.occupied(&child) {
                break;
            }
            self.children.remove(child.as_str());
            let key = index_key(&child.parent_or_root());
            if let Some(siblings) = self.children.get_mut(&key) {
                siblings.retain(|sibling| sibling != &child);
            }
        }
    }

    fn validate_path(&self, path: &CommandPath, kind: EntryKind) -> Result<(), RegistryError> {
        let path = path.clone();
        match (kind, self.commands.contains_key(&path), self.groups.contains_key(&path)) {
            (EntryKind::Command, true, _) => Err(RegistryError::DuplicateCommand(path)),
            (EntryKind::Command, _, true) => Err(RegistryError::CommandConflictsWithGroup(path)),
            (EntryKind::Group, true, _) => Err(RegistryError::GroupConflictsWithCommand(path)),
            (EntryKind::Group, _, true) => Err(RegistryError::DuplicateGroup(path)),
            _ => Ok(()),
        }
    }
}

fn index_key(prefix: &CommandPath) -> String {
    if prefix.is_root() {
        ROOT_KEY.to_string()
    } else {
        prefix.as_str().to_string()
    }
}

/// Shared command registry.
#[derive(Clone, Default)]
pub struct Registry {
    state: Rc<RefCell<RegistryState>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an argument type.
    pub fn register_type(&self, ty: Type) {
        debug!(name = ty.name(), "registered argument type");
        self.state.borrow_mut().types.register_type(ty);
    }

    /// Inserts or replaces several argument types.
    pub fn register_types(&self, types: impl IntoIterator<Item = Type>) {
        for ty in types {
            self.register_type(ty);
        }
    }

    /// Looks up an argument type by name.
    pub fn get_type(&self, name: &str) -> Option<Type> {
        self.state.borrow().types.get_type(name).cloned()
    }

    /// Snapshot of the type table.
    pub fn type_registry(&self) -> TypeRegistry {
        self.state.borrow().types.clone()
    }

    /// Checks that `path` is free for an entry of `kind`.
    pub fn validate_path(&self, path: &CommandPath, kind: EntryKind) -> Result<(), RegistryError> {
        self.state.borrow().validate_path(path, kind)
    }

    /// Registers a single group.
    pub fn register_group(&self, options: GroupOptions) -> Result<(), RegistryError> {
        self.register_groups([options])
    }

    /// Registers a batch of groups, shallowest first so parents precede children.
    ///
    /// The whole batch is validated before anything is inserted. A group whose parent is neither
    /// registered nor earlier in the batch fails the batch, as does a path held by a command.
    /// Groups that already exist are skipped with a warning.
    pub fn register_groups(
        &self,
        batch: impl IntoIterator<Item = GroupOptions>,
    ) -> Result<(), RegistryError> {
        let accepted = self.plan_groups(batch)?;
        self.insert_groups(accepted);
        Ok(())
    }

    fn plan_groups(
        &self,
        batch: impl IntoIterator<Item = GroupOptions>,
    ) -> Result<Vec<(CommandPath, GroupOptions)>, RegistryError> {
        let mut batch = batch.into_iter().collect::<Vec<_>>();
        batch.sort_by_key(|options| options.path().len());

        let state = self.state.borrow();
        let mut pending = HashSet::new();
        let mut accepted = Vec::with_capacity(batch.len());
        for options in batch {
            validate_name(&options.name)?;
            let path = options.path();
            if state.groups.contains_key(&path) || pending.contains(&path) {
                warn!(path = %path, "group already registered; skipping");
                continue;
            }
            state.validate_path(&path, EntryKind::Group)?;
            if let Some(parent) = path.parent() {
                if !state.groups.contains_key(&parent) && !pending.contains(&parent) {
                    return Err(RegistryError::MissingParentGroup { path, parent });
                }
            }
            pending.insert(path.clone());
            accepted.push((path, options));
        }
        Ok(accepted)
    }

    fn insert_groups(&self, accepted: Vec<(CommandPath, GroupOptions)>) {
        for (path, options) in accepted {
            {
                let mut state = self.state.borrow_mut();
                if let Some(parent) = path.parent() {
                    if let Some(group) = state.groups.get_mut(&parent) {
                        if let Err(error) = group.add_group(&path) {
                            warn!(path = %path, %error, "could not link group into its parent");
                        }
                    }
                }
                state.groups.insert(path.clone(), Group::new(options));
                state.cache_path(&path);
            }
            debug!(path = %path, "registered group");
            self.emit(RegistryEvent::GroupAdded(path));
        }
    }

    /// Replaces the options of the group registered at `options.path()`, keeping its children.
    ///
    /// Returns whether the group exists and its options changed.
    pub fn update_group(&self, options: GroupOptions) -> bool {
        let path = options.path();
        let changed = self
            .state
            .borrow_mut()
            .groups
            .get_mut(&path)
            .is_some_and(|group| group.replace_options(options));
        if changed {
            debug!(path = %path, "updated group");
            self.emit(RegistryEvent::GroupUpdated(path));
        }
        changed
    }

    /// Builds `builder` against the registered types and registers the result.
    pub fn register(&self, builder: CommandBuilder) -> Result<Rc<Command>, RegistryError> {
        let command = builder.build(&self.state.borrow().types)?;
        self.register_command(command)
    }

    /// Registers a built command under its primary path and every alias path.
    ///
    /// Fails when any of those paths is held by a command or group, or when the owning group is
    /// not registered.
    pub fn register_command(&self, command: Command) -> Result<Rc<Command>, RegistryError> {
        let paths = command.options().all_paths();
        let primary = command.path().clone();
        {
            let state = self.state.borrow();
            if let Some(group) = &command.options().group {
                if !group.is_root() && !state.groups.contains_key(group) {
                    return Err(RegistryError::MissingParentGroup {
                        path: primary,
                        parent: group.clone(),
                    });
                }
            }
            for path in &paths {
                state.validate_path(path, EntryKind::Command)?;
            }
        }

        let command = Rc::new(command);
        {
            let mut state = self.state.borrow_mut();
            for path in &paths {
                if let Some(group) = path.parent().and_then(|parent| state.groups.get_mut(&parent)) {
                    if let Err(error) = group.add_command(path, command.clone()) {
                        warn!(path = %path, %error, "could not link command into its group");
                    }
                }
                state.commands.insert(path.clone(), command.clone());
                state.cache_path(path);
            }
        }
        debug!(path = %primary, aliases = paths.len() - 1, "registered command");
        self.emit(RegistryEvent::CommandAdded(primary));
        Ok(command)
    }

    /// Registers every group and command of `module` unless its id was registered before.
    ///
    /// The module is validated as a whole first, so a failure leaves the registry untouched and
    /// a corrected module can be registered later. Returns whether anything was registered.
    pub fn register_module(&self, module: &dyn CommandModule) -> Result<bool, RegistryError> {
        if self.state.borrow().modules.contains(module.id()) {
            debug!(module = module.id(), "module already registered");
            return Ok(false);
        }
        let groups = self.plan_groups(module.groups())?;
        let commands = {
            let state = self.state.borrow();
            let planned = groups.iter().map(|(path, _)| path).collect::<HashSet<_>>();
            let mut claimed = HashSet::new();
            let mut commands = Vec::new();
            for builder in module.commands() {
                let command = builder.build(&state.types)?;
                if let Some(group) = &command.options().group {
                    if !group.is_root()
                        && !state.groups.contains_key(group)
                        && !planned.contains(group)
                    {
                        return Err(RegistryError::MissingParentGroup {
                            path: command.path().clone(),
                            parent: group.clone(),
                        });
                    }
                }
                for path in command.options().all_paths() {
                    state.validate_path(&path, EntryKind::Command)?;
                    if planned.contains(&path) {
                        return Err(RegistryError::CommandConflictsWithGroup(path));
                    }
                    if !claimed.insert(path.clone()) {
                        return Err(RegistryError::DuplicateCommand(path));
                    }
                }
                commands.push(command);
            }
            commands
        };

        self.insert_groups(groups);
        for command in commands {
            self.register_command(command)?;
        }
        self.state.borrow_mut().modules.insert(module.id().to_string());
        Ok(true)
    }

    /// Unregisters the command at `path` (primary or alias), along with all of its paths.
    pub fn unregister_command(&self, path: &CommandPath) -> Option<Rc<Command>> {
        let command = self.state.borrow().commands.get(path).cloned()?;
        {
            let mut state = self.state.borrow_mut();
            for alias in command.options().all_paths() {
                let owned = state
                    .commands
                    .get(&alias)
                    .is_some_and(|registered| Rc::ptr_eq(registered, &command));
                if !owned {
                    continue;
                }
                state.commands.remove(&alias);
                if let Some(group) = alias.parent().and_then(|parent| state.groups.get_mut(&parent)) {
                    group.remove_command(alias.tail().unwrap_or_default());
                }
                state.uncache_path(&alias);
            }
        }
        debug!(path = %command.path(), "unregistered command");
        self.emit(RegistryEvent::CommandRemoved(command.path().clone()));
        Some(command)
    }

    /// Unregisters the group at `path` together with every command and group below it.
    pub fn unregister_group(&self, path: &CommandPath) -> bool {
        let (commands, mut groups) = {
            let state = self.state.borrow();
            if !state.groups.contains_key(path) {
                return false;
            }
            let mut commands = state
                .commands
                .values()
                .filter(|command| command.path().is_descendant_of(path))
                .map(|command| command.path().clone())
                .collect::<Vec<_>>();
            commands.sort();
            commands.dedup();
            let groups = state
                .groups
                .keys()
                .filter(|group| *group == path || group.is_descendant_of(path))
                .cloned()
                .collect::<Vec<_>>();
            (commands, groups)
        };

        for command in &commands {
            self.unregister_command(command);
        }

        groups.sort_by(|left, right| right.len().cmp(&left.len()).then_with(|| left.cmp(right)));
        for group in groups {
            {
                let mut state = self.state.borrow_mut();
                state.groups.remove(&group);
                if let Some(parent) = group.parent().and_then(|parent| state.groups.get_mut(&parent)) {
                    parent.remove_group(group.tail().unwrap_or_default());
                }
                state.uncache_path(&group);
            }
            debug!(path = %group, "unregistered group");
            self.emit(RegistryEvent::GroupRemoved(group));
        }
        true
    }

    /// Command registered at `path`, primary or alias.
    pub fn get_command(&self, path: &CommandPath) -> Option<Rc<Command>> {
        self.state.borrow().commands.get(path).cloned()
    }

    /// Group registered at `path`.
    pub fn get_group(&self, path: &CommandPath) -> Option<Group> {
        self.state.borrow().groups.get(path).cloned()
    }

    /// Whether a command (or alias) is registered at `path`.
    pub fn has_command(&self, path: &CommandPath) -> bool {
        self.state.borrow().commands.contains_key(path)
    }

    /// Whether a group is registered at `path`.
    pub fn has_group(&self, path: &CommandPath) -> bool {
        self.state.borrow().groups.contains_key(path)
    }

    /// Every registered command once, ordered by primary path.
    pub fn commands(&self) -> Vec<Rc<Command>> {
        let state = self.state.borrow();
        let mut commands = state
            .commands
            .iter()
            .filter(|(path, command)| *path == command.path())
            .map(|(_, command)| command.clone())
            .collect::<Vec<_>>();
        commands.sort_by(|left, right| left.path().cmp(right.path()));
        commands
    }

    /// Every registered group's options, ordered by path.
    pub fn groups(&self) -> Vec<GroupOptions> {
        let state = self.state.borrow();
        let mut groups = state.groups.values().collect::<Vec<_>>();
        groups.sort_by(|left, right| left.path().cmp(right.path()));
        groups.into_iter().map(|group| group.options().clone()).collect()
    }

    /// Immediate children of `prefix` (the root for depth-1 paths), ordered by last segment.
    pub fn children(&self, prefix: &CommandPath) -> Vec<CommandPath> {
        self.state
            .borrow()
            .children
            .get(&index_key(prefix))
            .cloned()
            .unwrap_or_default()
    }

    /// Finds the command addressed by the leading `tokens`, descending through groups.
    ///
    /// Returns the command and how many tokens its path consumed.
    pub fn resolve(&self, tokens: &[String]) -> Option<(Rc<Command>, usize)> {
        let state = self.state.borrow();
        let mut path = CommandPath::root();
        for (index, token) in tokens.iter().enumerate() {
            path = path.child(token);
            if let Some(command) = state.commands.get(&path) {
                return Some((command.clone(), index + 1));
            }
            if !state.groups.contains_key(&path) {
                break;
            }
        }
        None
    }

    /// Catalog snapshot: commands accepted by `filter` keyed by primary path, and every group.
    pub fn sync_data(&self, filter: impl Fn(&Command) -> bool) -> SyncData {
        let commands = self
            .commands()
            .into_iter()
            .filter(|command| filter(command))
            .map(|command| (command.path().to_string(), command.options().clone()))
            .collect();
        let groups = self
            .groups()
            .into_iter()
            .map(|options| (options.path().to_string(), options))
            .collect();
        SyncData { commands, groups }
    }

    /// Subscribes to catalog changes until the returned handle is dropped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Registry, &RegistryEvent) + 'static,
    ) -> RegistrySubscription {
        let mut state = self.state.borrow_mut();
        state.next_listener = state.next_listener.saturating_add(1);
        let id = state.next_listener;
        state.listeners.insert(id, Rc::new(listener));
        RegistrySubscription {
            state: Rc::downgrade(&self.state),
            id,
            active: Cell::new(true),
        }
    }

    fn emit(&self, event: RegistryEvent) {
        let listeners = self
            .state
            .borrow()
            .listeners
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(self, &event);
        }
    }
}

/// Drop-based event subscription handle.
pub struct RegistrySubscription {
    state: Weak<RefCell<RegistryState>>,
    id: u64,
    active: Cell<bool>,
}

impl RegistrySubscription {
    /// Stops delivery if still subscribed.
    pub fn unsubscribe(&self) {
        if self.active.replace(false) {
            if let Some(state) = self.state.upgrade() {
                state.borrow_mut().listeners.remove(&self.id);
            }
        }
    }
}

impl Drop for RegistrySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use command_contract::{ArgumentSpec, CommandOptions};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{builtin_types::builtin_types, roster::NoopRoster};

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register_types(builtin_types(Rc::new(NoopRoster)).expect("builtins"));
        registry
    }

    fn noop(name: &str) -> CommandBuilder {
        CommandBuilder::new(name).handler(|_, _| Ok(()))
    }

    fn paths(raw: &[&str]) -> Vec<CommandPath> {
        raw.iter().map(|path| CommandPath::new(path)).collect()
    }

    #[test]
    fn duplicate_command_path_fails_on_second_registration() {
        let registry = registry();
        registry.register(noop("ping")).expect("first");
        assert_eq!(
            registry.register(noop("ping")).map(|_| ()),
            Err(RegistryError::DuplicateCommand(CommandPath::new("ping")))
        );
    }

    #[test]
    fn commands_and_groups_never_share_a_path() {
        let registry = registry();
        registry.register(noop("ban")).expect("command");
        assert_eq!(
            registry.register_group(GroupOptions::new("ban")),
            Err(RegistryError::GroupConflictsWithCommand(CommandPath::new("ban")))
        );

        registry.register_group(GroupOptions::new("admin")).expect("group");
        assert_eq!(
            registry.register(noop("admin")).map(|_| ()),
            Err(RegistryError::CommandConflictsWithGroup(CommandPath::new("admin")))
        );
        assert_eq!(
            registry.validate_path(&CommandPath::new("admin"), EntryKind::Group),
            Err(RegistryError::DuplicateGroup(CommandPath::new("admin")))
        );
    }

    #[test]
    fn aliases_collide_like_primary_paths() {
        let registry = registry();
        registry.register(noop("teleport").alias("tp")).expect("first");
        assert_eq!(
            registry.register(noop("tp")).map(|_| ()),
            Err(RegistryError::DuplicateCommand(CommandPath::new("tp")))
        );
        let by_alias = registry.get_command(&CommandPath::new("tp")).expect("alias");
        assert_eq!(by_alias.path(), &CommandPath::new("teleport"));
        assert_eq!(registry.commands().len(), 1);
    }

    #[test]
    fn group_batches_are_sorted_and_checked_for_parents() {
        let registry = registry();
        registry
            .register_groups([
                GroupOptions::new("bans").parent("admin"),
                GroupOptions::new("admin"),
                GroupOptions::new("admin").description("repeat"),
            ])
            .expect("batch");
        assert!(registry.has_group(&CommandPath::new("admin/bans")));
        assert_eq!(
            registry
                .get_group(&CommandPath::new("admin"))
                .and_then(|group| group.get_group("bans").cloned()),
            Some(CommandPath::new("admin/bans"))
        );

        assert_eq!(
            registry.register_group(GroupOptions::new("x").parent("missing")),
            Err(RegistryError::MissingParentGroup {
                path: CommandPath::new("missing/x"),
                parent: CommandPath::new("missing"),
            })
        );
        assert_eq!(
            registry.register(noop("kick").group("nowhere")).map(|_| ()),
            Err(RegistryError::MissingParentGroup {
                path: CommandPath::new("nowhere/kick"),
                parent: CommandPath::new("nowhere"),
            })
        );
    }

    #[test]
    fn child_index_is_sorted_by_tail_without_duplicates() {
        let registry = registry();
        registry.register_group(GroupOptions::new("admin")).expect("group");
        for name in ["warn", "ban", "kick"] {
            registry.register(noop(name).group("admin")).expect("command");
        }
        registry.register(noop("zap")).expect("root command");
        registry.register(noop("about").alias("info")).expect("root command");

        assert_eq!(
            registry.children(&CommandPath::root()),
            paths(&["about", "admin", "info", "zap"])
        );
        assert_eq!(
            registry.children(&CommandPath::new("admin")),
            paths(&["admin/ban", "admin/kick", "admin/warn"])
        );
        assert!(registry.children(&CommandPath::new("zap")).is_empty());
    }

    #[test]
    fn unregistering_a_group_removes_its_subtree_and_index_entries() {
        let registry = registry();
        registry
            .register_groups([
                GroupOptions::new("admin"),
                GroupOptions::new("bans").parent("admin"),
            ])
            .expect("groups");
        registry
            .register(noop("list").group("admin/bans").alias("ls"))
            .expect("command");
        registry.register(noop("kick").group("admin")).expect("command");

        assert!(registry.unregister_group(&CommandPath::new("admin")));
        assert!(registry.commands().is_empty());
        assert!(registry.groups().is_empty());
        assert!(registry.children(&CommandPath::root()).is_empty());
        assert!(registry.children(&CommandPath::new("admin")).is_empty());
        assert!(!registry.unregister_group(&CommandPath::new("admin")));
    }

    #[test]
    fn updating_a_group_keeps_its_children() {
        let registry = registry();
        registry.register_group(GroupOptions::new("admin")).expect("group");
        registry.register(noop("kick").group("admin")).expect("command");

        assert!(registry.update_group(GroupOptions::new("admin").description("staff only")));
        assert!(!registry.update_group(GroupOptions::new("admin").description("staff only")));
        assert!(!registry.update_group(GroupOptions::new("ghost")));

        let admin = registry.get_group(&CommandPath::new("admin")).expect("group");
        assert_eq!(admin.options().description, "staff only");
        assert!(admin.get_command("kick").is_some());
        assert!(registry.has_command(&CommandPath::new("admin/kick")));
    }

    #[test]
    fn unregistering_a_command_through_an_alias_drops_every_path() {
        let registry = registry();
        registry.register(noop("teleport").alias("tp")).expect("command");
        let removed = registry
            .unregister_command(&CommandPath::new("tp"))
            .expect("removed");
        assert_eq!(removed.path(), &CommandPath::new("teleport"));
        assert!(!registry.has_command(&CommandPath::new("teleport")));
        assert!(registry.children(&CommandPath::root()).is_empty());
        registry.register(noop("tp")).expect("path is free again");
    }

    #[test]
    fn resolve_descends_through_groups() {
        let registry = registry();
        registry.register_group(GroupOptions::new("mail")).expect("group");
        registry.register(noop("send").group("mail")).expect("command");

        let tokens = ["mail", "send", "bob"].map(String::from);
        let (command, consumed) = registry.resolve(&tokens).expect("resolved");
        assert_eq!(command.path(), &CommandPath::new("mail/send"));
        assert_eq!(consumed, 2);
        assert!(registry.resolve(&["mail".to_string()]).is_none());

        let (command, consumed) = registry
            .resolve(&["mail/send".to_string(), "bob".to_string()])
            .expect("slashed token");
        assert_eq!(command.path(), &CommandPath::new("mail/send"));
        assert_eq!(consumed, 1);
        assert!(registry.resolve(&["post".to_string()]).is_none());
    }

    #[test]
    fn events_fire_after_state_is_consistent() {
        let registry = registry();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = registry.subscribe(move |registry, event| {
            let consistent = match event {
                RegistryEvent::CommandAdded(path) => registry.has_command(path),
                RegistryEvent::GroupAdded(path) | RegistryEvent::GroupUpdated(path) => {
                    registry.has_group(path)
                }
                RegistryEvent::CommandRemoved(path) => !registry.has_command(path),
                RegistryEvent::GroupRemoved(path) => !registry.has_group(path),
            };
            sink.borrow_mut().push((event.clone(), consistent));
        });

        registry.register_group(GroupOptions::new("admin")).expect("group");
        registry.register(noop("kick").group("admin")).expect("command");
        registry.unregister_group(&CommandPath::new("admin"));
        drop(subscription);
        registry.register(noop("late")).expect("command");

        assert_eq!(
            *seen.borrow(),
            vec![
                (RegistryEvent::GroupAdded(CommandPath::new("admin")), true),
                (RegistryEvent::CommandAdded(CommandPath::new("admin/kick")), true),
                (RegistryEvent::CommandRemoved(CommandPath::new("admin/kick")), true),
                (RegistryEvent::GroupRemoved(CommandPath::new("admin")), true),
            ]
        );
    }

    struct Moderation;

    impl CommandModule for Moderation {
        fn id(&self) -> &str {
            "moderation"
        }

        fn groups(&self) -> Vec<GroupOptions> {
            vec![GroupOptions::new("mod")]
        }

        fn commands(&self) -> Vec<CommandBuilder> {
            vec![noop("mute")
                .group("mod")
                .argument(ArgumentSpec::new("minutes", "integer"))]
        }
    }

    #[test]
    fn modules_register_once_per_id() {
        let registry = registry();
        assert_eq!(registry.register_module(&Moderation), Ok(true));
        assert_eq!(registry.register_module(&Moderation), Ok(false));
        assert!(registry.has_command(&CommandPath::new("mod/mute")));
    }

    struct Clashing {
        commands: Vec<&'static str>,
    }

    impl CommandModule for Clashing {
        fn id(&self) -> &str {
            "clashing"
        }

        fn groups(&self) -> Vec<GroupOptions> {
            vec![GroupOptions::new("tools")]
        }

        fn commands(&self) -> Vec<CommandBuilder> {
            self.commands
                .iter()
                .map(|name| noop(name).group("tools"))
                .collect()
        }
    }

    #[test]
    fn failed_module_leaves_nothing_behind_and_can_be_retried() {
        let registry = registry();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _subscription = registry.subscribe(move |_, _| counter.set(counter.get() + 1));

        let broken = Clashing {
            commands: vec!["hammer", "saw", "hammer"],
        };
        assert_eq!(
            registry.register_module(&broken),
            Err(RegistryError::DuplicateCommand(CommandPath::new("tools/hammer")))
        );
        assert!(!registry.has_group(&CommandPath::new("tools")));
        assert!(registry.commands().is_empty());
        assert_eq!(seen.get(), 0);

        let fixed = Clashing {
            commands: vec!["hammer", "saw"],
        };
        assert_eq!(registry.register_module(&fixed), Ok(true));
        assert!(registry.has_command(&CommandPath::new("tools/saw")));
        assert_eq!(registry.register_module(&fixed), Ok(false));
    }

    #[test]
    fn sync_data_lists_primary_paths_through_the_filter() {
        let registry = registry();
        registry.register_group(GroupOptions::new("admin")).expect("group");
        registry.register(noop("kick").group("admin").alias("k")).expect("command");
        registry.register(noop("secret")).expect("command");

        let data = registry.sync_data(|command| command.options().name != "secret");
        assert_eq!(data.commands.keys().collect::<Vec<_>>(), vec!["admin/kick"]);
        assert_eq!(data.groups.keys().collect::<Vec<_>>(), vec!["admin"]);
        assert_eq!(
            data.commands["admin/kick"],
            CommandOptions {
                name: "kick".to_string(),
                group: Some(CommandPath::new("admin")),
                aliases: vec!["k".to_string()],
                ..CommandOptions::default()
            }
        );
    }
}

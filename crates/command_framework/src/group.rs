//! Group containers: name-keyed children of one path.

use std::{collections::HashMap, rc::Rc};

use command_contract::{CommandPath, GroupOptions};
use thiserror::Error;

use crate::command::Command;

/// Rejected group membership change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// The child path is not one segment below the group.
    #[error("`{child}` is not a direct child of group `{group}`")]
    NotDirectChild {
        /// Group path.
        group: CommandPath,
        /// Rejected child path.
        child: CommandPath,
    },
    /// A command or group with the same name already lives in the group.
    #[error("group `{group}` already contains `{name}`")]
    NameCollision {
        /// Group path.
        group: CommandPath,
        /// Colliding name.
        name: String,
    },
    /// A group added to itself.
    #[error("group `{0}` cannot contain itself")]
    SelfReference(CommandPath),
}

/// A registered group and its direct children.
#[derive(Debug, Clone)]
pub struct Group {
    path: CommandPath,
    options: GroupOptions,
    commands: HashMap<String, Rc<Command>>,
    groups: HashMap<String, CommandPath>,
}

impl Group {
    /// Creates an empty group from its options.
    pub fn new(options: GroupOptions) -> Self {
        Self {
            path: options.path(),
            options,
            commands: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Canonical path.
    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// Options as registered.
    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    /// Swaps in `options` for the same path, keeping every linked child.
    ///
    /// Returns whether the options differed; options addressing another path are ignored.
    pub fn replace_options(&mut self, options: GroupOptions) -> bool {
        if options.path() != self.path || options == self.options {
            return false;
        }
        self.options = options;
        true
    }

    /// Links a command under the last segment of `path`, which may be an alias path.
    pub fn add_command(
        &mut self,
        path: &CommandPath,
        command: Rc<Command>,
    ) -> Result<(), GroupError> {
        let name = self.child_name(path)?;
        self.commands.insert(name, command);
        Ok(())
    }

    /// Links a child group.
    pub fn add_group(&mut self, path: &CommandPath) -> Result<(), GroupError> {
        if path == &self.path {
            return Err(GroupError::SelfReference(path.clone()));
        }
        let name = self.child_name(path)?;
        self.groups.insert(name, path.clone());
        Ok(())
    }

    /// Unlinks a command by name.
    pub fn remove_command(&mut self, name: &str) -> Option<Rc<Command>> {
        self.commands.remove(name)
    }

    /// Unlinks a child group by name.
    pub fn remove_group(&mut self, name: &str) -> Option<CommandPath> {
        self.groups.remove(name)
    }

    /// Command linked under `name`.
    pub fn get_command(&self, name: &str) -> Option<&Rc<Command>> {
        self.commands.get(name)
    }

    /// Path of the child group named `name`.
    pub fn get_group(&self, name: &str) -> Option<&CommandPath> {
        self.groups.get(name)
    }

    /// Whether a command is linked under `name`.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Whether a child group is named `name`.
    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Names of linked commands, aliases included.
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Paths of child groups.
    pub fn group_paths(&self) -> impl Iterator<Item = &CommandPath> {
        self.groups.values()
    }

    fn child_name(&self, path: &CommandPath) -> Result<String, GroupError> {
        if !path.is_child_of(&self.path) {
            return Err(GroupError::NotDirectChild {
                group: self.path.clone(),
                child: path.clone(),
            });
        }
        let name = path.tail().unwrap_or_default().to_string();
        if self.commands.contains_key(&name) || self.groups.contains_key(&name) {
            return Err(GroupError::NameCollision {
                group: self.path.clone(),
                name,
            });
        }
        Ok(name)
    }
}

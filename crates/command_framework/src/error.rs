//! Error taxonomy for the fatal (programmer error) tier.
//!
//! User-facing failures such as bad arguments or unknown commands never appear here; they are
//! surfaced as failure replies on the [`crate::CommandContext`].

use std::time::Duration;

use command_contract::CommandPath;
use thiserror::Error;

/// Error raised by command bodies and guards. The dispatcher logs it and replies with the
/// configured generic error message.
pub type CommandError = Box<dyn std::error::Error>;

/// Invalid command or type definition, detected when it is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Empty name or a name containing a path separator or whitespace.
    #[error("invalid name `{0}`: names must be non-empty and must not contain `/` or whitespace")]
    InvalidName(String),
    /// A type was built without a required function.
    #[error("type `{name}` has no {missing}")]
    IncompleteType {
        /// Type name.
        name: String,
        /// Which function is missing.
        missing: &'static str,
    },
    /// A required argument follows an optional one.
    #[error("command `{command}`: required argument `{argument}` follows an optional argument")]
    RequiredAfterOptional {
        /// Command path.
        command: CommandPath,
        /// Offending argument.
        argument: String,
    },
    /// A fixed arity of zero.
    #[error("command `{command}`: argument `{argument}` must consume at least one token")]
    ZeroArity {
        /// Command path.
        command: CommandPath,
        /// Offending argument.
        argument: String,
    },
    /// A rest argument that is not the final argument.
    #[error("command `{command}`: rest argument `{argument}` must be the last argument")]
    RestNotLast {
        /// Command path.
        command: CommandPath,
        /// Offending argument.
        argument: String,
    },
    /// An argument names a type missing from the type registry.
    #[error("command `{command}`: argument `{argument}` uses unknown type `{type_name}`")]
    UnknownType {
        /// Command path.
        command: CommandPath,
        /// Offending argument.
        argument: String,
        /// Unresolved type name.
        type_name: String,
    },
    /// A local command without a body.
    #[error("command `{0}` has no handler")]
    MissingHandler(CommandPath),
    /// An alias repeating the name or another alias.
    #[error("command `{command}` declares `{alias}` more than once")]
    DuplicateAlias {
        /// Command path.
        command: CommandPath,
        /// Repeated alias.
        alias: String,
    },
}

/// Namespace conflicts and structural violations raised by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two commands at one path.
    #[error("command path `{0}` is already registered")]
    DuplicateCommand(CommandPath),
    /// A command at a path occupied by a group.
    #[error("command path `{0}` is already registered as a group")]
    CommandConflictsWithGroup(CommandPath),
    /// A group at a path occupied by a command.
    #[error("group path `{0}` is already registered as a command")]
    GroupConflictsWithCommand(CommandPath),
    /// Two groups at one path.
    #[error("group path `{0}` is already registered")]
    DuplicateGroup(CommandPath),
    /// A nested entry whose parent group does not exist.
    #[error("parent group `{parent}` of `{path}` is not registered")]
    MissingParentGroup {
        /// Entry path.
        path: CommandPath,
        /// Missing parent.
        parent: CommandPath,
    },
    /// Invalid definition inside a registration batch.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Observer-side synchronization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No snapshot arrived before the deadline.
    #[error("initial command sync timed out after {0:?}")]
    InitialSyncTimeout(Duration),
    /// No Tokio runtime is running to enforce the deadline.
    #[error("initial command sync needs a Tokio runtime")]
    NoRuntime,
    /// The pending sync was superseded or dropped before completing.
    #[error("initial command sync was cancelled")]
    Cancelled,
}

/// Misuse of the process-wide runtime slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Accessor used before `start_server`/`start_client`.
    #[error("command framework has not been started")]
    NotStarted,
    /// A second start on the same thread.
    #[error("command framework is already started")]
    AlreadyStarted,
    /// An accessor for the other side was called.
    #[error("expected the {expected} runtime but the {actual} runtime is running")]
    WrongSide {
        /// Side the caller asked for.
        expected: &'static str,
        /// Side that is running.
        actual: &'static str,
    },
    /// Startup registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Initial sync failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

//! Command framework runtime: typed argument parsing, a hierarchical command registry, guarded
//! dispatch with exactly-once replies, and catalog replication from an authoritative side to
//! observers.
//!
//! The authoritative side owns the catalog and executes commands. Observers mirror its catalog
//! through full snapshots, run their own local commands directly, and forward mirrored ones back
//! over the transport. All state is single-threaded and shared through cheap handle clones.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod builtin_types;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod history;
pub mod logging;
pub mod network;
pub mod registry;
pub mod roster;
pub mod runtime;
pub mod suggest;
pub mod sync;
pub mod types;

pub use builtin_types::{builtin_types, parse_duration, parse_hex_color};
pub use command::{Command, CommandBody, CommandBuilder, CommandHandler, ExecutionOutcome, Guard};
pub use command_contract::{
    ArgValue, ArgumentSpec, Arity, ClientMessage, Color, CommandOptions, CommandPath,
    GroupOptions, InvokeRequest, InvokeResponse, MutableCommandPath, Player, Reply,
    ServerMessage, SyncData, Team,
};
pub use command_tokenizer::{split_args, split_string, SplitOptions};
pub use config::{ConfigError, FrameworkConfig, LogLevel, Messages};
pub use context::{stamp_reply, CommandContext};
pub use dispatcher::{Dispatcher, InvokeError};
pub use error::{CommandError, DefinitionError, RegistryError, RuntimeError, SyncError};
pub use group::{Group, GroupError};
pub use history::{CommandHistory, HistoryEntry};
pub use network::{
    ClientMessageHandler, ClientNetwork, LoopbackClient, LoopbackNetwork, NetworkFuture,
    NoopNetwork, ServerHandlers, ServerNetwork,
};
pub use registry::{
    CommandModule, EntryKind, Registry, RegistryEvent, RegistryListener, RegistrySubscription,
};
pub use roster::{MemoryRoster, NoopRoster, Roster};
pub use runtime::{
    client, dispatcher, is_started, registry, server, shutdown, start_client, start_server,
    ClientRuntime, ServerRuntime, StartOptions,
};
pub use suggest::{suggest, Suggestions};
pub use sync::{SyncClient, SyncServer, Visibility};
pub use types::{TransformContext, Type, TypeBuilder, TypeRegistry};

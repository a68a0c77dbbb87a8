//! Shared command catalog contracts used by the authoritative registry, observers, and the
//! transport that connects them.
//!
//! This crate is intentionally runtime-agnostic. It defines serializable command metadata,
//! catalog snapshots, replies, typed argument values, and network messages without depending on
//! the execution engine.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod path;

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

pub use path::{CommandPath, MutableCommandPath, PATH_SEPARATOR};

/// Number of raw tokens an argument consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Arity {
    /// Exactly one token, bound as a scalar value.
    #[default]
    One,
    /// A fixed number of tokens, bound as a list.
    Count(u32),
    /// All remaining tokens, bound as a list.
    Rest,
}

impl Arity {
    /// Returns whether the bound value is a list rather than a scalar.
    pub fn is_multiple(self) -> bool {
        !matches!(self, Arity::One)
    }
}

/// Positional argument specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    /// Human-readable argument label.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Registered type name used to transform tokens.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the argument may be omitted.
    #[serde(default)]
    pub optional: bool,
    /// Number of tokens consumed.
    #[serde(default)]
    pub arity: Arity,
    /// Static completion candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ArgumentSpec {
    /// Creates a required single-token argument.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            type_name: type_name.into(),
            optional: false,
            arity: Arity::One,
            suggestions: None,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the argument optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the arity.
    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    /// Sets static completion candidates.
    pub fn suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = Some(suggestions.into_iter().map(Into::into).collect());
        self
    }
}

/// Registration metadata for a command. This is the unit replicated to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommandOptions {
    /// Final path segment.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Path of the owning group, when the command is nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<CommandPath>,
    /// Positional arguments in binding order.
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    /// Sibling names that also resolve to this command.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Suppresses the generic success reply when the body sets none.
    #[serde(default)]
    pub disable_default_reply: bool,
}

impl CommandOptions {
    /// Canonical path: the owning group path plus `name`.
    pub fn path(&self) -> CommandPath {
        self.group
            .clone()
            .unwrap_or_default()
            .child(&self.name)
    }

    /// Primary path followed by every alias path.
    pub fn all_paths(&self) -> Vec<CommandPath> {
        let parent = self.group.clone().unwrap_or_default();
        std::iter::once(self.path())
            .chain(self.aliases.iter().map(|alias| parent.child(alias)))
            .collect()
    }
}

/// Registration metadata for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupOptions {
    /// Final path segment.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Path of the parent group, when nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<CommandPath>,
}

impl GroupOptions {
    /// Creates a root-level group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parent: None,
        }
    }

    /// Sets the parent path.
    pub fn parent(mut self, parent: impl Into<CommandPath>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Canonical path: the parent path plus `name`.
    pub fn path(&self) -> CommandPath {
        self.parent.clone().unwrap_or_default().child(&self.name)
    }
}

/// Complete, self-consistent catalog sent from the authoritative side to an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncData {
    /// Command options keyed by path string.
    pub commands: BTreeMap<String, CommandOptions>,
    /// Group options keyed by path string.
    pub groups: BTreeMap<String, GroupOptions>,
}

/// Terminal outcome of a command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Text shown to the invoker.
    pub text: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Identity executing a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Stable numeric identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Name of the team the player belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl Player {
    /// Creates a player without a team.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
        }
    }

    /// Sets the team name.
    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }
}

/// A named team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team {
    /// Team name.
    pub name: String,
    /// Display color.
    pub color: Color,
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Creates a color from its channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase `#rrggbb` form.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Typed value produced by an argument type transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ArgValue {
    /// Free text.
    String(String),
    /// Finite floating point number.
    Number(f64),
    /// Signed integer.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Non-negative duration.
    Duration(Duration),
    /// One resolved player.
    Player(Player),
    /// A set of resolved players.
    Players(Vec<Player>),
    /// One resolved team.
    Team(Team),
    /// A color.
    Color(Color),
    /// Values bound by a multi-token argument.
    List(Vec<ArgValue>),
    /// Values produced by host-defined types.
    Custom(serde_json::Value),
}

impl ArgValue {
    /// Returns the text when this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the number for numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Number(value) => Some(*value),
            ArgValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns the list items when this is a list value.
    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Messages sent from an observer to the authoritative side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Requests a full snapshot and enrollment in future broadcasts.
    BeginSync,
}

/// Messages sent from the authoritative side to an observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Full catalog snapshot.
    Snapshot {
        /// Catalog contents.
        data: SyncData,
    },
}

/// Request payload for executing a mirrored command on the authoritative side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Resolved command path.
    pub path: CommandPath,
    /// Raw argument tokens after the path.
    pub args: Vec<String>,
    /// Reconstructed input line.
    pub text: String,
}

/// Response payload for [`InvokeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Reply set by the authoritative side, if any.
    pub reply: Option<Reply>,
}

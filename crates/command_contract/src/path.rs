//! Slash-delimited hierarchical paths for commands and groups.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// Segment separator used by the string form of a path.
pub const PATH_SEPARATOR: char = '/';

/// Immutable command or group path such as `admin/ban`.
///
/// Equality, ordering and hashing are structural over the segments. The cached string form is
/// always the segments joined by [`PATH_SEPARATOR`]. Every mutator returns a new instance.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CommandPath {
    segments: Vec<String>,
    joined: String,
}

impl CommandPath {
    /// Parses a path from its string form. Empty segments are dropped.
    pub fn new(raw: &str) -> Self {
        Self::from_segments(raw.split(PATH_SEPARATOR))
    }

    /// Builds a path from individual segments. Segments containing [`PATH_SEPARATOR`] are split
    /// and empty segments are dropped.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = normalize(segments).collect::<Vec<_>>();
        let joined = join(&segments);
        Self { segments, joined }
    }

    /// The zero-segment root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segment at `index`.
    pub fn part(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Returns the last segment.
    pub fn tail(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns every segment but the last, or `None` when the path has fewer than two segments.
    pub fn parent(&self) -> Option<CommandPath> {
        (self.segments.len() > 1).then(|| self.slice(0, self.segments.len() - 1))
    }

    /// Like [`CommandPath::parent`], but depth-1 paths report the root.
    pub fn parent_or_root(&self) -> CommandPath {
        self.slice(0, self.segments.len().saturating_sub(1))
    }

    /// Returns a new path with `segments` appended.
    pub fn append<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_segments(
            self.segments
                .iter()
                .cloned()
                .chain(segments.into_iter().map(Into::into)),
        )
    }

    /// Returns a new path with a single segment appended.
    pub fn child(&self, segment: &str) -> Self {
        self.append([segment])
    }

    /// Returns a new path without the segment at `index`.
    pub fn remove(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        if index < segments.len() {
            segments.remove(index);
        }
        Self::from_segments(segments)
    }

    /// Returns the segments in `from..to`, clamped to the path length.
    pub fn slice(&self, from: usize, to: usize) -> Self {
        let to = to.min(self.segments.len());
        let from = from.min(to);
        Self::from_segments(self.segments[from..to].iter().cloned())
    }

    /// Returns whether `self` is exactly one segment below `other`.
    pub fn is_child_of(&self, other: &CommandPath) -> bool {
        self.segments.len() == other.segments.len() + 1 && self.segments.starts_with(&other.segments)
    }

    /// Returns whether `self` is one or more segments below `other`.
    pub fn is_descendant_of(&self, other: &CommandPath) -> bool {
        self.segments.len() > other.segments.len() && self.segments.starts_with(&other.segments)
    }

    /// Returns the cached string form.
    pub fn as_str(&self) -> &str {
        &self.joined
    }

    /// Copies the path into its mutable flavor.
    pub fn to_mutable(&self) -> MutableCommandPath {
        MutableCommandPath {
            segments: self.segments.clone(),
            joined: self.joined.clone(),
        }
    }
}

impl PartialEq for CommandPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for CommandPath {}

impl Hash for CommandPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for CommandPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CommandPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

impl fmt::Debug for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandPath").field(&self.joined).finish()
    }
}

impl From<String> for CommandPath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for CommandPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<CommandPath> for String {
    fn from(path: CommandPath) -> Self {
        path.joined
    }
}

/// Mutable path whose mutators edit in place.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MutableCommandPath {
    segments: Vec<String>,
    joined: String,
}

impl MutableCommandPath {
    /// Parses a path from its string form. Empty segments are dropped.
    pub fn new(raw: &str) -> Self {
        CommandPath::new(raw).to_mutable()
    }

    /// Appends segments in place, splitting on [`PATH_SEPARATOR`] and dropping empty segments.
    pub fn append<I, S>(&mut self, segments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments.extend(normalize(segments));
        self.joined = join(&self.segments);
        self
    }

    /// Removes the segment at `index` in place; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> &mut Self {
        if index < self.segments.len() {
            self.segments.remove(index);
            self.joined = join(&self.segments);
        }
        self
    }

    /// Removes every segment.
    pub fn clear(&mut self) -> &mut Self {
        self.segments.clear();
        self.joined.clear();
        self
    }

    /// Returns the segments in `from..to`, clamped to the path length.
    pub fn slice(&self, from: usize, to: usize) -> Self {
        self.freeze().slice(from, to).to_mutable()
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segment at `index`.
    pub fn part(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Returns the last segment.
    pub fn tail(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns the cached string form.
    pub fn as_str(&self) -> &str {
        &self.joined
    }

    /// Snapshots the current value as an immutable path.
    pub fn freeze(&self) -> CommandPath {
        CommandPath {
            segments: self.segments.clone(),
            joined: self.joined.clone(),
        }
    }
}

impl fmt::Display for MutableCommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

impl fmt::Debug for MutableCommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableCommandPath").field(&self.joined).finish()
    }
}

fn normalize<I, S>(segments: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments.into_iter().flat_map(|segment| {
        let segment: String = segment.into();
        if segment.contains(PATH_SEPARATOR) {
            segment
                .split(PATH_SEPARATOR)
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        } else if segment.is_empty() {
            Vec::new()
        } else {
            vec![segment]
        }
    })
}

fn join(segments: &[String]) -> String {
    let mut joined = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            joined.push(PATH_SEPARATOR);
        }
        joined.push_str(segment);
    }
    joined
}

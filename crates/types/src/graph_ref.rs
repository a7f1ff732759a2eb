//! Graph references: the key identifying a schema variant in the registry.

use std::fmt;
use std::str::FromStr;

/// Default variant when a graph ref omits the `@variant` part.
pub const DEFAULT_VARIANT: &str = "current";

/// A registry graph reference: a graph identifier plus a variant tag.
///
/// Rendered as `graph-id@variant`, e.g. `my-service@staging`. The variant
/// defaults to [`DEFAULT_VARIANT`] when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphRef {
    graph_id: String,
    variant: String,
}

impl GraphRef {
    /// Create a graph ref from its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty or contains `@`.
    pub fn new(graph_id: impl Into<String>, variant: impl Into<String>) -> Result<Self, GraphRefError> {
        let graph_id = graph_id.into();
        let variant = variant.into();
        if graph_id.is_empty() {
            return Err(GraphRefError::EmptyGraphId);
        }
        if variant.is_empty() {
            return Err(GraphRefError::EmptyVariant);
        }
        if graph_id.contains('@') || variant.contains('@') {
            return Err(GraphRefError::InvalidCharacter);
        }
        Ok(Self { graph_id, variant })
    }

    /// The graph identifier.
    #[must_use]
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// The variant tag.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl fmt::Display for GraphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.graph_id, self.variant)
    }
}

impl FromStr for GraphRef {
    type Err = GraphRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((graph_id, variant)) => Self::new(graph_id, variant),
            None => Self::new(s, DEFAULT_VARIANT),
        }
    }
}

/// Error produced when parsing or constructing a [`GraphRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRefError {
    /// The graph id part was empty
    EmptyGraphId,
    /// The variant part was empty (`my-graph@`)
    EmptyVariant,
    /// A part contained a reserved character
    InvalidCharacter,
}

impl fmt::Display for GraphRefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGraphId => write!(f, "graph ref is missing a graph id"),
            Self::EmptyVariant => write!(f, "graph ref has an empty variant"),
            Self::InvalidCharacter => write!(f, "graph ref parts must not contain '@'"),
        }
    }
}

impl std::error::Error for GraphRefError {}

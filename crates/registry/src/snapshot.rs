//! Immutable schema snapshots.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use apollo_compiler::Schema;
use graphref_types::GraphRef;

/// Compute the content hash used to identify a schema document.
///
/// Stable across processes for the same SDL text. Used when the registry
/// payload omits a hash and when cache entries are rehydrated from disk.
#[must_use]
pub fn content_hash(sdl: &str) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    sdl.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// An immutable schema snapshot fetched from the registry.
///
/// Cheap to clone: the SDL, hash, and parsed schema are all `Arc`-shared.
/// Two snapshots are equal when their content hashes are equal.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    graph_ref: GraphRef,
    sdl: Arc<str>,
    hash: Arc<str>,
    fetched_at: SystemTime,
    min_poll_interval: Option<Duration>,
    schema: Arc<Schema>,
}

impl SchemaSnapshot {
    /// Build a snapshot from registry SDL.
    ///
    /// The SDL is parsed eagerly, exactly once. If it has errors the partial
    /// schema is kept so analysis can degrade instead of failing outright.
    #[must_use]
    pub fn new(
        graph_ref: GraphRef,
        sdl: impl Into<Arc<str>>,
        hash: impl Into<Arc<str>>,
        fetched_at: SystemTime,
    ) -> Self {
        let sdl = sdl.into();
        let schema = Schema::parse(sdl.as_ref(), "registry.graphql")
            .unwrap_or_else(|with_errors| with_errors.partial);
        Self {
            graph_ref,
            sdl,
            hash: hash.into(),
            fetched_at,
            min_poll_interval: None,
            schema: Arc::new(schema),
        }
    }

    /// Attach the registry's minimum-poll-interval hint.
    #[must_use]
    pub const fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn graph_ref(&self) -> &GraphRef {
        &self.graph_ref
    }

    /// The raw SDL text as served by the registry.
    #[must_use]
    pub fn sdl(&self) -> &Arc<str> {
        &self.sdl
    }

    /// Content hash identifying this snapshot.
    #[must_use]
    pub fn hash(&self) -> &Arc<str> {
        &self.hash
    }

    /// When the snapshot was fetched from the registry.
    #[must_use]
    pub const fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Registry hint for the shortest acceptable refresh interval.
    #[must_use]
    pub const fn min_poll_interval(&self) -> Option<Duration> {
        self.min_poll_interval
    }

    /// The parsed schema (possibly partial if the registry served SDL with
    /// errors).
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Time elapsed since the fetch, saturating to zero on clock skew.
    #[must_use]
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.fetched_at)
            .unwrap_or(Duration::ZERO)
    }

    /// True when this snapshot was fetched no earlier than `other`.
    ///
    /// Snapshot installation is monotonic: a resolver never replaces a
    /// snapshot with one that is older.
    #[must_use]
    pub fn is_at_least_as_fresh_as(&self, other: &Self) -> bool {
        self.fetched_at >= other.fetched_at
    }
}

impl PartialEq for SchemaSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.graph_ref == other.graph_ref && self.hash == other.hash
    }
}

impl Eq for SchemaSnapshot {}

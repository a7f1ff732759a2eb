//! Schema synchronization for graphref.
//!
//! Two layers keep a project's schema usable and current:
//!
//! - [`SchemaCache`] holds snapshots in memory and mirrors them to disk, so
//!   a restart (or an offline session) starts from the last known schema.
//! - [`SchemaResolver`] owns freshness: TTL-driven refresh, exponential
//!   backoff on transient registry failures, and coalescing so a graph ref
//!   never has more than one fetch in flight.
//!
//! The resolver is single-owner state driven by the server's main loop;
//! only the registry I/O itself runs on the async runtime, reporting back
//! through a channel as [`ResolverEvent`]s.

mod cache;
mod resolver;

pub use cache::{CachedSchema, Freshness, SchemaCache};
pub use resolver::{RefreshPolicy, ResolverEvent, SchemaResolver, SchemaStatus};

//! Schema registry client for graphref.
//!
//! The registry owns the schema. This crate defines the client contract
//! ([`RegistryClient`]), the immutable [`SchemaSnapshot`] a successful fetch
//! produces, and the [`FetchError`] taxonomy callers use to decide between
//! retrying and giving up. The client itself performs no caching and no
//! retries; both are owned by the schema resolver.

mod error;
mod http;
mod snapshot;

use std::future::Future;

use graphref_types::GraphRef;

pub use error::FetchError;
pub use http::HttpRegistryClient;
pub use snapshot::{content_hash, SchemaSnapshot};

/// A client able to fetch the current schema snapshot for a graph ref.
///
/// One fetch maps to one registry round trip. Implementations must be
/// cheap to share behind an `Arc` because the resolver clones the client
/// into spawned fetch tasks.
pub trait RegistryClient: Send + Sync + 'static {
    /// Fetch the schema for `graph_ref` from the registry.
    fn fetch_schema(
        &self,
        graph_ref: &GraphRef,
    ) -> impl Future<Output = Result<SchemaSnapshot, FetchError>> + Send;
}

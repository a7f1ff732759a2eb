//! Result ordering across concurrent analysis runs.

use std::collections::HashMap;
use std::sync::Arc;

use graphref_documents::Document;
use graphref_schema::SchemaStatus;
use tracing::debug;

use crate::diagnostics::{diagnose, DiagnoseResult};

/// What to do with a finished analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    /// Newer than anything published for this URI; send it to the client.
    Publish(DiagnoseResult),
    /// Computed against a version that has since been superseded.
    Discard,
}

/// Tracks the last published result per URI so that out-of-order analysis
/// completions never overwrite diagnostics for a newer document version.
#[derive(Debug, Default)]
pub struct AnalysisEngine {
    published: HashMap<Arc<str>, Published>,
}

#[derive(Debug)]
struct Published {
    version: i32,
    schema_hash: Option<Arc<str>>,
}

impl AnalysisEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnose `document` against `status` and decide whether the result
    /// may be published.
    ///
    /// Last writer wins per URI: a result for an older document version is
    /// discarded. Re-running the same version is allowed so that schema
    /// refreshes can replace previously published results.
    pub fn diagnose(&mut self, document: &Document, status: &SchemaStatus) -> PublishDecision {
        if let Some(published) = self.published.get(document.uri()) {
            if document.version() < published.version {
                debug!(
                    uri = %document.uri(),
                    version = document.version(),
                    published = published.version,
                    "discarding stale analysis result"
                );
                return PublishDecision::Discard;
            }
        }

        let result = diagnose(document, status);
        self.published.insert(
            document.uri().clone(),
            Published {
                version: document.version(),
                schema_hash: result.schema_hash.clone(),
            },
        );
        PublishDecision::Publish(result)
    }

    /// Hash of the schema snapshot behind the last published result, used to
    /// skip republishing when a resolver event carried no new snapshot.
    #[must_use]
    pub fn published_schema_hash(&self, uri: &str) -> Option<&Arc<str>> {
        self.published.get(uri)?.schema_hash.as_ref()
    }

    /// Drop publish tracking for a closed document.
    pub fn forget(&mut self, uri: &str) {
        self.published.remove(uri);
    }
}

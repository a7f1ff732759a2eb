//! The versioned document store.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use crate::{parse_document, DocumentParse, LineIndex};

/// One open document at one version.
///
/// Text and parse results are `Arc`-shared so analysis can capture a
/// consistent snapshot of a document while newer versions arrive.
#[derive(Debug, Clone)]
pub struct Document {
    uri: Arc<str>,
    version: i32,
    text: Arc<str>,
    line_index: Arc<LineIndex>,
    parse: Arc<OnceLock<Arc<DocumentParse>>>,
}

impl Document {
    fn new(uri: Arc<str>, version: i32, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_index = Arc::new(LineIndex::new(&text));
        Self {
            uri,
            version,
            text,
            line_index,
            parse: Arc::new(OnceLock::new()),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Arc<str> {
        &self.uri
    }

    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    #[must_use]
    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// Parse results for this version.
    ///
    /// The first call parses; later calls (and clones made before or after)
    /// share the same result. A (URI, version) pair is parsed at most once.
    #[must_use]
    pub fn parse(&self) -> Arc<DocumentParse> {
        Arc::clone(
            self.parse
                .get_or_init(|| Arc::new(parse_document(&self.text))),
        )
    }
}

/// All open documents, keyed by URI.
///
/// Cloning is cheap and captures a consistent snapshot: documents are
/// `Arc`-shared, so a clone handed to a worker sees the versions open at
/// capture time while the original keeps receiving changes.
#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    documents: HashMap<Arc<str>, Document>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened document.
    ///
    /// Re-opening an existing URI replaces it unconditionally; the editor
    /// owns the truth on open.
    pub fn open(&mut self, uri: impl Into<Arc<str>>, version: i32, text: impl Into<Arc<str>>) {
        let uri = uri.into();
        trace!(uri = %uri, version, "open document");
        self.documents
            .insert(Arc::clone(&uri), Document::new(uri, version, text));
    }

    /// Apply a full-content change.
    ///
    /// Returns `false` without touching the document when `version` is not
    /// newer than the stored one; out-of-order changes are dropped, not
    /// applied.
    pub fn change(&mut self, uri: &str, version: i32, text: impl Into<Arc<str>>) -> bool {
        let Some(existing) = self.documents.get_mut(uri) else {
            debug!(uri, version, "change for unopened document ignored");
            return false;
        };
        if version <= existing.version {
            debug!(
                uri,
                version,
                current = existing.version,
                "stale document change ignored"
            );
            return false;
        }
        *existing = Document::new(Arc::clone(&existing.uri), version, text);
        true
    }

    /// Remove a closed document. Unknown URIs are ignored.
    pub fn close(&mut self, uri: &str) {
        if self.documents.remove(uri).is_some() {
            trace!(uri, "closed document");
        }
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.documents.get(uri)
    }

    /// All open documents, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

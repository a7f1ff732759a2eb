//! Versioned document store for the graphref language server.
//!
//! Editors own document content; this crate owns its lifecycle. Every
//! document carries the editor's version number, versions are strictly
//! monotonic per URI (a stale change is a no-op), and parsing is lazy:
//! a (URI, version) pair is parsed at most once, on first use.

mod line_index;
mod parse;
mod store;

pub use line_index::LineIndex;
pub use parse::{
    parse_document, DocumentParse, FragmentInfo, OperationInfo, OperationKind, SyntaxError,
};
pub use store::{Document, DocumentStore};

//! Analysis engine for the graphref language server.
//!
//! Every operation here is a pure function over a captured `(document,
//! schema status)` pair: the caller clones the document (cheap, `Arc`-backed)
//! and the current [`SchemaStatus`](graphref_schema::SchemaStatus) before
//! analysis starts, so results are internally consistent even while newer
//! document versions or schema snapshots arrive.
//!
//! When the schema is not `Ready`, analysis degrades instead of failing:
//! diagnostics fall back to syntax-only with an explanatory marker, and
//! completion/hover return empty results.
//!
//! [`AnalysisEngine`] adds result ordering on top: diagnostics computed for
//! a document version older than the last published one are discarded
//! (last-writer-wins per URI).

mod completion;
mod definition;
mod diagnostics;
mod engine;
mod hover;
mod symbol;

pub use completion::{complete, CompletionItem, CompletionKind};
pub use definition::definition;
pub use diagnostics::{diagnose, syntax_diagnostics, DiagnoseResult};
pub use engine::{AnalysisEngine, PublishDecision};
pub use hover::{hover, Hover};
pub use symbol::{find_symbol_at_offset, parent_type_at_offset, Symbol};

//! Foundation types for the graphref language server core.
//!
//! This crate provides shared types used across the graphref stack.
//! It has zero external dependencies, making it suitable as a foundation layer.
//!
//! # Type Categories
//!
//! - **Position types**: [`Position`], [`Range`], [`OffsetRange`]
//! - **Diagnostic types**: [`Diagnostic`], [`DiagnosticSeverity`]
//! - **Registry types**: [`GraphRef`]
//! - **Control flow**: [`CancelToken`]

mod cancel;
mod diagnostic;
mod graph_ref;
mod position;

pub use cancel::CancelToken;
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use graph_ref::{GraphRef, GraphRefError, DEFAULT_VARIANT};
pub use position::{Location, OffsetRange, Position, Range};

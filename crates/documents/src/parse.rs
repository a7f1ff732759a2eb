//! Lazy parse results for a document.
//!
//! Parsing runs both layers once: the error-tolerant CST parser for syntax
//! errors and source ranges, and the AST parser for the structures analysis
//! validates. When the document has syntax errors no operations are
//! reported at all; analysis never sees a partial operation.

use apollo_compiler::ast;
use apollo_parser::cst::{self, CstNode};
use graphref_types::OffsetRange;
use tracing::trace;

/// A single syntax error with its source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub range: OffsetRange,
}

/// Kind of an executable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// The schema root type backing this operation kind.
    #[must_use]
    pub const fn root_type_field(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.root_type_field())
    }
}

/// An operation definition found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    /// Operation name; `None` for anonymous shorthand operations.
    pub name: Option<String>,
    pub kind: OperationKind,
    /// Full source range of the definition.
    pub range: OffsetRange,
}

/// A fragment definition found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    pub name: String,
    /// Range of the fragment's name token, for definition results.
    pub name_range: OffsetRange,
    /// Full source range of the definition.
    pub range: OffsetRange,
    /// The type the fragment applies to, when present.
    pub type_condition: Option<String>,
}

/// Everything derived from one parse of one document version.
#[derive(Debug, Default)]
pub struct DocumentParse {
    pub syntax_errors: Vec<SyntaxError>,
    /// Empty whenever `syntax_errors` is non-empty.
    pub operations: Vec<OperationInfo>,
    /// Empty whenever `syntax_errors` is non-empty.
    pub fragments: Vec<FragmentInfo>,
    /// AST for validation; `None` when the document failed to parse.
    pub ast: Option<ast::Document>,
}

impl DocumentParse {
    #[must_use]
    pub fn has_syntax_errors(&self) -> bool {
        !self.syntax_errors.is_empty()
    }
}

/// Parse a document's text.
#[must_use]
pub fn parse_document(text: &str) -> DocumentParse {
    let tree = apollo_parser::Parser::new(text).parse();

    let syntax_errors: Vec<SyntaxError> = tree
        .errors()
        .map(|error| SyntaxError {
            message: error.message().to_string(),
            range: OffsetRange::new(error.index(), error.index() + error.data().len()),
        })
        .collect();

    if !syntax_errors.is_empty() {
        trace!(count = syntax_errors.len(), "document has syntax errors");
        return DocumentParse {
            syntax_errors,
            ..DocumentParse::default()
        };
    }

    let mut operations = Vec::new();
    let mut fragments = Vec::new();
    for definition in tree.document().definitions() {
        match definition {
            cst::Definition::OperationDefinition(op) => {
                operations.push(OperationInfo {
                    name: op.name().map(|name| name.text().to_string()),
                    kind: operation_kind(op.operation_type().as_ref()),
                    range: node_range(op.syntax()),
                });
            }
            cst::Definition::FragmentDefinition(fragment) => {
                let Some(name) = fragment.fragment_name().and_then(|f| f.name()) else {
                    continue;
                };
                fragments.push(FragmentInfo {
                    name: name.text().to_string(),
                    name_range: node_range(name.syntax()),
                    range: node_range(fragment.syntax()),
                    type_condition: fragment
                        .type_condition()
                        .and_then(|tc| tc.named_type())
                        .and_then(|named| named.name())
                        .map(|name| name.text().to_string()),
                });
            }
            _ => {}
        }
    }

    let ast = ast::Document::parse(text, "document.graphql").ok();

    DocumentParse {
        syntax_errors,
        operations,
        fragments,
        ast,
    }
}

fn operation_kind(operation_type: Option<&cst::OperationType>) -> OperationKind {
    match operation_type {
        Some(ty) if ty.mutation_token().is_some() => OperationKind::Mutation,
        Some(ty) if ty.subscription_token().is_some() => OperationKind::Subscription,
        // Explicit `query` or anonymous shorthand.
        _ => OperationKind::Query,
    }
}

fn node_range(node: &apollo_parser::SyntaxNode) -> OffsetRange {
    let range = node.text_range();
    OffsetRange::new(range.start().into(), range.end().into())
}

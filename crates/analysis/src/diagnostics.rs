//! Document diagnostics: syntax always, validation when a schema is ready.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast;
use apollo_compiler::validation::Valid;
use apollo_compiler::{Node, Schema};
use graphref_documents::{Document, LineIndex};
use graphref_schema::SchemaStatus;
use graphref_types::{Diagnostic, OffsetRange, Position, Range};
use tracing::trace;

/// Similarity floor for "did you mean" field suggestions.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// The outcome of diagnosing one document version against one schema status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnoseResult {
    pub diagnostics: Vec<Diagnostic>,
    /// True when validation was skipped because no schema was available;
    /// the diagnostics then cover syntax only.
    pub degraded: bool,
    /// Hash of the schema snapshot the result was computed against.
    pub schema_hash: Option<Arc<str>>,
}

/// Diagnose a document against the current schema status.
///
/// Deterministic in its inputs: the same document version and schema
/// snapshot always produce the same result.
#[must_use]
pub fn diagnose(document: &Document, status: &SchemaStatus) -> DiagnoseResult {
    let parse = document.parse();
    let mut diagnostics = syntax_diagnostics(document);

    match status {
        SchemaStatus::Ready(snapshot) => {
            if !parse.has_syntax_errors() {
                if let Some(ast_doc) = &parse.ast {
                    diagnostics.extend(validate(ast_doc, snapshot.schema()));
                }
            }
            DiagnoseResult {
                diagnostics,
                degraded: false,
                schema_hash: Some(Arc::clone(snapshot.hash())),
            }
        }
        SchemaStatus::Pending => {
            diagnostics.push(
                Diagnostic::info(
                    Range::at(Position::new(0, 0)),
                    "schema is being fetched from the registry; showing syntax checks only",
                )
                .with_code("schema-pending"),
            );
            DiagnoseResult {
                diagnostics,
                degraded: true,
                schema_hash: None,
            }
        }
        SchemaStatus::Unavailable(error) => {
            diagnostics.push(
                Diagnostic::warning(
                    Range::at(Position::new(0, 0)),
                    format!("schema unavailable ({error}); showing syntax checks only"),
                )
                .with_code("schema-unavailable"),
            );
            DiagnoseResult {
                diagnostics,
                degraded: true,
                schema_hash: None,
            }
        }
    }
}

/// Syntax diagnostics alone, with no schema involvement.
///
/// Used directly by the front end for documents in unconfigured projects,
/// where the degraded-schema marker would be noise on top of the config
/// error already shown.
#[must_use]
pub fn syntax_diagnostics(document: &Document) -> Vec<Diagnostic> {
    let parse = document.parse();
    let text = document.text();
    let line_index = document.line_index();

    parse
        .syntax_errors
        .iter()
        .map(|error| {
            Diagnostic::error(
                range_for(line_index, text, error.range),
                error.message.clone(),
            )
            .with_code("syntax")
        })
        .collect()
}

/// Validate each executable definition in isolation.
///
/// One definition per validation unit, plus the fragments it transitively
/// references: a broken operation can never suppress (or duplicate) the
/// results of its siblings.
fn validate(document: &ast::Document, schema: &Schema) -> Vec<Diagnostic> {
    let schema = Valid::assume_valid_ref(schema);
    let fragments: HashMap<&str, &Node<ast::FragmentDefinition>> = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment) => {
                Some((fragment.name.as_str(), fragment))
            }
            _ => None,
        })
        .collect();

    let mut diagnostics = Vec::new();
    for definition in &document.definitions {
        let (selection_set, is_fragment) = match definition {
            ast::Definition::OperationDefinition(op) => (&op.selection_set, false),
            ast::Definition::FragmentDefinition(fragment) => (&fragment.selection_set, true),
            _ => continue,
        };

        let mut unit = ast::Document::new();
        unit.definitions.push(definition.clone());
        for name in transitive_fragments(selection_set, &fragments) {
            // A fragment includes itself in its closure; don't add it twice.
            if is_fragment && definition_name(definition) == Some(name.as_str()) {
                continue;
            }
            if let Some(fragment) = fragments.get(name.as_str()) {
                unit.definitions
                    .push(ast::Definition::FragmentDefinition((*fragment).clone()));
            }
        }

        if let Err(with_errors) = unit.to_executable_validate(schema) {
            for error in with_errors.errors.iter() {
                let message = error.error.to_string();
                // Standalone fragments are valid documents here even though
                // nothing spreads them.
                if is_fragment && message.contains("must be used in an operation") {
                    continue;
                }
                let range = error.line_column_range().map_or_else(
                    || Range::at(Position::new(0, 0)),
                    |range| {
                        Range::new(
                            Position::new(
                                range.start.line.saturating_sub(1) as u32,
                                range.start.column.saturating_sub(1) as u32,
                            ),
                            Position::new(
                                range.end.line.saturating_sub(1) as u32,
                                range.end.column.saturating_sub(1) as u32,
                            ),
                        )
                    },
                );
                diagnostics.push(
                    Diagnostic::error(range, with_suggestion(&message, schema))
                        .with_code("validation"),
                );
            }
        }
    }
    trace!(count = diagnostics.len(), "validation finished");
    diagnostics
}

fn definition_name(definition: &ast::Definition) -> Option<&str> {
    match definition {
        ast::Definition::FragmentDefinition(fragment) => Some(fragment.name.as_str()),
        _ => None,
    }
}

/// Names of all fragments reachable from `selection_set`.
fn transitive_fragments(
    selection_set: &[ast::Selection],
    fragments: &HashMap<&str, &Node<ast::FragmentDefinition>>,
) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut queue = Vec::new();
    collect_spreads(selection_set, &mut queue);

    while let Some(name) = queue.pop() {
        if seen.iter().any(|s| s == &name) {
            continue;
        }
        if let Some(fragment) = fragments.get(name.as_str()) {
            collect_spreads(&fragment.selection_set, &mut queue);
        }
        seen.push(name);
    }
    seen
}

fn collect_spreads(selections: &[ast::Selection], out: &mut Vec<String>) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => collect_spreads(&field.selection_set, out),
            ast::Selection::FragmentSpread(spread) => {
                out.push(spread.fragment_name.to_string());
            }
            ast::Selection::InlineFragment(inline) => {
                collect_spreads(&inline.selection_set, out);
            }
        }
    }
}

/// Append a "did you mean" hint to unknown-field messages when a close
/// sibling field exists on the type.
fn with_suggestion(message: &str, schema: &Valid<Schema>) -> String {
    if !message.contains("field") || !(message.contains("does not have") || message.contains("has no")) {
        return message.to_string();
    }
    // Message shape: type `X` does not have a field `y`
    let mut quoted = message.split('`').skip(1).step_by(2);
    let (Some(type_name), Some(field_name)) = (quoted.next(), quoted.next()) else {
        return message.to_string();
    };
    let Some(fields) = crate::symbol::type_fields(schema, type_name) else {
        return message.to_string();
    };

    let best = fields
        .keys()
        .map(|candidate| {
            (
                candidate.as_str(),
                strsim::jaro_winkler(field_name, candidate.as_str()),
            )
        })
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match best {
        Some((suggestion, _)) => format!("{message} (did you mean `{suggestion}`?)"),
        None => message.to_string(),
    }
}

fn range_for(line_index: &LineIndex, text: &str, range: OffsetRange) -> Range {
    Range::new(
        line_index.position(text, range.start),
        line_index.position(text, range.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{document, ready_status};
    use graphref_registry::FetchError;
    use graphref_types::DiagnosticSeverity;

    #[test]
    fn test_valid_document_has_no_diagnostics() {
        let result = diagnose(&document("query { a b }"), &ready_status());
        assert!(result.diagnostics.is_empty());
        assert!(!result.degraded);
        assert!(result.schema_hash.is_some());
    }

    #[test]
    fn test_empty_document_has_no_diagnostics() {
        let result = diagnose(&document(""), &ready_status());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_diagnose_is_idempotent() {
        let doc = document("query { a mistake }");
        let first = diagnose(&doc, &ready_status());
        let second = diagnose(&doc, &ready_status());
        assert_eq!(first, second);
        assert!(!first.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_field_single_diagnostic_with_range() {
        let text = "query {\n  bogus\n}";
        let result = diagnose(&document(text), &ready_status());

        assert_eq!(result.diagnostics.len(), 1);
        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Error);
        assert_eq!(diagnostic.code.as_deref(), Some("validation"));
        assert!(diagnostic.message.contains("bogus"));
        // Range points at the offending line, inside the document.
        assert_eq!(diagnostic.range.start.line, 1);
    }

    #[test]
    fn test_unknown_field_suggestion() {
        let result = diagnose(&document("query { userr { id } }"), &ready_status());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(
            result.diagnostics[0].message.contains("did you mean `user`?"),
            "message was: {}",
            result.diagnostics[0].message
        );
    }

    #[test]
    fn test_syntax_errors_replace_validation() {
        let result = diagnose(&document("query Broken { user {{ }"), &ready_status());
        assert!(!result.diagnostics.is_empty());
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.code.as_deref() == Some("syntax")));
    }

    #[test]
    fn test_broken_operation_isolated_from_valid_sibling() {
        let text = "query Bad { nothere }\n\nquery Good { a b }";
        let result = diagnose(&document(text), &ready_status());

        assert!(!result.diagnostics.is_empty());
        // Every diagnostic points into the first operation's line.
        for diagnostic in &result.diagnostics {
            assert_eq!(diagnostic.range.start.line, 0, "{diagnostic:?}");
        }
    }

    #[test]
    fn test_fragment_validated_without_usage_noise() {
        let result = diagnose(
            &document("fragment F on User { id nope }"),
            &ready_status(),
        );
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("nope"));
    }

    #[test]
    fn test_operation_with_fragment_dependency() {
        let text = "query { user { ...UserBits } }\nfragment UserBits on User { id name }";
        let result = diagnose(&document(text), &ready_status());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_pending_schema_is_degraded() {
        let result = diagnose(&document("query { anything }"), &SchemaStatus::Pending);
        assert!(result.degraded);
        assert!(result.schema_hash.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, DiagnosticSeverity::Information);
        assert_eq!(result.diagnostics[0].code.as_deref(), Some("schema-pending"));
    }

    #[test]
    fn test_unavailable_schema_is_degraded_warning() {
        let status = SchemaStatus::Unavailable(FetchError::Unauthorized);
        let result = diagnose(&document("query { anything }"), &status);
        assert!(result.degraded);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert!(result.diagnostics[0].message.contains("credentials"));
    }

    #[test]
    fn test_degraded_still_reports_syntax() {
        let result = diagnose(&document("query {{"), &SchemaStatus::Pending);
        assert!(result.degraded);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code.as_deref() == Some("syntax")));
    }
}

//! Completion against the active schema snapshot.

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Schema;
use apollo_parser::cst::{self, CstNode};
use apollo_parser::SyntaxTree;
use graphref_documents::Document;
use graphref_schema::SchemaStatus;
use graphref_types::{CancelToken, Position};
use tracing::trace;

use crate::symbol::{parent_type_at_offset, type_fields};

/// Kind of a completion item, mapped to LSP item kinds by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Field,
    Fragment,
    Type,
    Directive,
    Argument,
    EnumValue,
}

/// One completion proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
}

impl CompletionItem {
    fn new(label: impl Into<String>, kind: CompletionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Cursor context derived from the text immediately before the cursor,
/// which stays reliable even while the document is mid-edit.
#[derive(Debug, PartialEq, Eq)]
enum CursorContext {
    FragmentSpread,
    Directive,
    TypeCondition,
    ArgumentValue { argument: String },
    Selection,
}

/// Compute completions at `position`.
///
/// Degraded schema states produce an empty list, never an error. The token
/// is checked between phases so editor-cancelled requests stop early.
#[must_use]
pub fn complete(
    document: &Document,
    status: &SchemaStatus,
    position: Position,
    cancel: &CancelToken,
) -> Vec<CompletionItem> {
    let SchemaStatus::Ready(snapshot) = status else {
        return Vec::new();
    };
    if cancel.is_cancelled() {
        return Vec::new();
    }

    let text = document.text();
    let Some(offset) = document.line_index().offset(text, position) else {
        return Vec::new();
    };
    let tree = apollo_parser::Parser::new(text).parse();
    let schema = snapshot.schema();

    if cancel.is_cancelled() {
        return Vec::new();
    }

    let context = cursor_context(text, offset);
    trace!(?context, offset, "completion context");
    match context {
        CursorContext::FragmentSpread => fragment_completions(&tree),
        CursorContext::Directive => directive_completions(schema),
        CursorContext::TypeCondition => type_condition_completions(schema),
        CursorContext::ArgumentValue { argument } => {
            enum_value_completions(&tree, schema, offset, &argument)
        }
        CursorContext::Selection => {
            if in_arguments(&tree, offset) {
                argument_completions(&tree, schema, offset)
            } else {
                field_completions(&tree, schema, offset)
            }
        }
    }
}

/// Classify the cursor from the characters before it.
fn cursor_context(text: &str, offset: usize) -> CursorContext {
    let before = &text[..offset.min(text.len())];

    // Skip back over the identifier prefix being typed.
    let prefix_start = before
        .rfind(|c: char| !c.is_alphanumeric() && c != '_')
        .map_or(0, |i| i + 1);
    let before_prefix = before[..prefix_start].trim_end();

    if before_prefix.ends_with("...") {
        return CursorContext::FragmentSpread;
    }
    if before_prefix.ends_with('@') {
        return CursorContext::Directive;
    }
    // A bare `ends_with("on")` would also match words like `person`;
    // require the preceding space.
    if before_prefix.ends_with(" on") && preceded_by_spread_or_fragment(before_prefix) {
        return CursorContext::TypeCondition;
    }
    if before_prefix.ends_with(':') {
        if let Some(argument) = argument_name_before_colon(before_prefix) {
            return CursorContext::ArgumentValue { argument };
        }
    }
    CursorContext::Selection
}

fn preceded_by_spread_or_fragment(before: &str) -> bool {
    let without_on = before.trim_end_matches("on").trim_end();
    without_on.ends_with("...") || without_on.split_whitespace().next_back().is_some_and(|w| {
        // `fragment Name on |`
        without_on.contains("fragment") && !w.is_empty()
    })
}

/// For `user(id: |`, returns `id`.
fn argument_name_before_colon(before: &str) -> Option<String> {
    let before_colon = before.strip_suffix(':')?.trim_end();
    let name_start = before_colon
        .rfind(|c: char| !c.is_alphanumeric() && c != '_')
        .map_or(0, |i| i + 1);
    let name = &before_colon[name_start..];
    (!name.is_empty()).then(|| name.to_string())
}

fn field_completions(tree: &SyntaxTree, schema: &Schema, offset: usize) -> Vec<CompletionItem> {
    let Some(parent) = parent_type_at_offset(tree, schema, offset) else {
        return Vec::new();
    };

    match schema.types.get(parent.as_str()) {
        Some(ExtendedType::Object(_) | ExtendedType::Interface(_)) => {
            let Some(fields) = type_fields(schema, &parent) else {
                return Vec::new();
            };
            fields
                .iter()
                .map(|(name, field)| {
                    let mut item = CompletionItem::new(name.as_str(), CompletionKind::Field)
                        .with_detail(field.ty.to_string());
                    if let Some(description) = &field.description {
                        item.detail = Some(format!("{}  {}", field.ty, description));
                    }
                    item
                })
                .collect()
        }
        Some(ExtendedType::Union(union_type)) => union_type
            .members
            .iter()
            .map(|member| {
                CompletionItem::new(format!("... on {}", member.as_str()), CompletionKind::Fragment)
                    .with_detail("inline fragment")
            })
            .collect(),
        _ => Vec::new(),
    }
}

// Walks the lossless syntax tree rather than the extracted fragment list:
// a spread being typed leaves the document mid-edit, where extraction
// reports no operations or fragments at all.
fn fragment_completions(tree: &SyntaxTree) -> Vec<CompletionItem> {
    tree.document()
        .definitions()
        .filter_map(|definition| {
            let cst::Definition::FragmentDefinition(fragment) = definition else {
                return None;
            };
            let name = fragment.fragment_name()?.name()?;
            let item = CompletionItem::new(name.text().as_str(), CompletionKind::Fragment);
            let condition = fragment
                .type_condition()
                .and_then(|c| c.named_type())
                .and_then(|t| t.name());
            Some(match condition {
                Some(condition) => {
                    item.with_detail(format!("on {}", condition.text().as_str()))
                }
                None => item,
            })
        })
        .collect()
}

fn directive_completions(schema: &Schema) -> Vec<CompletionItem> {
    schema
        .directive_definitions
        .iter()
        .map(|(name, definition)| {
            let locations = definition
                .locations
                .iter()
                .map(|location| location.name())
                .collect::<Vec<_>>()
                .join(" | ");
            CompletionItem::new(name.as_str(), CompletionKind::Directive).with_detail(locations)
        })
        .collect()
}

fn type_condition_completions(schema: &Schema) -> Vec<CompletionItem> {
    schema
        .types
        .iter()
        .filter(|(name, ty)| {
            !name.as_str().starts_with("__")
                && matches!(
                    ty,
                    ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)
                )
        })
        .map(|(name, _)| CompletionItem::new(name.as_str(), CompletionKind::Type))
        .collect()
}

fn argument_completions(tree: &SyntaxTree, schema: &Schema, offset: usize) -> Vec<CompletionItem> {
    let Some(field) = field_definition_for_arguments(tree, schema, offset) else {
        return Vec::new();
    };
    field
        .arguments
        .iter()
        .map(|argument| {
            CompletionItem::new(argument.name.as_str(), CompletionKind::Argument)
                .with_detail(argument.ty.to_string())
        })
        .collect()
}

fn enum_value_completions(
    tree: &SyntaxTree,
    schema: &Schema,
    offset: usize,
    argument: &str,
) -> Vec<CompletionItem> {
    let Some(field) = field_definition_for_arguments(tree, schema, offset) else {
        return Vec::new();
    };
    let Some(argument) = field
        .arguments
        .iter()
        .find(|candidate| candidate.name.as_str() == argument)
    else {
        return Vec::new();
    };

    match schema.types.get(argument.ty.inner_named_type().as_str()) {
        Some(ExtendedType::Enum(enum_type)) => enum_type
            .values
            .keys()
            .map(|value| CompletionItem::new(value.as_str(), CompletionKind::EnumValue))
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether `offset` falls inside a field's argument list.
fn in_arguments(tree: &SyntaxTree, offset: usize) -> bool {
    enclosing_field_with_arguments(tree, offset).is_some()
}

/// Schema definition of the field whose argument list contains `offset`.
fn field_definition_for_arguments<'a>(
    tree: &SyntaxTree,
    schema: &'a Schema,
    offset: usize,
) -> Option<&'a apollo_compiler::ast::FieldDefinition> {
    let field = enclosing_field_with_arguments(tree, offset)?;
    let name = field.name()?;
    // The parent type at the field's own name is the type declaring it.
    let name_offset: usize = name.syntax().text_range().start().into();
    let parent = parent_type_at_offset(tree, schema, name_offset)?;
    let fields = type_fields(schema, &parent)?;
    fields.get(name.text().as_str()).map(|component| &***component)
}

/// The field whose argument list contains `offset`, if any.
fn enclosing_field_with_arguments(tree: &SyntaxTree, offset: usize) -> Option<cst::Field> {
    fn search(selection_set: &cst::SelectionSet, offset: usize) -> Option<cst::Field> {
        for selection in selection_set.selections() {
            match selection {
                cst::Selection::Field(field) => {
                    if let Some(arguments) = field.arguments() {
                        if within(&arguments, offset) {
                            return Some(field);
                        }
                    }
                    if let Some(nested) = field.selection_set() {
                        if let Some(found) = search(&nested, offset) {
                            return Some(found);
                        }
                    }
                }
                cst::Selection::InlineFragment(inline) => {
                    if let Some(nested) = inline.selection_set() {
                        if let Some(found) = search(&nested, offset) {
                            return Some(found);
                        }
                    }
                }
                cst::Selection::FragmentSpread(_) => {}
            }
        }
        None
    }

    fn within<T: CstNode>(node: &T, offset: usize) -> bool {
        let range = node.syntax().text_range();
        let start: usize = range.start().into();
        let end: usize = range.end().into();
        offset >= start && offset < end
    }

    for definition in tree.document().definitions() {
        let selection_set = match definition {
            cst::Definition::OperationDefinition(op) => op.selection_set(),
            cst::Definition::FragmentDefinition(fragment) => fragment.selection_set(),
            _ => None,
        };
        if let Some(selection_set) = selection_set {
            if let Some(field) = search(&selection_set, offset) {
                return Some(field);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{document, extract_cursor, ready_status};

    fn complete_at(fixture: &str) -> Vec<CompletionItem> {
        let (text, position) = extract_cursor(fixture);
        complete(
            &document(&text),
            &ready_status(),
            position,
            &CancelToken::new(),
        )
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    #[test]
    fn test_root_fields_in_empty_operation() {
        let items = complete_at("query Q { | }");
        let mut found = labels(&items);
        found.sort_unstable();
        assert_eq!(found, ["a", "b", "search", "user"]);
        assert!(items.iter().all(|item| item.kind == CompletionKind::Field));
    }

    #[test]
    fn test_root_fields_against_minimal_schema() {
        let sdl = "type Query { a: String b: Int }";
        let snapshot = graphref_registry::SchemaSnapshot::new(
            "minimal@current".parse().unwrap(),
            sdl,
            graphref_registry::content_hash(sdl),
            std::time::SystemTime::now(),
        );
        let (text, position) = extract_cursor("query Q { | }");
        let items = complete(
            &document(&text),
            &graphref_schema::SchemaStatus::Ready(snapshot),
            position,
            &CancelToken::new(),
        );
        assert_eq!(labels(&items), ["a", "b"]);
    }

    #[test]
    fn test_field_detail_carries_type() {
        let items = complete_at("query Q { | }");
        let b = items.iter().find(|item| item.label == "b").unwrap();
        assert_eq!(b.detail.as_deref(), Some("Int"));
    }

    #[test]
    fn test_nested_fields() {
        let items = complete_at("query { user { | } }");
        let mut found = labels(&items);
        found.sort_unstable();
        assert_eq!(found, ["email", "friends", "id", "name"]);
    }

    #[test]
    fn test_fragment_spread_names() {
        let items = complete_at(
            "query { user { ...| } }\nfragment UserBits on User { id }",
        );
        assert_eq!(labels(&items), ["UserBits"]);
        assert_eq!(items[0].kind, CompletionKind::Fragment);
        assert_eq!(items[0].detail.as_deref(), Some("on User"));
    }

    #[test]
    fn test_directive_names() {
        let items = complete_at("query { a @| }");
        assert!(labels(&items).contains(&"uppercase"));
        assert!(items
            .iter()
            .all(|item| item.kind == CompletionKind::Directive));
    }

    #[test]
    fn test_type_condition_after_on() {
        let items = complete_at("query { search { ... on | } }");
        let found = labels(&items);
        assert!(found.contains(&"User"));
        assert!(found.contains(&"Node"));
        assert!(!found.iter().any(|name| name.starts_with("__")));
    }

    #[test]
    fn test_argument_names() {
        let items = complete_at("query { user(|) { id } }");
        let mut found = labels(&items);
        found.sort_unstable();
        assert_eq!(found, ["active", "id"]);
        assert!(items
            .iter()
            .all(|item| item.kind == CompletionKind::Argument));
    }

    #[test]
    fn test_enum_values_in_argument() {
        let items = complete_at("query { search(kind: |) { id } }");
        let mut found = labels(&items);
        found.sort_unstable();
        assert_eq!(found, ["EXACT", "FUZZY"]);
    }

    #[test]
    fn test_degraded_schema_returns_empty() {
        let (text, position) = extract_cursor("query Q { | }");
        let items = complete(
            &document(&text),
            &graphref_schema::SchemaStatus::Pending,
            position,
            &CancelToken::new(),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_cancelled_request_returns_empty() {
        let (text, position) = extract_cursor("query Q { | }");
        let cancel = CancelToken::new();
        cancel.cancel();
        let items = complete(&document(&text), &ready_status(), position, &cancel);
        assert!(items.is_empty());
    }
}

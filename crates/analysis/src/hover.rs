//! Hover content for the symbol under the cursor.

use std::fmt::Write as _;

use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::schema::ExtendedType;
use graphref_documents::Document;
use graphref_schema::SchemaStatus;
use graphref_types::{CancelToken, Position};

use crate::symbol::{find_symbol_at_offset, parent_type_at_offset, type_fields, Symbol};

/// Markdown hover content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub content: String,
}

/// Compute hover content at `position`, or `None` when the cursor is not on
/// a known symbol or the schema is not ready.
#[must_use]
pub fn hover(
    document: &Document,
    status: &SchemaStatus,
    position: Position,
    cancel: &CancelToken,
) -> Option<Hover> {
    let SchemaStatus::Ready(snapshot) = status else {
        return None;
    };
    if cancel.is_cancelled() {
        return None;
    }

    let text = document.text();
    let offset = document.line_index().offset(text, position)?;
    let tree = apollo_parser::Parser::new(text).parse();
    let schema = snapshot.schema();

    match find_symbol_at_offset(&tree, offset)? {
        Symbol::FieldName { name } => {
            let parent = parent_type_at_offset(&tree, schema, offset)?;
            let field = type_fields(schema, &parent)?.get(name.as_str())?;
            Some(Hover {
                content: field_hover(&parent, &name, field),
            })
        }
        Symbol::TypeName { name } => {
            let ty = schema.types.get(name.as_str())?;
            Some(Hover {
                content: type_hover(&name, ty),
            })
        }
        Symbol::FragmentSpread { name } => {
            let parse = document.parse();
            let fragment = parse.fragments.iter().find(|f| f.name == name)?;
            let mut content = format!("**Fragment:** `{name}`\n\n");
            if let Some(condition) = &fragment.type_condition {
                write!(content, "**On Type:** `{condition}`\n\n").ok();
            }
            Some(Hover { content })
        }
        Symbol::DirectiveName { name } => {
            let definition = schema.directive_definitions.get(name.as_str())?;
            let mut content = format!("**Directive:** `@{name}`\n\n");
            if let Some(description) = &definition.description {
                write!(content, "---\n\n{description}\n\n").ok();
            }
            Some(Hover { content })
        }
        Symbol::OperationName { .. }
        | Symbol::ArgumentName { .. }
        | Symbol::VariableReference { .. } => None,
    }
}

fn field_hover(parent: &str, name: &str, field: &FieldDefinition) -> String {
    let mut content = format!("**Field:** `{parent}.{name}`\n\n");
    write!(content, "**Type:** `{}`\n\n", field.ty).ok();

    if let Some(description) = &field.description {
        write!(content, "---\n\n{description}\n\n").ok();
    }
    if let Some(deprecated) = field.directives.get("deprecated") {
        let reason = deprecated
            .arguments
            .iter()
            .find(|argument| argument.name.as_str() == "reason")
            .and_then(|argument| argument.value.as_str());
        match reason {
            Some(reason) => {
                write!(content, "**Deprecated:** {reason}\n\n").ok();
            }
            None => {
                content.push_str("**Deprecated**\n\n");
            }
        }
    }
    content
}

fn type_hover(name: &str, ty: &ExtendedType) -> String {
    let kind = match ty {
        ExtendedType::Scalar(_) => "Scalar",
        ExtendedType::Object(_) => "Object",
        ExtendedType::Interface(_) => "Interface",
        ExtendedType::Union(_) => "Union",
        ExtendedType::Enum(_) => "Enum",
        ExtendedType::InputObject(_) => "Input Object",
    };
    let mut content = format!("**Type:** `{name}`\n\n**Kind:** {kind}\n\n");
    if let Some(description) = ty.description() {
        write!(content, "---\n\n{description}\n\n").ok();
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{document, extract_cursor, ready_status};

    fn hover_at(fixture: &str) -> Option<Hover> {
        let (text, position) = extract_cursor(fixture);
        hover(
            &document(&text),
            &ready_status(),
            position,
            &CancelToken::new(),
        )
    }

    #[test]
    fn test_field_hover_shows_type() {
        let result = hover_at("query { us|er { id } }").unwrap();
        assert!(result.content.contains("`Query.user`"));
        assert!(result.content.contains("`User`"));
    }

    #[test]
    fn test_field_hover_includes_description() {
        let result = hover_at("query { user { na|me } }").unwrap();
        assert!(result.content.contains("`User.name`"));
        assert!(result.content.contains("The user's display name."));
    }

    #[test]
    fn test_field_hover_includes_deprecation_reason() {
        let result = hover_at("query { user { em|ail } }").unwrap();
        assert!(result.content.contains("**Deprecated:** Use contact instead."));
    }

    #[test]
    fn test_type_hover_on_fragment_condition() {
        let result = hover_at("fragment F on Us|er { id }").unwrap();
        assert!(result.content.contains("`User`"));
        assert!(result.content.contains("**Kind:** Object"));
        assert!(result.content.contains("A user of the system."));
    }

    #[test]
    fn test_fragment_spread_hover() {
        let result = hover_at(
            "query { user { ...Bi|ts } }\nfragment Bits on User { id }",
        )
        .unwrap();
        assert!(result.content.contains("`Bits`"));
        assert!(result.content.contains("`User`"));
    }

    #[test]
    fn test_unknown_field_has_no_hover() {
        assert_eq!(hover_at("query { user { bog|us } }"), None);
    }

    #[test]
    fn test_degraded_schema_has_no_hover() {
        let (text, position) = extract_cursor("query { us|er { id } }");
        let result = hover(
            &document(&text),
            &SchemaStatus::Pending,
            position,
            &CancelToken::new(),
        );
        assert_eq!(result, None);
    }
}

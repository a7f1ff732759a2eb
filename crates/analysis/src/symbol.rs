//! Cursor symbol detection and schema type-stack walking over the CST.
//!
//! The CST parser is error tolerant, so everything here works on documents
//! that do not currently parse cleanly; that is what makes completion inside
//! half-typed selection sets possible.

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Schema;
use apollo_parser::cst::{self, CstNode};
use apollo_parser::SyntaxTree;

/// What the cursor is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    FieldName { name: String },
    FragmentSpread { name: String },
    TypeName { name: String },
    OperationName { name: String },
    ArgumentName { name: String },
    VariableReference { name: String },
    DirectiveName { name: String },
}

/// Identify the symbol at a byte offset, if any.
#[must_use]
pub fn find_symbol_at_offset(tree: &SyntaxTree, offset: usize) -> Option<Symbol> {
    for definition in tree.document().definitions() {
        match definition {
            cst::Definition::OperationDefinition(op) => {
                if let Some(symbol) = check_operation(&op, offset) {
                    return Some(symbol);
                }
            }
            cst::Definition::FragmentDefinition(fragment) => {
                if let Some(symbol) = check_fragment_definition(&fragment, offset) {
                    return Some(symbol);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_operation(op: &cst::OperationDefinition, offset: usize) -> Option<Symbol> {
    if let Some(name) = op.name() {
        if is_within(&name, offset) {
            return Some(Symbol::OperationName {
                name: name.text().to_string(),
            });
        }
    }
    check_selection_set(&op.selection_set()?, offset)
}

fn check_fragment_definition(fragment: &cst::FragmentDefinition, offset: usize) -> Option<Symbol> {
    if let Some(name) = fragment.fragment_name().and_then(|f| f.name()) {
        if is_within(&name, offset) {
            return Some(Symbol::FragmentSpread {
                name: name.text().to_string(),
            });
        }
    }

    if let Some(name) = fragment
        .type_condition()
        .and_then(|tc| tc.named_type())
        .and_then(|named| named.name())
    {
        if is_within(&name, offset) {
            return Some(Symbol::TypeName {
                name: name.text().to_string(),
            });
        }
    }

    check_selection_set(&fragment.selection_set()?, offset)
}

fn check_selection_set(selection_set: &cst::SelectionSet, offset: usize) -> Option<Symbol> {
    for selection in selection_set.selections() {
        match selection {
            cst::Selection::Field(field) => {
                if let Some(name) = field.name() {
                    if is_within(&name, offset) {
                        return Some(Symbol::FieldName {
                            name: name.text().to_string(),
                        });
                    }
                }
                if let Some(arguments) = field.arguments() {
                    if let Some(symbol) = check_arguments(&arguments, offset) {
                        return Some(symbol);
                    }
                }
                if let Some(directives) = field.directives() {
                    if let Some(symbol) = check_directives(&directives, offset) {
                        return Some(symbol);
                    }
                }
                if let Some(nested) = field.selection_set() {
                    if let Some(symbol) = check_selection_set(&nested, offset) {
                        return Some(symbol);
                    }
                }
            }
            cst::Selection::FragmentSpread(spread) => {
                if let Some(name) = spread.fragment_name().and_then(|f| f.name()) {
                    if is_within(&name, offset) {
                        return Some(Symbol::FragmentSpread {
                            name: name.text().to_string(),
                        });
                    }
                }
            }
            cst::Selection::InlineFragment(inline) => {
                if let Some(name) = inline
                    .type_condition()
                    .and_then(|tc| tc.named_type())
                    .and_then(|named| named.name())
                {
                    if is_within(&name, offset) {
                        return Some(Symbol::TypeName {
                            name: name.text().to_string(),
                        });
                    }
                }
                if let Some(nested) = inline.selection_set() {
                    if let Some(symbol) = check_selection_set(&nested, offset) {
                        return Some(symbol);
                    }
                }
            }
        }
    }
    None
}

fn check_arguments(arguments: &cst::Arguments, offset: usize) -> Option<Symbol> {
    for argument in arguments.arguments() {
        if let Some(name) = argument.name() {
            if is_within(&name, offset) {
                return Some(Symbol::ArgumentName {
                    name: name.text().to_string(),
                });
            }
        }
        if let Some(value) = argument.value() {
            if let Some(symbol) = check_value(&value, offset) {
                return Some(symbol);
            }
        }
    }
    None
}

fn check_directives(directives: &cst::Directives, offset: usize) -> Option<Symbol> {
    for directive in directives.directives() {
        if let Some(name) = directive.name() {
            if is_within(&name, offset) {
                return Some(Symbol::DirectiveName {
                    name: name.text().to_string(),
                });
            }
        }
    }
    None
}

fn check_value(value: &cst::Value, offset: usize) -> Option<Symbol> {
    match value {
        cst::Value::Variable(variable) => {
            if is_within(variable, offset) {
                let name = variable.name()?.text().to_string();
                return Some(Symbol::VariableReference { name });
            }
        }
        cst::Value::ListValue(list) => {
            for item in list.values() {
                if let Some(symbol) = check_value(&item, offset) {
                    return Some(symbol);
                }
            }
        }
        cst::Value::ObjectValue(object) => {
            for field in object.object_fields() {
                if let Some(item) = field.value() {
                    if let Some(symbol) = check_value(&item, offset) {
                        return Some(symbol);
                    }
                }
            }
        }
        _ => {}
    }
    None
}

/// Resolve the schema type whose fields are selectable at `offset`.
///
/// Walks from each operation's root type (or a fragment's type condition)
/// down through nested selection sets containing the offset, following
/// field types through the schema.
#[must_use]
pub fn parent_type_at_offset(tree: &SyntaxTree, schema: &Schema, offset: usize) -> Option<String> {
    for definition in tree.document().definitions() {
        match definition {
            cst::Definition::OperationDefinition(op) => {
                let Some(selection_set) = op.selection_set() else {
                    continue;
                };
                if !is_within(&selection_set, offset) {
                    continue;
                }
                let root = root_type_name(schema, op.operation_type().as_ref())?;
                return walk_selection_set(&selection_set, &root, schema, offset);
            }
            cst::Definition::FragmentDefinition(fragment) => {
                let Some(selection_set) = fragment.selection_set() else {
                    continue;
                };
                if !is_within(&selection_set, offset) {
                    continue;
                }
                let condition = fragment
                    .type_condition()
                    .and_then(|tc| tc.named_type())
                    .and_then(|named| named.name())?
                    .text()
                    .to_string();
                return walk_selection_set(&selection_set, &condition, schema, offset);
            }
            _ => {}
        }
    }
    None
}

fn walk_selection_set(
    selection_set: &cst::SelectionSet,
    current_type: &str,
    schema: &Schema,
    offset: usize,
) -> Option<String> {
    for selection in selection_set.selections() {
        match selection {
            cst::Selection::Field(field) => {
                let Some(nested) = field.selection_set() else {
                    continue;
                };
                if !is_within(&nested, offset) {
                    continue;
                }
                let Some(name) = field.name() else {
                    continue;
                };
                let next = field_type_name(schema, current_type, &name.text())?;
                return walk_selection_set(&nested, &next, schema, offset);
            }
            cst::Selection::InlineFragment(inline) => {
                let Some(nested) = inline.selection_set() else {
                    continue;
                };
                if !is_within(&nested, offset) {
                    continue;
                }
                let next = inline
                    .type_condition()
                    .and_then(|tc| tc.named_type())
                    .and_then(|named| named.name())
                    .map_or_else(|| current_type.to_string(), |name| name.text().to_string());
                return walk_selection_set(&nested, &next, schema, offset);
            }
            cst::Selection::FragmentSpread(_) => {}
        }
    }
    // Inside this selection set but not inside any nested one.
    Some(current_type.to_string())
}

/// The root operation type name for an operation's kind, respecting custom
/// root types in the schema definition.
fn root_type_name(schema: &Schema, operation_type: Option<&cst::OperationType>) -> Option<String> {
    use apollo_compiler::ast::OperationType;

    let kind = match operation_type {
        Some(ty) if ty.mutation_token().is_some() => OperationType::Mutation,
        Some(ty) if ty.subscription_token().is_some() => OperationType::Subscription,
        _ => OperationType::Query,
    };
    schema.root_operation(kind).map(ToString::to_string)
}

/// The named type of `field` on `parent`, when `parent` has fields.
#[must_use]
pub fn field_type_name(schema: &Schema, parent: &str, field: &str) -> Option<String> {
    let fields = type_fields(schema, parent)?;
    Some(fields.get(field)?.ty.inner_named_type().to_string())
}

pub(crate) fn type_fields<'a>(
    schema: &'a Schema,
    type_name: &str,
) -> Option<&'a apollo_compiler::collections::IndexMap<
    apollo_compiler::Name,
    apollo_compiler::schema::Component<apollo_compiler::ast::FieldDefinition>,
>> {
    match schema.types.get(type_name)? {
        ExtendedType::Object(object) => Some(&object.fields),
        ExtendedType::Interface(interface) => Some(&interface.fields),
        _ => None,
    }
}

fn is_within<T: CstNode>(node: &T, offset: usize) -> bool {
    let range = node.syntax().text_range();
    let start: usize = range.start().into();
    let end: usize = range.end().into();
    offset >= start && offset < end
}

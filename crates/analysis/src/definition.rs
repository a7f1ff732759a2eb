//! Go-to-definition for fragment spreads.
//!
//! Fragments are the only symbols with an in-workspace definition site; type
//! and field definitions live in the registry schema, which carries no
//! source locations, so those resolve to nothing.

use graphref_documents::{Document, DocumentStore};
use graphref_types::{Location, Position, Range};

use crate::symbol::{find_symbol_at_offset, Symbol};

/// Resolve the definition of the symbol at `position`.
///
/// Fragment spreads are searched across every open document; the spread's
/// own document wins ties by being checked first.
#[must_use]
pub fn definition(
    document: &Document,
    store: &DocumentStore,
    position: Position,
) -> Option<Location> {
    let text = document.text();
    let offset = document.line_index().offset(text, position)?;
    let tree = apollo_parser::Parser::new(text).parse();

    let Symbol::FragmentSpread { name } = find_symbol_at_offset(&tree, offset)? else {
        return None;
    };

    find_fragment(document, &name)
        .or_else(|| store.iter().find_map(|other| find_fragment(other, &name)))
}

fn find_fragment(document: &Document, name: &str) -> Option<Location> {
    let parse = document.parse();
    let fragment = parse.fragments.iter().find(|f| f.name == name)?;

    let text = document.text();
    let index = document.line_index();
    let range = Range::new(
        index.position(text, fragment.name_range.start),
        index.position(text, fragment.name_range.end),
    );
    Some(Location {
        uri: document.uri().clone(),
        range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphref_types::Position;

    fn store_with(documents: &[(&str, &str)]) -> DocumentStore {
        let mut store = DocumentStore::new();
        for (uri, text) in documents {
            store.open(*uri, 1, *text);
        }
        store
    }

    #[test]
    fn test_fragment_defined_in_same_document() {
        let text = "query { user { ...Bits } }\nfragment Bits on User { id }";
        let store = store_with(&[("file:///a.graphql", text)]);
        let document = store.get("file:///a.graphql").unwrap();

        let offset = text.find("Bits").unwrap() + 1;
        let position = document.line_index().position(text, offset);
        let location = definition(document, &store, position).unwrap();

        assert_eq!(&*location.uri, "file:///a.graphql");
        assert_eq!(location.range.start.line, 1);
        let def_offset = text.rfind("Bits").unwrap();
        let expected = document.line_index().position(text, def_offset);
        assert_eq!(location.range.start, expected);
    }

    #[test]
    fn test_fragment_defined_in_another_document() {
        let query = "query { user { ...Shared } }";
        let fragments = "fragment Shared on User { id name }";
        let store = store_with(&[
            ("file:///query.graphql", query),
            ("file:///fragments.graphql", fragments),
        ]);
        let document = store.get("file:///query.graphql").unwrap();

        let offset = query.find("Shared").unwrap();
        let position = document.line_index().position(query, offset);
        let location = definition(document, &store, position).unwrap();

        assert_eq!(&*location.uri, "file:///fragments.graphql");
        assert_eq!(location.range.start, Position::new(0, 9));
    }

    #[test]
    fn test_unknown_fragment_has_no_definition() {
        let text = "query { user { ...Missing } }";
        let store = store_with(&[("file:///a.graphql", text)]);
        let document = store.get("file:///a.graphql").unwrap();

        let offset = text.find("Missing").unwrap();
        let position = document.line_index().position(text, offset);
        assert_eq!(definition(document, &store, position), None);
    }

    #[test]
    fn test_schema_symbols_have_no_definition() {
        let text = "query { user { id } }";
        let store = store_with(&[("file:///a.graphql", text)]);
        let document = store.get("file:///a.graphql").unwrap();

        let offset = text.find("user").unwrap();
        let position = document.line_index().position(text, offset);
        assert_eq!(definition(document, &store, position), None);
    }
}

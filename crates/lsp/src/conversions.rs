//! Conversions between core types and `lsp-types`.
//!
//! Stateless functions usable from any handler. Positions are 0-indexed
//! UTF-16 on both sides, so position and range conversions are field moves.

use lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, Hover, HoverContents,
    Location, MarkupContent, MarkupKind, NumberOrString, Position, Range, Uri,
};

pub fn to_lsp_position(position: graphref_types::Position) -> Position {
    Position {
        line: position.line,
        character: position.character,
    }
}

pub const fn from_lsp_position(position: Position) -> graphref_types::Position {
    graphref_types::Position::new(position.line, position.character)
}

pub fn to_lsp_range(range: graphref_types::Range) -> Range {
    Range {
        start: to_lsp_position(range.start),
        end: to_lsp_position(range.end),
    }
}

pub fn to_lsp_diagnostic(diagnostic: graphref_types::Diagnostic) -> Diagnostic {
    let severity = match diagnostic.severity {
        graphref_types::DiagnosticSeverity::Error => DiagnosticSeverity::ERROR,
        graphref_types::DiagnosticSeverity::Warning => DiagnosticSeverity::WARNING,
        graphref_types::DiagnosticSeverity::Information => DiagnosticSeverity::INFORMATION,
        graphref_types::DiagnosticSeverity::Hint => DiagnosticSeverity::HINT,
    };
    Diagnostic {
        range: to_lsp_range(diagnostic.range),
        severity: Some(severity),
        code: diagnostic.code.map(NumberOrString::String),
        source: Some("graphref".to_string()),
        message: diagnostic.message,
        ..Diagnostic::default()
    }
}

pub fn to_lsp_completion_item(item: graphref_analysis::CompletionItem) -> CompletionItem {
    let kind = match item.kind {
        graphref_analysis::CompletionKind::Field => CompletionItemKind::FIELD,
        graphref_analysis::CompletionKind::Fragment => CompletionItemKind::SNIPPET,
        graphref_analysis::CompletionKind::Type => CompletionItemKind::CLASS,
        graphref_analysis::CompletionKind::Directive => CompletionItemKind::KEYWORD,
        graphref_analysis::CompletionKind::Argument => CompletionItemKind::VARIABLE,
        graphref_analysis::CompletionKind::EnumValue => CompletionItemKind::ENUM_MEMBER,
    };
    CompletionItem {
        label: item.label,
        kind: Some(kind),
        detail: item.detail,
        ..CompletionItem::default()
    }
}

pub fn to_lsp_hover(hover: graphref_analysis::Hover) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: hover.content,
        }),
        range: None,
    }
}

pub fn to_lsp_location(location: &graphref_types::Location) -> Option<Location> {
    let uri: Uri = location.uri.parse().ok()?;
    Some(Location {
        uri,
        range: to_lsp_range(location.range),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_conversion_keeps_code_and_severity() {
        let diagnostic = graphref_types::Diagnostic::warning(
            graphref_types::Range::new(
                graphref_types::Position::new(1, 2),
                graphref_types::Position::new(1, 9),
            ),
            "field is deprecated",
        )
        .with_code("validation");

        let converted = to_lsp_diagnostic(diagnostic);
        assert_eq!(converted.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(
            converted.code,
            Some(NumberOrString::String("validation".to_string()))
        );
        assert_eq!(converted.range.start, Position::new(1, 2));
        assert_eq!(converted.source.as_deref(), Some("graphref"));
    }

    #[test]
    fn test_location_conversion_round_trips_uri() {
        let location = graphref_types::Location::new(
            "file:///tmp/queries/user.graphql",
            graphref_types::Range::new(
                graphref_types::Position::new(0, 9),
                graphref_types::Position::new(0, 13),
            ),
        );
        let converted = to_lsp_location(&location).unwrap();
        assert_eq!(converted.uri.as_str(), "file:///tmp/queries/user.graphql");
    }
}

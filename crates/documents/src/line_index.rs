//! Byte offset <-> editor position conversion.

use graphref_types::Position;

/// Precomputed line starts for a document, for O(log n) offset/position
/// conversion. Character offsets are UTF-16 code units, per LSP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.char_indices().filter_map(|(i, c)| {
            (c == '\n').then_some(i + 1)
        }));
        Self { line_starts }
    }

    /// Convert a byte offset into an editor position.
    ///
    /// Offsets past the end of `text` clamp to the end.
    #[must_use]
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insertion) => insertion - 1,
        };
        let line_start = self.line_starts[line];
        let character = text[line_start..offset].encode_utf16().count();
        Position::new(line as u32, character as u32)
    }

    /// Convert an editor position into a byte offset.
    ///
    /// Returns `None` when the line does not exist; a character offset past
    /// the end of its line clamps to the line end.
    #[must_use]
    pub fn offset(&self, text: &str, position: Position) -> Option<usize> {
        let line_start = *self.line_starts.get(position.line as usize)?;
        let line_end = self
            .line_starts
            .get(position.line as usize + 1)
            .map_or(text.len(), |next| next - 1)
            .min(text.len());

        let mut utf16_remaining = position.character as usize;
        for (i, c) in text[line_start..line_end].char_indices() {
            if utf16_remaining == 0 {
                return Some(line_start + i);
            }
            utf16_remaining = utf16_remaining.saturating_sub(c.len_utf16());
        }
        Some(line_end)
    }

    /// Number of lines in the indexed text.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_at_line_starts() {
        let text = "query {\n  a\n}\n";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.position(text, 0), Position::new(0, 0));
        assert_eq!(index.position(text, 8), Position::new(1, 0));
        assert_eq!(index.position(text, 10), Position::new(1, 2));
        assert_eq!(index.position(text, 12), Position::new(2, 0));
    }

    #[test]
    fn test_position_clamps_past_end() {
        let text = "a";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 100), Position::new(0, 1));
    }

    #[test]
    fn test_offset_round_trip() {
        let text = "query Q {\n  user\n}";
        let index = LineIndex::new(text);
        for offset in [0, 5, 9, 12, 16, text.len()] {
            let position = index.position(text, offset);
            assert_eq!(index.offset(text, position), Some(offset));
        }
    }

    #[test]
    fn test_offset_missing_line() {
        let text = "a\nb";
        let index = LineIndex::new(text);
        assert_eq!(index.offset(text, Position::new(5, 0)), None);
    }

    #[test]
    fn test_offset_clamps_to_line_end() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset(text, Position::new(0, 99)), Some(2));
    }

    #[test]
    fn test_utf16_characters() {
        // '𝄞' is 4 bytes in UTF-8 and 2 code units in UTF-16.
        let text = "𝄞ab";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 4), Position::new(0, 2));
        assert_eq!(index.offset(text, Position::new(0, 2)), Some(4));
        assert_eq!(index.position(text, 5), Position::new(0, 3));
    }
}

//! Grapheme-indexed text storage.
//!
//! Every index handed out by the editing core counts extended grapheme
//! clusters, never bytes or UTF-16 units. The native textarea speaks UTF-16,
//! so conversions for that boundary live here too.

use std::borrow::Cow;
use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug, PartialEq)]
pub struct TextBuffer {
    text: String,
    // Byte offset of every grapheme start, followed by `text.len()`.
    bounds: Vec<usize>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        TextBuffer { text: String::new(), bounds: vec![0] }
    }
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        let mut buffer = TextBuffer { text: normalize_newlines(text).into_owned(), bounds: Vec::new() };
        buffer.rebuild();
        buffer
    }

    fn rebuild(&mut self) {
        self.bounds.clear();
        self.bounds.extend(self.text.grapheme_indices(true).map(|(i, _)| i));
        self.bounds.push(self.text.len());
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of graphemes.
    pub fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn grapheme(&self, index: usize) -> Option<&str> {
        if index >= self.len() {
            return None;
        }
        Some(&self.text[self.bounds[index]..self.bounds[index + 1]])
    }

    pub fn graphemes(&self) -> impl Iterator<Item = &str> + '_ {
        self.bounds.windows(2).map(move |w| &self.text[w[0]..w[1]])
    }

    pub fn byte_offset(&self, index: usize) -> usize {
        self.bounds[index.min(self.len())]
    }

    /// Text of the graphemes in `range`, clamped to the buffer.
    pub fn slice(&self, range: Range<usize>) -> &str {
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end.max(range.start));
        &self.text[start..end]
    }

    pub fn is_newline(&self, index: usize) -> bool {
        self.grapheme(index) == Some("\n")
    }

    /// Replace the graphemes in `range` with `insert`. Returns the number of
    /// graphemes the buffer grew by relative to the removed range.
    pub fn splice(&mut self, range: Range<usize>, insert: &str) -> usize {
        let len_before = self.len();
        let start = range.start.min(len_before);
        let end = range.end.clamp(start, len_before);
        let bytes = self.byte_offset(start)..self.byte_offset(end);
        self.text.replace_range(bytes, &normalize_newlines(insert));
        self.rebuild();
        (self.len() + (end - start)).saturating_sub(len_before)
    }

    /// UTF-16 offset of grapheme `index`.
    pub fn to_utf16(&self, index: usize) -> usize {
        self.text[..self.byte_offset(index)].encode_utf16().count()
    }

    /// Grapheme index containing UTF-16 offset `units`.
    pub fn from_utf16(&self, units: usize) -> usize {
        utf16_to_grapheme(&self.text, units)
    }
}

pub fn grapheme_count(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Map a UTF-16 offset inside `value` to a grapheme index, rounding down to
/// the start of the grapheme the offset falls in.
pub fn utf16_to_grapheme(value: &str, units: usize) -> usize {
    let mut seen = 0;
    for (index, grapheme) in value.graphemes(true).enumerate() {
        let width = grapheme.encode_utf16().count();
        if seen + width > units {
            return index;
        }
        seen += width;
    }
    grapheme_count(value)
}

/// Normalize newlines (CRLF/CR to LF).
pub fn normalize_newlines(s: &str) -> Cow<'_, str> {
    if !s.contains('\r') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut it = s.chars().peekable();
    while let Some(ch) = it.next() {
        match ch {
            '\r' => {
                if it.peek() == Some(&'\n') {
                    let _ = it.next();
                }
                out.push('\n');
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_graphemes_not_chars() {
        let buffer = TextBuffer::new("e\u{301}a👍🏽");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.grapheme(0), Some("e\u{301}"));
        assert_eq!(buffer.grapheme(2), Some("👍🏽"));
        assert_eq!(buffer.grapheme(3), None);
    }

    #[test]
    fn splice_reports_growth() {
        let mut buffer = TextBuffer::new("hello world");
        assert_eq!(buffer.splice(5..11, "!"), 1);
        assert_eq!(buffer.as_str(), "hello!");
        assert_eq!(buffer.splice(0..0, "oh "), 3);
        assert_eq!(buffer.as_str(), "oh hello!");
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let mut buffer = TextBuffer::new("abc");
        buffer.splice(2..99, "Z");
        assert_eq!(buffer.as_str(), "abZ");
        buffer.splice(50..60, "!");
        assert_eq!(buffer.as_str(), "abZ!");
    }

    #[test]
    fn newlines_are_normalized_on_write() {
        let mut buffer = TextBuffer::new("a\r\nb\rc");
        assert_eq!(buffer.as_str(), "a\nb\nc");
        buffer.splice(1..1, "\r\n");
        assert_eq!(buffer.as_str(), "a\n\nb\nc");
        assert!(buffer.is_newline(1));
    }

    #[test]
    fn utf16_round_trip() {
        let buffer = TextBuffer::new("a😀b");
        assert_eq!(buffer.to_utf16(2), 3);
        assert_eq!(buffer.from_utf16(3), 2);
        // Inside the surrogate pair rounds down.
        assert_eq!(buffer.from_utf16(2), 1);
        assert_eq!(buffer.from_utf16(100), 3);
    }

    #[test]
    fn slice_by_grapheme_range() {
        let buffer = TextBuffer::new("héllo");
        assert_eq!(buffer.slice(1..3), "él");
        assert_eq!(buffer.slice(3..1), "");
    }
}

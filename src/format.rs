//! Markdown-style inline formatting applied to a character range.

/// Half-open `[start, end)` range in characters (not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Builds a selection, returning `None` for a caret or an inverted range.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the range lies within a text of `char_len` characters.
    pub fn fits(&self, char_len: usize) -> bool {
        self.start <= self.end && self.end <= char_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatting {
    Bold,
    Italic,
    Underline,
}

impl Formatting {
    pub fn marker(self) -> &'static str {
        match self {
            Formatting::Bold => "**",
            Formatting::Italic => "*",
            Formatting::Underline => "__",
        }
    }
}

/// Byte offset of the `idx`-th character, or `text.len()` past the end.
pub(crate) fn byte_offset(text: &str, idx: usize) -> usize {
    text.char_indices()
        .nth(idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

/// Slice of `text` covered by a char-based selection.
pub fn selected_text<'a>(text: &'a str, selection: Selection) -> &'a str {
    let start = byte_offset(text, selection.start);
    let end = byte_offset(text, selection.end);
    &text[start..end]
}

/// Wraps the selected substring in `kind`'s marker pair.
///
/// Returns the new text and a selection covering the wrapped substring,
/// markers included. `None` when the selection is empty or out of range.
pub fn apply_format(text: &str, selection: Selection, kind: Formatting) -> Option<(String, Selection)> {
    if selection.is_empty() || !selection.fits(text.chars().count()) {
        return None;
    }
    let marker = kind.marker();
    let start = byte_offset(text, selection.start);
    let end = byte_offset(text, selection.end);

    let mut out = String::with_capacity(text.len() + marker.len() * 2);
    out.push_str(&text[..start]);
    out.push_str(marker);
    out.push_str(&text[start..end]);
    out.push_str(marker);
    out.push_str(&text[end..]);

    let grown = marker.chars().count() * 2;
    let wrapped = Selection {
        start: selection.start,
        end: selection.end + grown,
    };
    Some((out, wrapped))
}

use crate::format::{byte_offset, Selection};
use regex::{NoExpand, Regex, RegexBuilder};

/// Literal, case-insensitive find & replace over the document.
#[derive(Debug, Default)]
pub struct FindReplace {
    query: String,
    replacement: String,
    pattern: Option<Regex>,
    matches: Vec<Selection>,
    current: Option<usize>,
}

fn build_pattern(query: &str) -> Option<Regex> {
    if query.is_empty() {
        return None;
    }
    match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Could not build search pattern for {:?}: {}", query, e);
            None
        }
    }
}

/// Match ranges converted from byte to char offsets in a single pass.
fn char_ranges(pattern: &Regex, text: &str) -> Vec<Selection> {
    let mut ranges = Vec::new();
    let mut chars_seen = 0;
    let mut bytes_seen = 0;
    for m in pattern.find_iter(text) {
        chars_seen += text[bytes_seen..m.start()].chars().count();
        let start = chars_seen;
        chars_seen += m.as_str().chars().count();
        bytes_seen = m.end();
        if let Some(sel) = Selection::new(start, chars_seen) {
            ranges.push(sel);
        }
    }
    ranges
}

impl FindReplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn set_replacement(&mut self, replacement: impl Into<String>) {
        self.replacement = replacement.into();
    }

    /// Sets the search term and selects the first match, if any.
    pub fn set_query(&mut self, query: impl Into<String>, text: &str) -> Option<Selection> {
        self.query = query.into();
        self.pattern = build_pattern(&self.query);
        self.current = None;
        self.refresh(text);
        self.current_match()
    }

    /// Recomputes matches after the document changed underneath.
    pub fn refresh(&mut self, text: &str) {
        self.matches = match &self.pattern {
            Some(pattern) => char_ranges(pattern, text),
            None => Vec::new(),
        };
        self.current = match (self.matches.len(), self.current) {
            (0, _) => None,
            (n, Some(i)) => Some(i.min(n - 1)),
            (_, None) => Some(0),
        };
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn current_match(&self) -> Option<Selection> {
        self.current.and_then(|i| self.matches.get(i).copied())
    }

    /// `"2 / 5"` style position, `"0 / 0"` without matches.
    pub fn position_label(&self) -> String {
        match self.current {
            Some(i) if !self.matches.is_empty() => format!("{} / {}", i + 1, self.matches.len()),
            _ => "0 / 0".to_string(),
        }
    }

    pub fn find_next(&mut self) -> Option<Selection> {
        let n = self.matches.len();
        if n == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(0, |i| (i + 1) % n));
        self.current_match()
    }

    pub fn find_prev(&mut self) -> Option<Selection> {
        let n = self.matches.len();
        if n == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(n - 1, |i| (i + n - 1) % n));
        self.current_match()
    }

    /// Replaces the current match and returns the new text.
    pub fn replace(&mut self, text: &str) -> Option<String> {
        let target = self.current_match()?;
        let start = byte_offset(text, target.start);
        let end = byte_offset(text, target.end);
        let mut out = String::with_capacity(text.len() + self.replacement.len());
        out.push_str(&text[..start]);
        out.push_str(&self.replacement);
        out.push_str(&text[end..]);
        self.refresh(&out);
        Some(out)
    }

    /// Replaces every match, returning the new text and how many were replaced.
    pub fn replace_all(&mut self, text: &str) -> Option<(String, usize)> {
        let pattern = self.pattern.as_ref()?;
        let count = self.matches.len();
        if count == 0 {
            return None;
        }
        let out = pattern
            .replace_all(text, NoExpand(self.replacement.as_str()))
            .into_owned();
        self.current = None;
        self.refresh(&out);
        Some((out, count))
    }
}

//! Byte-span text edits
//!
//! Rewriting stages compute edits against the syntax tree of the original
//! content and splice them in one pass, last edit first, so earlier offsets
//! stay valid.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    /// Text the span held when the edit was computed
    pub original: String,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(content: &str, start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            original: content.get(start..end).unwrap_or_default().to_string(),
            replacement: replacement.into(),
        }
    }

    /// Delete a statement together with the line break that follows it
    pub fn delete_statement(content: &str, start: usize, end: usize) -> Self {
        Self::replace(content, start, line_end(content, end), "")
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            original: String::new(),
            replacement: text.into(),
        }
    }
}

/// Offset just past the line break following `offset`, if only whitespace
/// separates them
pub fn line_end(content: &str, offset: usize) -> usize {
    let rest = content.get(offset..).unwrap_or_default();
    let trailing = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let after_spaces = offset + trailing;
    match content.get(after_spaces..) {
        Some(tail) if tail.starts_with("\r\n") => after_spaces + 2,
        Some(tail) if tail.starts_with('\n') => after_spaces + 1,
        _ => offset,
    }
}

/// Apply edits; overlapping edits keep the outermost, stale edits are skipped
pub fn apply_edits(content: &str, edits: &[TextEdit]) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    // Same start: inserts first, then the widest span
    ordered.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((a.start != a.end).cmp(&(b.start != b.end)))
            .then(b.end.cmp(&a.end))
    });

    let mut accepted: Vec<&TextEdit> = Vec::new();
    let mut covered_until = 0;
    for edit in ordered {
        if content.get(edit.start..edit.end) != Some(edit.original.as_str()) {
            tracing::debug!(start = edit.start, end = edit.end, "skipping stale edit");
            continue;
        }
        if edit.start < covered_until {
            continue;
        }
        covered_until = covered_until.max(edit.end);
        accepted.push(edit);
    }

    let mut result = content.to_string();
    for edit in accepted.iter().rev() {
        result.replace_range(edit.start..edit.end, &edit.replacement);
    }
    result
}

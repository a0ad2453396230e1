//! Cursor-aware completion for structured fields inside free text.
//!
//! All positions are counted in `char`s, never bytes, so multi-byte input
//! such as emoji keeps cursor and context indices aligned.

use std::collections::HashSet;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Maximum number of suggestions shown at once.
pub const MAX_VISIBLE: usize = 5;

/// How the field under the cursor is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `bug, feature, docs`
    CommaList,
    /// `@user` tokens inside prose
    Mention,
    /// space separated words
    Whitespace,
}

/// The field under the cursor. `start..end` is a char range into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub is_first: bool,
    pub is_last: bool,
}

impl FieldContext {
    fn new(chars: &[char], start: usize, end: usize, text: String) -> Self {
        Self {
            text,
            start,
            end,
            is_first: start == 0,
            is_last: end == chars.len(),
        }
    }

    fn empty() -> Self {
        Self {
            text: String::new(),
            start: 0,
            end: 0,
            is_first: true,
            is_last: true,
        }
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_word_boundary(c: char) -> bool {
    is_whitespace(c)
        || matches!(
            c,
            ',' | '.' | '!' | '?' | ';' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>'
                | '"' | '\'' | '`'
        )
}

/// Span `[start, end)` around `cursor` delimited by `is_boundary`.
fn span_around(chars: &[char], cursor: usize, is_boundary: impl Fn(char) -> bool) -> (usize, usize) {
    let start = chars[..cursor]
        .iter()
        .rposition(|&c| is_boundary(c))
        .map_or(0, |i| i + 1);
    let end = chars[cursor..]
        .iter()
        .position(|&c| is_boundary(c))
        .map_or(chars.len(), |i| cursor + i);
    (start, end)
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Locate the field containing `cursor`.
///
/// Returns `None` only in [`Mode::Mention`] when the cursor is not inside an `@` token.
pub fn extract_context(input: &str, cursor: usize, mode: Mode) -> Option<FieldContext> {
    if input.is_empty() {
        return match mode {
            Mode::Mention => None,
            _ => Some(FieldContext::empty()),
        };
    }

    let chars: Vec<char> = input.chars().collect();
    let cursor = cursor.min(chars.len());

    match mode {
        Mode::CommaList => {
            let (start, end) = span_around(&chars, cursor, |c| c == ',');
            let text = collect(&chars[start..end]).trim().to_string();
            Some(FieldContext::new(&chars, start, end, text))
        }
        Mode::Whitespace => {
            let (start, end) = span_around(&chars, cursor, is_whitespace);
            let text = collect(&chars[start..end]).trim().to_string();
            Some(FieldContext::new(&chars, start, end, text))
        }
        Mode::Mention => {
            let (start, end) = span_around(&chars, cursor, is_word_boundary);
            if start >= chars.len() || chars[start] != '@' {
                return None;
            }
            let text = collect(&chars[start + 1..end.max(start + 1)]);
            Some(FieldContext::new(&chars, start, end, text))
        }
    }
}

/// Replace the field `[start, end)` with `suggestion`. Pure: the result depends only on the arguments.
///
/// Returns the new text and the cursor position right after the inserted suggestion.
pub fn insert_suggestion(
    input: &str,
    suggestion: &str,
    start: usize,
    end: usize,
    mode: Mode,
) -> (String, usize) {
    let chars: Vec<char> = input.chars().collect();
    let start = start.min(chars.len());
    let end = end.clamp(start, chars.len());
    let head = collect(&chars[..start]);

    let (replacement, tail) = match mode {
        Mode::CommaList => {
            let replacement = if head.trim().is_empty() {
                format!("{}, ", suggestion)
            } else {
                format!(" {}, ", suggestion)
            };
            let rest = collect(&chars[end..]);
            let rest = rest.strip_prefix(',').unwrap_or(&rest);
            let rest = rest.trim_start_matches([' ', '\t']).to_string();
            (replacement, rest)
        }
        Mode::Mention => (format!("@{} ", suggestion), collect(&chars[end..])),
        Mode::Whitespace => (format!("{} ", suggestion), collect(&chars[end..])),
    };

    let cursor = start + replacement.chars().count();
    (format!("{}{}{}", head, replacement, tail), cursor)
}

fn comma_items(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Values already present in the input that should not be suggested again.
pub fn items_to_exclude(input: &str, cursor: usize, mode: Mode) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    match mode {
        // repeated mentions are legal
        Mode::Mention => Vec::new(),
        Mode::CommaList => {
            let chars: Vec<char> = input.chars().collect();
            let cursor = cursor.min(chars.len());
            let (start, end) = span_around(&chars, cursor, |c| c == ',');
            let before = collect(&chars[..start]);
            let after = collect(&chars[end..]);
            comma_items(&before)
                .chain(comma_items(&after))
                .map(str::to_string)
                .collect()
        }
        Mode::Whitespace => {
            let current = extract_context(input, cursor, mode)
                .map(|ctx| ctx.text)
                .unwrap_or_default();
            input
                .split_whitespace()
                .filter(|w| *w != current)
                .map(str::to_string)
                .collect()
        }
    }
}

/// Match tier of `candidate`: prefix, then substring, then skim fuzzy score.
fn score(matcher: &SkimMatcherV2, candidate: &str, query: &str) -> Option<(u8, i64)> {
    let candidate = candidate.to_lowercase();
    if candidate.starts_with(query) {
        Some((2, 0))
    } else if candidate.contains(query) {
        Some((1, 0))
    } else if query.is_empty() {
        None
    } else {
        matcher.fuzzy_match(&candidate, query).map(|sc| (0, sc))
    }
}

/// Rank `pool` against `query`: prefix matches, then substring, then fuzzy.
/// Fuzzy matches are ordered by score, everything else alphabetically.
/// Excluded values compare case-insensitively.
pub fn rank(pool: &[String], query: &str, exclude: &[String], limit: usize) -> Vec<String> {
    let query = query.trim().to_lowercase();
    let excluded: HashSet<String> = exclude.iter().map(|e| e.trim().to_lowercase()).collect();
    let matcher = SkimMatcherV2::default();

    let mut matches: Vec<((u8, i64), &String)> = pool
        .iter()
        .filter(|s| !excluded.contains(&s.to_lowercase()))
        .filter_map(|s| score(&matcher, s, &query).map(|sc| (sc, s)))
        .collect();

    matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    matches
        .into_iter()
        .take(limit)
        .map(|(_, s)| s.clone())
        .collect()
}

/// Suggestion popup state attached to a text input.
#[derive(Debug, Clone)]
pub struct Autocomplete {
    pub mode: Mode,
    suggestions: Vec<String>,
    filtered: Vec<String>,
    selected: usize,
    visible: bool,
}

impl Autocomplete {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            suggestions: Vec::new(),
            filtered: Vec::new(),
            selected: 0,
            visible: false,
        }
    }

    pub fn set_suggestions(&mut self, suggestions: Vec<String>) {
        self.suggestions = suggestions;
    }

    pub fn has_suggestions(&self) -> bool {
        !self.suggestions.is_empty()
    }

    /// Recompute matches for the field under `cursor`. The popup opens only
    /// while something is typed; [`Autocomplete::show`] forces it open.
    pub fn filter(&mut self, input: &str, cursor: usize) {
        let Some(ctx) = extract_context(input, cursor, self.mode) else {
            self.filtered.clear();
            self.visible = false;
            return;
        };
        let exclude = items_to_exclude(input, cursor, self.mode);
        self.filtered = rank(&self.suggestions, &ctx.text, &exclude, MAX_VISIBLE);
        self.selected = 0;
        self.visible = !self.filtered.is_empty() && !ctx.text.is_empty();
    }

    /// Apply the selected suggestion to `input`, returning the new text and cursor.
    pub fn accept(&mut self, input: &str, cursor: usize) -> Option<(String, usize)> {
        let suggestion = self.selected()?.to_string();
        let ctx = extract_context(input, cursor, self.mode)?;
        self.hide();
        Some(insert_suggestion(
            input,
            &suggestion,
            ctx.start,
            ctx.end,
            self.mode,
        ))
    }

    pub fn filtered(&self) -> &[String] {
        &self.filtered
    }

    pub fn selected(&self) -> Option<&str> {
        self.filtered.get(self.selected).map(String::as_str)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn next(&mut self) {
        if !self.filtered.is_empty() {
            self.selected = (self.selected + 1) % self.filtered.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.filtered.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.filtered.len() - 1);
        }
    }

    pub fn show(&mut self) {
        self.visible = !self.filtered.is_empty();
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

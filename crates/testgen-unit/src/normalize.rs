//! Source normalization ahead of fingerprinting
//!
//! Strips comments and collapses whitespace so that formatting-only edits
//! never change a unit's fingerprint. The scanner is string-aware: `#`
//! inside a string literal is content, not a comment. Leading indentation
//! is block structure in Python and is kept.

/// Normalize Python source text for fingerprinting.
///
/// - `#` comments are removed (outside string literals)
/// - leading indentation is kept, with tabs canonicalized to four spaces
/// - internal whitespace runs collapse to one space
/// - blank lines are dropped
///
/// The result is a deterministic function of the semantically relevant
/// bytes, so reformatting and comment edits hash identically while a
/// statement moving between blocks does not.
#[must_use]
pub fn normalize_source(source: &str) -> String {
    let stripped = strip_comments(source);
    let mut out = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let collapsed = collapse_whitespace(line);
        if collapsed.is_empty() {
            continue;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }
    out
}

/// Tracks which string delimiter the scanner is inside, if any.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StrState {
    None,
    Single(char),
    Triple(char),
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let chars: Vec<char> = source.chars().collect();
    let mut state = StrState::None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            StrState::None => {
                if c == '#' {
                    // Skip to end of line, keep the newline
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                if c == '\'' || c == '"' {
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        state = StrState::Triple(c);
                        out.push(c);
                        out.push(c);
                        out.push(c);
                        i += 3;
                        continue;
                    }
                    state = StrState::Single(c);
                }
                out.push(c);
                i += 1;
            }
            StrState::Single(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else if c == q || c == '\n' {
                    state = StrState::None;
                }
                i += 1;
            }
            StrState::Triple(q) => {
                if c == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                    out.push(q);
                    out.push(q);
                    out.push(q);
                    state = StrState::None;
                    i += 3;
                    continue;
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn collapse_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    // Indentation carries block structure; tabs canonicalize to four
    // spaces so equivalent levels hash identically
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        if chars[i] == '\t' {
            out.push_str("    ");
        } else {
            out.push(' ');
        }
        i += 1;
    }

    let mut state = StrState::None;
    let mut last_was_space = true;

    while i < chars.len() {
        let c = chars[i];
        match state {
            StrState::None => {
                if c == ' ' || c == '\t' {
                    if !last_was_space {
                        out.push(' ');
                        last_was_space = true;
                    }
                    i += 1;
                    continue;
                }
                if c == '\'' || c == '"' {
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        state = StrState::Triple(c);
                        out.push(c);
                        out.push(c);
                        out.push(c);
                        last_was_space = false;
                        i += 3;
                        continue;
                    }
                    state = StrState::Single(c);
                }
                out.push(c);
                last_was_space = false;
                i += 1;
            }
            StrState::Single(q) => {
                out.push(c);
                last_was_space = false;
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else if c == q {
                    state = StrState::None;
                }
                i += 1;
            }
            StrState::Triple(q) => {
                if c == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                    out.push(q);
                    out.push(q);
                    out.push(q);
                    state = StrState::None;
                    last_was_space = false;
                    i += 3;
                    continue;
                }
                out.push(c);
                last_was_space = false;
                i += 1;
            }
        }
    }
    out.trim_end().to_string()
}

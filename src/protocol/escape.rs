//! Key and value escaping
//!
//! Keys crossing the external framing (and keys used as file names) escape
//! characters that would otherwise split or corrupt them. Values escape only
//! what would break the line.

/// Escape backslash, tab, backspace, newline, return, form-feed, quotes and
/// space
pub fn escape(key: &str) -> String {
    escape_chars(key, true)
}

/// Escape a value for the text framing
///
/// Like `escape`, but spaces and quotes pass through so multi-word values
/// stay readable; `unescape` reverses it.
pub fn escape_value(value: &str) -> String {
    escape_chars(value, false)
}

fn escape_chars(text: &str, separators: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '\'' if separators => out.push_str("\\'"),
            '"' if separators => out.push_str("\\\""),
            ' ' if separators => out.push_str("\\ "),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of `escape`
///
/// Single left-to-right pass, so `\\t` is a backslash followed by `t`.
/// Unknown escapes are kept verbatim.
pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(' ') => out.push(' '),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split off the first token of `text`, honouring backslash escapes.
///
/// Returns `(token, rest)` with leading whitespace of `rest` left in place.
pub(crate) fn split_escaped_token(text: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c.is_whitespace() {
            return (&text[..i], &text[i..]);
        }
    }
    (text, "")
}

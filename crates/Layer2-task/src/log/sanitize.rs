//! Cosmetic repair for log messages
//!
//! Two passes:
//! 1. Known mis-decoded sequences (UTF-8 read as Windows-1252) are mapped back
//!    to the intended character. The table is closed and only covers what has
//!    been observed in script output; it is not an encoding fix.
//! 2. Invalid-character placeholders (U+FFFD, NUL) become a visible marker.
//!
//! The correction pass runs to a fixpoint, so the result never contains a table
//! key and `sanitize_message` is idempotent.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Visible marker for characters that could not be decoded
pub const REPLACEMENT_MARKER: &str = "[?]";

const GARBLED: &[(&str, &str)] = &[
    ("â€™", "’"),
    ("â€˜", "‘"),
    ("â€œ", "“"),
    ("â€\u{9d}", "”"),
    ("â€“", "–"),
    ("â€”", "—"),
    ("â€¦", "…"),
    ("â€¢", "•"),
    ("âœ…", "✅"),
    ("â\u{9d}Œ", "❌"),
    ("âš\u{a0}ï¸\u{8f}", "⚠️"),
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ã¡", "á"),
    ("Ã³", "ó"),
    ("Ã±", "ñ"),
    ("Ã¼", "ü"),
    ("Ã¶", "ö"),
    ("Ã¤", "ä"),
];

fn garbled_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut keys: Vec<&str> = GARBLED.iter().map(|(from, _)| *from).collect();
        // longest first so overlapping keys prefer the fuller match
        keys.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));
        let alternation = keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&alternation).expect("garbled table builds a valid regex")
    })
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[\u{FFFD}\u{0}]+").expect("valid placeholder regex"))
}

fn correction(garbled: &str) -> &'static str {
    GARBLED
        .iter()
        .find(|(from, _)| *from == garbled)
        .map(|(_, to)| *to)
        .unwrap_or("")
}

/// Sanitize a log message. Clean input is returned borrowed.
pub fn sanitize_message(input: &str) -> Cow<'_, str> {
    let mut text = Cow::Borrowed(input);

    // every replacement shortens the text, so this terminates
    while garbled_pattern().is_match(&text) {
        let fixed = garbled_pattern()
            .replace_all(&text, |caps: &regex::Captures| correction(&caps[0]))
            .into_owned();
        text = Cow::Owned(fixed);
    }

    if placeholder_pattern().is_match(&text) {
        let marked = placeholder_pattern()
            .replace_all(&text, REPLACEMENT_MARKER)
            .into_owned();
        text = Cow::Owned(marked);
    }

    text
}

/// Whether a sanitized message still carries replacement markers
pub fn needs_review(sanitized: &str) -> bool {
    sanitized.contains(REPLACEMENT_MARKER)
}

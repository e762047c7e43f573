//! Text cleaning: deterministic normalisation of extracted text.
//!
//! Extraction backends hand back text with layout noise: hard line breaks
//! inside sentences, runs of spaces used for alignment, zero-width joiners,
//! stray control characters. None of that is content, and all of it would
//! make two extractions of the same document hash differently. The rules
//! below remove it without touching the words themselves.
//!
//! ## Rule Order
//!
//! Line endings are normalised before control characters are stripped (so a
//! lone `\r` becomes whitespace rather than disappearing), and whitespace is
//! collapsed last so the earlier rules cannot leave double spaces behind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleaning rules.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 3. Replace non-whitespace control characters with a space
/// 4. Collapse every whitespace run into a single space
/// 5. Trim both ends
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = replace_control_chars(&s);
    let s = collapse_whitespace(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Replace control characters ───────────────────────────────────────

fn replace_control_chars(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() && !c.is_whitespace() { ' ' } else { c })
        .collect()
}

// ── Rule 4: Collapse whitespace ──────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").to_string()
}

//! Markup stripping for free-text record fields.
//!
//! Activity descriptions arrive as HTML fragments authored in the platform's
//! editor. Before a field enters a prompt it is reduced to its text nodes,
//! with the whitespace the removed tags leave behind collapsed to single
//! spaces. `sanitize` never fails: plain text passes through, and missing
//! cells arrive already stringified as `"nan"` by the store. That degraded
//! filler is tested explicitly since it silently weakens prompts.

use scraper::Html;

/// Strip markup from `text`, leaving human-readable plain text.
pub fn sanitize(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    let mut raw = String::new();
    for piece in fragment.root_element().text() {
        raw.push_str(piece);
    }
    collapse_whitespace(&raw)
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

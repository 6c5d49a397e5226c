//! Text normalization for extracted free-text fields
//!
//! Every function here is idempotent: feeding its output back in returns
//! the same text. Each rule set is applied until the text stops changing,
//! which also settles doubly-escaped entities such as `&amp;amp;`.

use scraper::Html;

/// Upper bound on settle passes; real input settles in two or three
const MAX_PASSES: usize = 8;

/// Decodes HTML/XML character entities
///
/// Markup is not interpreted: a literal `<` stays in the text.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let fragment = Html::parse_fragment(&text.replace('<', "&lt;"));
    fragment.root_element().text().collect()
}

/// Normalizes a description-like field
///
/// Decodes entities, removes double quotes, collapses whitespace runs to
/// one space, and trims separator noise at both ends.
pub fn normalize_text(text: &str) -> String {
    settle(text, |current| {
        let decoded = decode_entities(current).replace('"', "");
        let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_start_matches(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .trim_end_matches(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .to_string()
    })
}

/// Normalizes a free-text address
///
/// Tabs, line breaks, and commas all separate parts. Each part has its
/// whitespace collapsed and trailing `.`/`;` removed; empty parts are
/// dropped and the rest joined with `", "`.
pub fn normalize_address(text: &str) -> String {
    settle(text, |current| {
        let decoded = decode_entities(current).replace('"', "");
        decoded
            .split(|c: char| matches!(c, ',' | '\t' | '\n' | '\r'))
            .map(|part| {
                part.split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim_end_matches(|c: char| c == '.' || c == ';' || c.is_whitespace())
                    .to_string()
            })
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    })
}

/// Joins structured address parts, skipping absent and blank ones
///
/// Returns `None` if no part survives.
pub fn join_address(parts: &[Option<&str>]) -> Option<String> {
    let joined = parts
        .iter()
        .flatten()
        .map(|part| normalize_address(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    Some(joined).filter(|s| !s.is_empty())
}

/// Maps an all-zero registry number to absent
pub fn non_zero_identifier(identifier: Option<&str>) -> Option<String> {
    let identifier = identifier?.trim();
    if identifier.is_empty() || identifier.chars().all(|c| c == '0') {
        None
    } else {
        Some(identifier.to_string())
    }
}

/// Applies `pass` until the text is stable
fn settle(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(text);
    for _ in 1..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

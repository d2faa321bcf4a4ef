//! Canonical article keys.
//!
//! Every article is addressed by a *pointer*: the lower-cased ASCII
//! alphanumeric residue of a word once markup has been stripped. Normalising
//! is pure and idempotent, so callers may normalise freely at any boundary.

use uuid::Uuid;

/// Namespace under which article ids are derived from pointers.
const ARTICLE_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

const MAX_ENTITY_DIGITS: usize = 6;

/// Reduce a raw token to its canonical pointer.
///
/// Tags (`<...>`) and character references (`&amp;`, `&#38;`, `&#x26;`) are
/// dropped first, then everything outside `[a-z0-9]` after lower-casing. An
/// empty result means the token is not a link candidate.
pub fn normalize_word(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(ch) = rest.chars().next() {
        match ch {
            '<' => {
                if let Some(end) = rest.find('>') {
                    rest = &rest[end + 1..];
                    continue;
                }
            }
            '&' => {
                if let Some(len) = entity_len(rest) {
                    rest = &rest[len..];
                    continue;
                }
            }
            _ => {}
        }

        if ch.is_ascii_alphanumeric() {
            normalized.push(ch.to_ascii_lowercase());
        }
        rest = &rest[ch.len_utf8()..];
    }

    normalized
}

/// Length in bytes of a character reference at the start of `input`, if any.
pub(crate) fn entity_len(input: &str) -> Option<usize> {
    let body = input.strip_prefix('&')?;
    let end = body.find(';')?;
    let name = &body[..end];

    let valid = if let Some(hex) = name
        .strip_prefix("#x")
        .or_else(|| name.strip_prefix("#X"))
    {
        (1..=MAX_ENTITY_DIGITS).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(decimal) = name.strip_prefix('#') {
        (1..=MAX_ENTITY_DIGITS).contains(&decimal.len())
            && decimal.chars().all(|c| c.is_ascii_digit())
    } else {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
    };

    valid.then_some(end + 2)
}

/// Stable article id for a pointer. Two workers racing on the same pointer
/// derive the same id.
pub fn article_id(pointer: &str) -> Uuid {
    Uuid::new_v5(&ARTICLE_NAMESPACE, pointer.as_bytes())
}

/// Human-facing title for a requested article: whitespace collapsed and the
/// first letter upper-cased.
pub fn display_title(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

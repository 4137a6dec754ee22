//! Alternative-part selection.
//!
//! Sibling parts that represent the same content in different formats
//! (plain text vs HTML) are reduced to a single representative according to
//! the configured preference. Implemented as a pure filter over the part
//! sequence; parts without a `text` marker in their declared type are never
//! touched.

use crate::parser::message::MessagePart;

fn is_text_labeled(part: &MessagePart) -> bool {
    part.content_type().contains("text")
}

fn is_plain_labeled(part: &MessagePart) -> bool {
    part.content_type().contains("plain")
}

/// Reduce a sibling sequence to the preferred text representation.
///
/// With `prefer_plain` set and at least one plain-text-labeled part present,
/// every other text-labeled part is dropped; with the preference inverted
/// the plain parts are dropped instead. If the preferred group is empty the
/// sequence passes through unchanged.
pub fn select_alternative(parts: Vec<MessagePart>, prefer_plain: bool) -> Vec<MessagePart> {
    let has_plain = parts
        .iter()
        .any(|p| is_text_labeled(p) && is_plain_labeled(p));
    let has_rich = parts
        .iter()
        .any(|p| is_text_labeled(p) && !is_plain_labeled(p));

    if prefer_plain && has_plain {
        parts
            .into_iter()
            .filter(|p| !is_text_labeled(p) || is_plain_labeled(p))
            .collect()
    } else if !prefer_plain && has_rich {
        parts
            .into_iter()
            .filter(|p| !is_text_labeled(p) || !is_plain_labeled(p))
            .collect()
    } else {
        parts
    }
}

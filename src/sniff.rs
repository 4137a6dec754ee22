//! Byte-signature content classification.
//!
//! The declared content type of a mail part is routinely wrong; what matters
//! is what the bytes actually are. Classification looks only at the payload
//! (image magic numbers via `image::guess_format`, a plausibility check for
//! text) and then applies two corrections against the declared type, in this
//! order:
//!
//! 1. declared text, binary payload, recognizable image signature → image;
//! 2. declared image, textual payload, no image signature → text.
//!
//! Both corrections, and any remaining declared-vs-sniffed disagreement, are
//! reported back so the caller can log them with message context. The one
//! deliberate exception: a declared `text/html` part that sniffs as plain
//! text keeps its declared subtype, otherwise HTML reduction would never
//! run.

use image::ImageFormat;

use crate::parser::decode::Decoded;
use crate::parser::message::MessagePart;

/// Final media classification of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Text,
    Image(ImageFormat),
    /// Neither text nor image — discarded by the pipeline.
    Other,
}

/// Classification result plus everything the caller should log.
#[derive(Debug, Clone)]
pub struct Classification {
    pub class: MediaClass,
    /// A declared-text part turned out to be an image.
    pub text_reclassified_as_image: bool,
    /// A declared-image part turned out to be text.
    pub image_reclassified_as_text: bool,
    /// Sniffed type when it still disagrees with the declared one.
    pub mismatch: Option<String>,
}

/// Image format of a payload, if its signature is recognizable.
pub fn image_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

/// Whether a payload is plausibly textual: valid UTF-8 with a negligible
/// share of control and replacement characters.
pub fn looks_textual(data: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(data) else {
        return false;
    };
    plausibly_text(text)
}

fn plausibly_text(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let mut suspicious = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
            suspicious += 1;
        }
    }
    suspicious * 10 < total
}

/// Classify one decoded payload against its declaring part.
///
/// Stateless on the payload: classifying an already correctly typed payload
/// again yields the same result.
pub fn classify(part: &MessagePart, decoded: &Decoded) -> Classification {
    let sniffed = match decoded {
        Decoded::Binary(bytes) => match image_format(bytes) {
            Some(format) => MediaClass::Image(format),
            None if looks_textual(bytes) => MediaClass::Text,
            None => MediaClass::Other,
        },
        // A payload that decoded to a string is never an image, whatever
        // ASCII-looking magic it may start with.
        Decoded::Text(text) => {
            if plausibly_text(text) {
                MediaClass::Text
            } else {
                MediaClass::Other
            }
        }
    };

    let declared_text = part.main_type == "text";
    let declared_image = part.main_type == "image";

    let mut class = sniffed;
    let mut text_reclassified_as_image = false;
    let mut image_reclassified_as_text = false;

    if declared_text {
        if let (Decoded::Binary(_), MediaClass::Image(_)) = (decoded, sniffed) {
            text_reclassified_as_image = true;
        }
    }
    if declared_image {
        if let (Decoded::Text(_), MediaClass::Text | MediaClass::Other) = (decoded, sniffed) {
            class = MediaClass::Text;
            image_reclassified_as_text = true;
        }
    }

    let sniffed_type = type_label(class);
    let declared_type = part.content_type();
    let mismatch = if sniffed_type == declared_type {
        None
    } else if declared_type == "text/html" && class == MediaClass::Text {
        // Declared subtype wins so HTML reduction still happens.
        None
    } else if text_reclassified_as_image || image_reclassified_as_text {
        // Already reported through the dedicated correction flags.
        None
    } else {
        Some(sniffed_type)
    };

    Classification {
        class,
        text_reclassified_as_image,
        image_reclassified_as_text,
        mismatch,
    }
}

/// Preferred file extension for a sniffed image format, without the dot.
pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("jpg")
}

/// Whether an extension (with or without dot) names a TIFF variant.
pub fn is_tiff_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    ext.eq_ignore_ascii_case("tiff") || ext.eq_ignore_ascii_case("tif")
}

fn type_label(class: MediaClass) -> String {
    match class {
        MediaClass::Text => "text/plain".to_string(),
        MediaClass::Image(format) => format.to_mime_type().to_string(),
        MediaClass::Other => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::message::TransferEncoding;

    const JPEG_SIG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    const PNG_SIG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn declared(main: &str, sub: &str) -> MessagePart {
        MessagePart {
            main_type: main.into(),
            sub_type: sub.into(),
            encoding: TransferEncoding::Identity,
            charset: None,
            filename: None,
            raw_body: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_image_signatures() {
        assert_eq!(image_format(JPEG_SIG), Some(ImageFormat::Jpeg));
        assert_eq!(image_format(PNG_SIG), Some(ImageFormat::Png));
        assert_eq!(image_format(b"just some words"), None);
    }

    #[test]
    fn test_declared_text_with_jpeg_bytes_becomes_image() {
        let part = declared("text", "plain");
        let decoded = Decoded::Binary(JPEG_SIG.to_vec());
        let result = classify(&part, &decoded);
        assert_eq!(result.class, MediaClass::Image(ImageFormat::Jpeg));
        assert!(result.text_reclassified_as_image);
        assert!(!result.image_reclassified_as_text);
    }

    #[test]
    fn test_declared_image_with_textual_payload_becomes_text() {
        let part = declared("image", "jpeg");
        let decoded = Decoded::Text("this is not a picture".into());
        let result = classify(&part, &decoded);
        assert_eq!(result.class, MediaClass::Text);
        assert!(result.image_reclassified_as_text);
    }

    #[test]
    fn test_plain_text_stays_plain() {
        let part = declared("text", "plain");
        let decoded = Decoded::Text("hello there".into());
        let result = classify(&part, &decoded);
        assert_eq!(result.class, MediaClass::Text);
        assert!(!result.text_reclassified_as_image);
        assert!(!result.image_reclassified_as_text);
        assert!(result.mismatch.is_none());
    }

    #[test]
    fn test_declared_html_sniffed_plain_keeps_no_mismatch() {
        let part = declared("text", "html");
        let decoded = Decoded::Text("<p>hi</p>".into());
        let result = classify(&part, &decoded);
        assert_eq!(result.class, MediaClass::Text);
        assert!(result.mismatch.is_none());
    }

    #[test]
    fn test_binary_junk_is_other_with_mismatch() {
        let part = declared("application", "pdf");
        let decoded = Decoded::Binary(vec![0x25, 0x50, 0x44, 0x46, 0x00, 0x01, 0x02, 0xFF]);
        let result = classify(&part, &decoded);
        assert_eq!(result.class, MediaClass::Other);
        assert_eq!(result.mismatch.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn test_classification_is_idempotent_on_payload() {
        let part = declared("image", "png");
        let decoded = Decoded::Binary(PNG_SIG.to_vec());
        let first = classify(&part, &decoded);
        let second = classify(&part, &decoded);
        assert_eq!(first.class, second.class);
        assert_eq!(first.mismatch, second.mismatch);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for(ImageFormat::Jpeg), "jpg");
        assert_eq!(extension_for(ImageFormat::Png), "png");
        assert!(is_tiff_extension(".tiff"));
        assert!(is_tiff_extension("tif"));
        assert!(!is_tiff_extension(".jpg"));
    }
}

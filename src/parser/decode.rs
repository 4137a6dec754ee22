//! Transfer decoding of part payloads.
//!
//! Produces the tagged [`Decoded`] union the rest of the pipeline operates
//! on: base64 payloads decode to binary, quoted-printable and identity
//! payloads decode to text through the declared charset. Charset problems
//! degrade to lossy coercion; they never abort a part.

use base64::alphabet;
use base64::engine::{self, Engine};

use crate::error::{RelayError, Result};
use crate::parser::message::{MessagePart, TransferEncoding};

/// Base64 engine that accepts both padded and unpadded input; whitespace is
/// stripped by the caller. Mail in the wild is sloppy about both.
const BASE64_MIME: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::STANDARD,
    engine::GeneralPurposeConfig::new()
        .with_decode_padding_mode(engine::DecodePaddingMode::Indifferent),
);

/// A decoded part payload. The variant tag — not the declared content type —
/// is what classification corrections key on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Text(String),
    Binary(Vec<u8>),
}

impl Decoded {
    pub fn is_empty(&self) -> bool {
        match self {
            Decoded::Text(s) => s.is_empty(),
            Decoded::Binary(b) => b.is_empty(),
        }
    }

    /// The payload as bytes, whichever variant it is.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Decoded::Text(s) => s.as_bytes(),
            Decoded::Binary(b) => b,
        }
    }
}

/// Decode one leaf part's payload according to its declared transfer
/// encoding.
pub fn decode_part(part: &MessagePart) -> Result<Decoded> {
    match part.encoding {
        TransferEncoding::Base64 => {
            let compact: Vec<u8> = part
                .raw_body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            let bytes = BASE64_MIME
                .decode(&compact)
                .map_err(|e| RelayError::DecodeError(format!("base64: {e}")))?;
            Ok(Decoded::Binary(bytes))
        }
        TransferEncoding::QuotedPrintable => {
            let bytes =
                quoted_printable::decode(&part.raw_body, quoted_printable::ParseMode::Robust)
                    .map_err(|e| RelayError::DecodeError(format!("quoted-printable: {e}")))?;
            Ok(Decoded::Text(decode_charset(part.charset.as_deref(), &bytes)))
        }
        TransferEncoding::Identity => Ok(Decoded::Text(decode_charset(
            part.charset.as_deref(),
            &part.raw_body,
        ))),
    }
}

/// Decode bytes through a declared charset label, defaulting to UTF-8.
///
/// An unknown label or malformed input falls back to lossy UTF-8 — the
/// fax still goes out, possibly with replacement characters.
pub fn decode_charset(charset: Option<&str>, bytes: &[u8]) -> String {
    let label = charset.unwrap_or("utf-8");
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(encoding: TransferEncoding, charset: Option<&str>, raw: &[u8]) -> MessagePart {
        MessagePart {
            main_type: "text".into(),
            sub_type: "plain".into(),
            encoding,
            charset: charset.map(String::from),
            filename: None,
            raw_body: raw.to_vec(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_identity_passes_through_as_text() {
        let part = leaf(TransferEncoding::Identity, Some("utf-8"), b"plain body\r\n");
        assert_eq!(
            decode_part(&part).unwrap(),
            Decoded::Text("plain body\r\n".into())
        );
    }

    #[test]
    fn test_base64_decodes_to_binary() {
        // "JFIF" preceded by the JPEG SOI marker, split across folded lines.
        let part = leaf(
            TransferEncoding::Base64,
            None,
            b"/9j/4AAQ\r\nSkZJRg==\r\n",
        );
        let decoded = decode_part(&part).unwrap();
        match decoded {
            Decoded::Binary(bytes) => assert!(bytes.starts_with(&[0xFF, 0xD8, 0xFF])),
            Decoded::Text(_) => panic!("base64 payload must decode to binary"),
        }
    }

    #[test]
    fn test_base64_without_padding() {
        let part = leaf(TransferEncoding::Base64, None, b"aGVsbG8");
        assert_eq!(
            decode_part(&part).unwrap(),
            Decoded::Binary(b"hello".to_vec())
        );
    }

    #[test]
    fn test_quoted_printable_decodes_through_charset() {
        let part = leaf(
            TransferEncoding::QuotedPrintable,
            Some("iso-8859-2"),
            b"ciep=B3o",
        );
        assert_eq!(decode_part(&part).unwrap(), Decoded::Text("ciepło".into()));
    }

    #[test]
    fn test_unknown_charset_falls_back_lossy() {
        let part = leaf(
            TransferEncoding::Identity,
            Some("x-not-a-charset"),
            b"abc \xFF def",
        );
        let Decoded::Text(text) = decode_part(&part).unwrap() else {
            panic!("identity payload must decode to text");
        };
        assert!(text.starts_with("abc"));
        assert!(text.ends_with("def"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_charset_defaults_to_utf8() {
        let part = leaf(TransferEncoding::Identity, None, "żółw".as_bytes());
        assert_eq!(decode_part(&part).unwrap(), Decoded::Text("żółw".into()));
    }
}

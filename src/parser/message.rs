//! Read-only model of one incoming message.
//!
//! `mail-parser` handles the MIME structure and header decoding; the payload
//! of every leaf is kept as the *undecoded* raw bytes so that transfer
//! decoding (see [`crate::parser::decode`]) stays under pipeline control.
//! In particular, a part whose declared charset lies about its payload must
//! not be lossily re-coded before the content sniffer has seen the bytes.

use mail_parser::{Encoding, Message, MessageParser, MimeHeaders, PartType};

use crate::error::{RelayError, Result};

/// Declared transfer encoding of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7bit, 8bit, binary, or no declaration — payload passes through.
    Identity,
    Base64,
    QuotedPrintable,
}

/// One node of the message's content tree.
///
/// Containers carry children and an empty payload; leaves carry the raw
/// payload bytes exactly as they appeared on the wire.
#[derive(Debug, Clone)]
pub struct MessagePart {
    /// Declared media type, lowercase (e.g. `"text"`); defaults to `"text"`.
    pub main_type: String,
    /// Declared media subtype, lowercase (e.g. `"plain"`).
    pub sub_type: String,
    /// Declared transfer encoding.
    pub encoding: TransferEncoding,
    /// Declared charset, if any.
    pub charset: Option<String>,
    /// Decoded attachment filename, if any.
    pub filename: Option<String>,
    /// Raw (still transfer-encoded) payload bytes. Empty for containers.
    pub raw_body: Vec<u8>,
    /// Child parts of a container. Empty for leaves.
    pub children: Vec<MessagePart>,
}

impl MessagePart {
    /// Full declared type as `"main/sub"`.
    pub fn content_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Whether this part is a container of sibling parts.
    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }

    /// Extension of the declared filename, lowercase with the leading dot
    /// (e.g. `".pdf"`), or empty when absent.
    pub fn filename_extension(&self) -> String {
        let Some(ref name) = self.filename else {
            return String::new();
        };
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                format!(".{}", ext.to_lowercase())
            }
            _ => String::new(),
        }
    }
}

/// Parse raw message bytes with `mail-parser`.
pub fn parse_message(raw: &[u8]) -> Result<Message<'_>> {
    MessageParser::default()
        .parse(raw)
        .ok_or(RelayError::UnparsableMessage)
}

/// Collect the top-level part sequence of a parsed message.
///
/// A single-part message yields one leaf; a multipart message yields its
/// children, each of which may itself be a container (one nesting level is
/// what actually occurs in supported inputs, but the walk is recursive).
pub fn collect_parts(message: &Message<'_>) -> Vec<MessagePart> {
    let Some(root) = message.parts.first() else {
        return Vec::new();
    };
    match &root.body {
        PartType::Multipart(ids) => ids.iter().map(|id| build_part(message, *id as usize)).collect(),
        _ => vec![build_part(message, 0)],
    }
}

/// Build the model for one part (and, for containers, its children).
fn build_part(message: &Message<'_>, id: usize) -> MessagePart {
    let part = &message.parts[id];

    let (main_type, sub_type) = match part.content_type() {
        Some(ct) => (
            ct.ctype().to_lowercase(),
            ct.subtype().unwrap_or("plain").to_lowercase(),
        ),
        None => ("text".to_string(), "plain".to_string()),
    };

    let charset = part
        .content_type()
        .and_then(|ct| ct.attributes())
        .and_then(|attrs| {
            attrs
                .iter()
                .find(|attr| attr.name.eq_ignore_ascii_case("charset"))
                .map(|attr| attr.value.to_lowercase())
        });

    let encoding = match part.encoding {
        Encoding::Base64 => TransferEncoding::Base64,
        Encoding::QuotedPrintable => TransferEncoding::QuotedPrintable,
        _ => TransferEncoding::Identity,
    };

    let filename = part.attachment_name().map(|name| name.to_string());

    let children = match &part.body {
        PartType::Multipart(ids) => ids.iter().map(|id| build_part(message, *id as usize)).collect(),
        _ => Vec::new(),
    };

    let raw_body = if children.is_empty() {
        message.raw_message[part.offset_body as usize..part.offset_end as usize].to_vec()
    } else {
        Vec::new()
    };

    MessagePart {
        main_type,
        sub_type,
        encoding,
        charset,
        filename,
        raw_body,
        children,
    }
}

//! Envelope extraction: sender, subject and date display values.
//!
//! RFC 2047 encoded-words are resolved by `mail-parser`; this module only
//! decides what ends up on the fax cover lines. Every field falls back to
//! the configured no-data placeholder, and the date is re-formatted into
//! the configured timezone/pattern with the raw header as a last resort.

use chrono::FixedOffset;
use mail_parser::Message;
use tracing::warn;

use crate::config::Settings;

/// Immutable sender/subject/date summary, computed once per run.
#[derive(Debug, Clone)]
pub struct EnvelopeSummary {
    pub sender: String,
    pub subject: String,
    pub date: String,
}

impl EnvelopeSummary {
    /// Build the summary from a parsed message.
    pub fn from_message(message: &Message<'_>, settings: &Settings) -> Self {
        let sender = sender_display(message).unwrap_or_else(|| settings.no_data.clone());
        let subject = subject_display(message, settings).unwrap_or_else(|| settings.no_data.clone());
        let date = date_display(message, &settings.date_timezone, &settings.date_format)
            .unwrap_or_else(|| settings.no_data.clone());
        Self {
            sender,
            subject,
            date,
        }
    }

    /// The header block prepended to the first text part (or written alone
    /// as the fallback page). `with_trailing_blank` adds the blank line that
    /// separates the block from following body text.
    pub fn header_block(&self, settings: &Settings, with_trailing_blank: bool) -> String {
        let mut block = format!(
            "{}{}\n{}{}\n{}{}",
            settings.sender_label,
            self.sender,
            settings.subject_label,
            self.subject,
            settings.date_label,
            self.date
        );
        if with_trailing_blank {
            block.push_str("\n\n");
        }
        block
    }

    /// True when all three fields are the no-data placeholder — the message
    /// carries no identifying information at all.
    pub fn is_placeholder_only(&self, settings: &Settings) -> bool {
        self.sender == settings.no_data
            && self.subject == settings.no_data
            && self.date == settings.no_data
    }
}

/// `"Name <addr>"`, bare address, or bare display name — whatever exists.
fn sender_display(message: &Message<'_>) -> Option<String> {
    let from = message.from()?;
    let first = from.first()?;
    let display = match (first.name(), first.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => return None,
    };
    if display.is_empty() {
        None
    } else {
        Some(display)
    }
}

/// Decoded subject, with the configured prefix trigger stripped when it is a
/// proper prefix (something must remain after it) and stripping is enabled.
fn subject_display(message: &Message<'_>, settings: &Settings) -> Option<String> {
    let subject = message.subject()?;
    if subject.is_empty() {
        return None;
    }
    let trigger = &settings.subject_trigger;
    if settings.delete_subject_trigger
        && !trigger.is_empty()
        && subject.len() > trigger.len()
        && subject.starts_with(trigger.as_str())
    {
        return Some(subject[trigger.len()..].to_string());
    }
    Some(subject.to_string())
}

/// Format the Date header into the configured timezone and pattern.
///
/// An unparsable date never fails the run: the raw header value is passed
/// through unchanged instead.
fn date_display(message: &Message<'_>, timezone: &str, format: &str) -> Option<String> {
    if let Some(date) = message.date() {
        if let Some(utc) = chrono::DateTime::from_timestamp(date.to_timestamp(), 0) {
            let formatted = match parse_fixed_offset(timezone) {
                Some(offset) => utc.with_timezone(&offset).format(format).to_string(),
                None => utc.with_timezone(&chrono::Local).format(format).to_string(),
            };
            return Some(formatted);
        }
    }
    message
        .header_raw("Date")
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Parse a fixed UTC offset such as `"+01:00"`, `"-0530"` or `"Z"`.
///
/// Empty means local time. Anything unparsable is warned about once and
/// treated as local time, mirroring the tolerant behavior of the date path.
fn parse_fixed_offset(timezone: &str) -> Option<FixedOffset> {
    let tz = timezone.trim();
    if tz.is_empty() {
        return None;
    }
    if tz.eq_ignore_ascii_case("z") || tz.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match tz.split_at_checked(1) {
        Some(("+", rest)) => (1i32, rest),
        Some(("-", rest)) => (-1i32, rest),
        _ => {
            warn!(timezone = %tz, "Unrecognized timezone, using local time");
            return None;
        }
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let parsed = match digits.len() {
        4 => {
            let hours: i32 = digits[..2].parse().ok()?;
            let minutes: i32 = digits[2..].parse().ok()?;
            FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        }
        2 => {
            let hours: i32 = digits.parse().ok()?;
            FixedOffset::east_opt(sign * hours * 3600)
        }
        _ => None,
    };
    if parsed.is_none() {
        warn!(timezone = %tz, "Unrecognized timezone, using local time");
    }
    parsed
}

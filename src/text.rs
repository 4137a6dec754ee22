//! Text normalization for fax pages.
//!
//! Order matters and is fixed: HTML reduction (or the optional plain-text
//! folds), CRLF folding, the once-per-run envelope caption and trigger scan
//! handled by the pipeline, then end trimming and blank-run collapsing.
//! The optional folds are lossy heuristics and default off.

use crate::config::Settings;

/// Result of scanning the first text part for control triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerScan {
    /// The discard trigger was found — the part produces no artifact.
    pub discard: bool,
    /// The standard-resolution trigger was found.
    pub standard: bool,
}

/// Reduce HTML to plain text.
///
/// Line-break tags become newlines first — the generic tag-stripping pass
/// never synthesizes them — then all remaining markup is stripped and
/// character entities are resolved. Tag *contents* are kept; a fax of the
/// text is still better than an empty page.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for tag in ["<br>", "<BR>", "<br/>", "<br />"] {
        text = text.replace(tag, "\n");
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    resolve_entities(&stripped)
}

/// Resolve `&name;` and `&#N;` / `&#xN;` character entities.
///
/// Unknown entities pass through unchanged.
pub fn resolve_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        match after[1..]
            .find(';')
            .filter(|end| *end <= 32)
            .and_then(|end| entity_value(&after[1..end + 1]).map(|v| (v, end + 2)))
        {
            Some((value, consumed)) => {
                out.push_str(&value);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity_value(name: &str) -> Option<String> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = if let Some(hex) = numeric.strip_prefix('x').or(numeric.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            numeric.parse().ok()?
        };
        return char::from_u32(code).map(String::from);
    }
    let value = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => return None,
    };
    Some(value.to_string())
}

/// Fold every run of two-or-more spaces into one fewer newlines
/// (n spaces → n − 1 newlines). Single spaces are untouched.
pub fn multi_spaces_to_newlines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run = 0usize;
    for ch in input.chars() {
        if ch == ' ' {
            run += 1;
            continue;
        }
        flush_space_run(&mut out, run);
        run = 0;
        out.push(ch);
    }
    flush_space_run(&mut out, run);
    out
}

fn flush_space_run(out: &mut String, run: usize) {
    match run {
        0 => {}
        1 => out.push(' '),
        n => {
            for _ in 0..n - 1 {
                out.push('\n');
            }
        }
    }
}

/// Collapse every run of three-or-more newlines down to exactly two.
pub fn collapse_newlines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run = 0usize;
    for ch in input.chars() {
        if ch == '\n' {
            run += 1;
            continue;
        }
        for _ in 0..run.min(2) {
            out.push('\n');
        }
        run = 0;
        out.push(ch);
    }
    for _ in 0..run.min(2) {
        out.push('\n');
    }
    out
}

/// Steps 1–3 of normalization: HTML reduction or the optional plain-text
/// folds, then unconditional CRLF → LF.
pub fn normalize_body(raw: String, is_html: bool, settings: &Settings) -> String {
    let text = if is_html {
        html_to_text(&raw)
    } else {
        let mut text = raw;
        if settings.multispaces_to_new_lines {
            text = multi_spaces_to_newlines(&text);
        }
        if settings.convert_amp_characters {
            text = resolve_entities(&text);
        }
        text
    };
    text.replace("\r\n", "\n")
}

/// Scan for control triggers and strip the standard-resolution trigger if
/// configured. Runs on the first text part only, after the envelope caption
/// has been prepended (a trigger in the subject line counts).
pub fn scan_triggers(text: &mut String, settings: &Settings) -> TriggerScan {
    let mut scan = TriggerScan::default();
    if settings.delete_message_trigger && !settings.message_trigger.is_empty() {
        scan.discard = text.contains(&settings.message_trigger);
    }
    if settings.use_standard_trigger && !settings.standard_trigger.is_empty() {
        scan.standard = text.contains(&settings.standard_trigger);
    }
    if settings.delete_standard_trigger && !settings.standard_trigger.is_empty() {
        *text = text.replace(&settings.standard_trigger, "");
    }
    scan
}

/// Final trimming: end newline runs, then in-text blank-run collapsing.
/// Deliberately after trigger handling, so lines emptied by trigger removal
/// still collapse away.
pub fn finish_text(text: String, settings: &Settings) -> String {
    let mut text = text;
    if settings.strip_new_lines_on_startend {
        text = text.trim_matches('\n').to_string();
    }
    if settings.strip_intext_new_lines {
        text = collapse_newlines(&text);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_html_br_becomes_newline() {
        assert_eq!(html_to_text("one<br>two<br />three"), "one\ntwo\nthree");
    }

    #[test]
    fn test_html_tags_stripped_content_kept() {
        assert_eq!(
            html_to_text("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn test_html_entities_resolved() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(resolve_entities("&#65;&#x42;"), "AB");
    }

    #[test]
    fn test_unknown_entity_passes_through() {
        assert_eq!(resolve_entities("&unknown; &amp;"), "&unknown; &");
    }

    #[test]
    fn test_multi_spaces_fold() {
        // 3 spaces → 2 newlines, single space untouched.
        assert_eq!(multi_spaces_to_newlines("a   b c"), "a\n\nb c");
        assert_eq!(multi_spaces_to_newlines("a  b"), "a\nb");
        assert_eq!(multi_spaces_to_newlines("plain words"), "plain words");
    }

    #[test]
    fn test_collapse_newlines() {
        assert_eq!(collapse_newlines("a\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_newlines("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_newlines("a\n\n\n\n\n\nb\n\n\n"), "a\n\nb\n\n");
    }

    #[test]
    fn test_normalize_body_folds_crlf() {
        let out = normalize_body("one\r\ntwo".into(), false, &settings());
        assert_eq!(out, "one\ntwo");
    }

    #[test]
    fn test_plain_round_trip_with_toggles_off() {
        // No markup, no multi-space runs, optional toggles off:
        // CRLF folding is the only change.
        let mut cfg = settings();
        cfg.strip_new_lines_on_startend = false;
        cfg.strip_intext_new_lines = false;
        let body = "Dear machine,\r\nplease print me.\n\nRegards\n";
        let normalized = normalize_body(body.to_string(), false, &cfg);
        assert_eq!(normalized, "Dear machine,\nplease print me.\n\nRegards\n");
        assert_eq!(finish_text(normalized.clone(), &cfg), normalized);
    }

    #[test]
    fn test_discard_trigger_detected() {
        let mut text = "some text !DISCARD! more".to_string();
        let scan = scan_triggers(&mut text, &settings());
        assert!(scan.discard);
        assert!(!scan.standard);
    }

    #[test]
    fn test_standard_trigger_detected_and_removed() {
        let mut text = "body\n!STANDARD!\nrest".to_string();
        let scan = scan_triggers(&mut text, &settings());
        assert!(scan.standard);
        assert!(!text.contains("!STANDARD!"));
        // The emptied line collapses away in the finishing pass.
        assert_eq!(finish_text(text, &settings()), "body\n\nrest");
    }

    #[test]
    fn test_standard_trigger_kept_when_deletion_off() {
        let mut cfg = settings();
        cfg.delete_standard_trigger = false;
        let mut text = "body !STANDARD!".to_string();
        let scan = scan_triggers(&mut text, &cfg);
        assert!(scan.standard);
        assert!(text.contains("!STANDARD!"));
    }

    #[test]
    fn test_trigger_scan_disabled() {
        let mut cfg = settings();
        cfg.delete_message_trigger = false;
        cfg.use_standard_trigger = false;
        cfg.delete_standard_trigger = false;
        let mut text = "!DISCARD! !STANDARD!".to_string();
        let scan = scan_triggers(&mut text, &cfg);
        assert!(!scan.discard);
        assert!(!scan.standard);
        assert!(text.contains("!STANDARD!"));
    }

    #[test]
    fn test_finish_text_trims_and_collapses() {
        let out = finish_text("\n\n\nHi\n\n\nthere\n\n".to_string(), &settings());
        assert_eq!(out, "Hi\n\nthere");
    }
}

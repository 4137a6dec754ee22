//! Relay configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `--config <FILE>` (command line)
//! 2. `$MAIL2FAX_CONFIG` (environment variable)
//! 3. `~/.config/mail2fax/config.toml` (Linux/macOS)
//! 4. `/etc/mail2fax/config.toml`
//! 5. Built-in defaults
//!
//! The file model keeps the original section split (strings / message /
//! rendering / defaults / per-fax profiles). [`Settings::resolve`] flattens
//! one selected profile into a single immutable value that the pipeline
//! receives by reference; nothing mutates settings after startup.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Top-level configuration file model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Envelope label strings.
    pub strings: StringsConfig,
    /// Trigger strings and normalization toggles.
    pub message: MessageConfig,
    /// Parameters handed to the page renderers.
    pub rendering: RenderingConfig,
    /// Profile selection, archive and date handling.
    pub defaults: DefaultsConfig,
    /// Per-fax profiles, keyed by profile name.
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Envelope label strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StringsConfig {
    /// Placeholder used when a header is absent.
    pub no_data: String,
    /// Label prefixed to the sender line of the header block.
    pub sender: String,
    /// Label prefixed to the subject line.
    pub subject: String,
    /// Label prefixed to the date line.
    pub date: String,
}

/// Trigger strings and text normalization toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Substring that discards the first text part when found in it.
    pub message_trigger: String,
    /// Substring that requests standard (low) fax resolution.
    pub standard_trigger: String,
    /// Strip the subject trigger prefix from the subject line.
    pub delete_subject_trigger: bool,
    /// Scan the first text part for the discard trigger.
    pub delete_message_trigger: bool,
    /// Remove the standard-resolution trigger from the text after detection.
    pub delete_standard_trigger: bool,
    /// Scan the first text part for the standard-resolution trigger.
    pub use_standard_trigger: bool,
    /// Prefer plain-text alternatives over rich ones.
    pub use_plain: bool,
    /// Fold runs of two-or-more spaces into newlines (lossy, default off).
    pub multispaces_to_new_lines: bool,
    /// Resolve `&...;` entities embedded in plain text (heuristic, default off).
    pub convert_amp_characters: bool,
    /// Trim leading/trailing newline runs from each text part.
    pub strip_new_lines_on_startend: bool,
    /// Collapse runs of 3+ newlines down to exactly 2.
    pub strip_intext_new_lines: bool,
}

/// Parameters handed to the page renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Font family for text pages.
    pub text_font_name: String,
    /// Font size in points.
    pub text_font_size: u32,
    /// Top margin in points.
    pub text_top_margin: u32,
    /// Target page width in fax pixels.
    pub page_width: u32,
    /// White padding on the left, in pixels.
    pub margin_left: u32,
    /// White padding on the right, in pixels.
    pub margin_right: u32,
}

/// Profile selection, archive and date handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Profile used when the requested one is missing (see toggle below).
    pub default_profile: String,
    /// Fall back to `default_profile` on an unknown profile name.
    pub use_default_on_wrong_parameter: bool,
    /// Append each raw message to the compressed archive.
    pub log_message_to_file: bool,
    /// Path of the compressed archive.
    pub message_log_file: PathBuf,
    /// Timezone for the date line: empty = local, else a fixed UTC offset.
    pub date_timezone: String,
    /// `strftime` pattern for the date line.
    pub date_format: String,
    /// Unpack multi-frame TIFF attachments into one artifact per frame.
    pub unpack_multipage_tiffs: bool,
}

/// One fax destination profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Destination phone number. A string: leading zeros and `+` matter.
    pub phone_number: Option<String>,
    /// Subject prefix that marks a message as fax-bound.
    pub subject_trigger: Option<String>,
    /// Per-profile timezone override.
    pub date_timezone: Option<String>,
    /// Per-profile date format override.
    pub date_format: Option<String>,
    /// Per-profile archive toggle override.
    pub log_message_to_file: Option<bool>,
    /// Per-profile archive path override.
    pub message_log_file: Option<PathBuf>,
    /// Borrow the phone number from another profile.
    pub route_to: Option<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for StringsConfig {
    fn default() -> Self {
        Self {
            no_data: "(no data)".to_string(),
            sender: "Sender:  ".to_string(),
            subject: "Subject: ".to_string(),
            date: "Date:    ".to_string(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            message_trigger: "!DISCARD!".to_string(),
            standard_trigger: "!STANDARD!".to_string(),
            delete_subject_trigger: true,
            delete_message_trigger: true,
            delete_standard_trigger: true,
            use_standard_trigger: true,
            use_plain: true,
            multispaces_to_new_lines: false,
            convert_amp_characters: false,
            strip_new_lines_on_startend: true,
            strip_intext_new_lines: true,
        }
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            text_font_name: "Monospace".to_string(),
            text_font_size: 10,
            text_top_margin: 6,
            page_width: 1728,
            margin_left: 32,
            margin_right: 32,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            default_profile: "FAX".to_string(),
            use_default_on_wrong_parameter: false,
            log_message_to_file: false,
            message_log_file: PathBuf::from("/var/log/mail2fax/mails.gz"),
            date_timezone: String::new(),
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            unpack_multipage_tiffs: true,
        }
    }
}

// ── Resolved settings ───────────────────────────────────────────

/// Immutable, fully resolved settings for one run.
///
/// Built once by [`Settings::resolve`] and passed by reference into every
/// pipeline component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub no_data: String,
    pub sender_label: String,
    pub subject_label: String,
    pub date_label: String,

    pub message_trigger: String,
    pub standard_trigger: String,
    pub subject_trigger: String,
    pub delete_subject_trigger: bool,
    pub delete_message_trigger: bool,
    pub delete_standard_trigger: bool,
    pub use_standard_trigger: bool,
    pub use_plain: bool,
    pub multispaces_to_new_lines: bool,
    pub convert_amp_characters: bool,
    pub strip_new_lines_on_startend: bool,
    pub strip_intext_new_lines: bool,

    pub phone_number: String,
    pub date_timezone: String,
    pub date_format: String,
    pub log_message_to_file: bool,
    pub message_log_file: PathBuf,
    pub unpack_multipage_tiffs: bool,

    pub text_font_name: String,
    pub text_font_size: u32,
    pub text_top_margin: u32,
    pub page_width: u32,
    pub margin_left: u32,
    pub margin_right: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::resolve(&ConfigFile::default(), "")
    }
}

impl Settings {
    /// Flatten the file model plus one selected profile into a `Settings`.
    ///
    /// An empty or unknown `profile` name falls back to the configured
    /// default profile when `use_default_on_wrong_parameter` is set;
    /// otherwise resolution continues without profile values (and the run
    /// later fails its no-phone-number precondition).
    pub fn resolve(config: &ConfigFile, profile: &str) -> Settings {
        let mut name = profile.to_string();

        if name.is_empty() || !config.profiles.contains_key(&name) {
            if name.is_empty() {
                info!("No profile parameter given");
            } else {
                info!(profile = %name, "No settings for profile");
            }
            if config.defaults.use_default_on_wrong_parameter {
                name = config.defaults.default_profile.clone();
                info!(profile = %name, "Using default profile");
            } else {
                info!("Not falling back to the default profile");
            }
        }

        let profile = config.profiles.get(&name);

        let mut settings = Settings {
            no_data: config.strings.no_data.clone(),
            sender_label: config.strings.sender.clone(),
            subject_label: config.strings.subject.clone(),
            date_label: config.strings.date.clone(),

            message_trigger: config.message.message_trigger.clone(),
            standard_trigger: config.message.standard_trigger.clone(),
            subject_trigger: "[FAX] ".to_string(),
            delete_subject_trigger: config.message.delete_subject_trigger,
            delete_message_trigger: config.message.delete_message_trigger,
            delete_standard_trigger: config.message.delete_standard_trigger,
            use_standard_trigger: config.message.use_standard_trigger,
            use_plain: config.message.use_plain,
            multispaces_to_new_lines: config.message.multispaces_to_new_lines,
            convert_amp_characters: config.message.convert_amp_characters,
            strip_new_lines_on_startend: config.message.strip_new_lines_on_startend,
            strip_intext_new_lines: config.message.strip_intext_new_lines,

            phone_number: String::new(),
            date_timezone: config.defaults.date_timezone.clone(),
            date_format: config.defaults.date_format.clone(),
            log_message_to_file: config.defaults.log_message_to_file,
            message_log_file: config.defaults.message_log_file.clone(),
            unpack_multipage_tiffs: config.defaults.unpack_multipage_tiffs,

            text_font_name: config.rendering.text_font_name.clone(),
            text_font_size: config.rendering.text_font_size,
            text_top_margin: config.rendering.text_top_margin,
            page_width: config.rendering.page_width,
            margin_left: config.rendering.margin_left,
            margin_right: config.rendering.margin_right,
        };

        let Some(profile_cfg) = profile else {
            return settings;
        };

        if let Some(ref number) = profile_cfg.phone_number {
            settings.phone_number = number.clone();
        }
        if let Some(ref trigger) = profile_cfg.subject_trigger {
            settings.subject_trigger = trigger.clone();
        }
        if let Some(ref tz) = profile_cfg.date_timezone {
            settings.date_timezone = tz.clone();
            info!(timezone = %tz, "Using profile timezone");
        }
        if let Some(ref fmt) = profile_cfg.date_format {
            settings.date_format = fmt.clone();
            info!(format = %fmt, "Using profile date format");
        }
        if let Some(enabled) = profile_cfg.log_message_to_file {
            settings.log_message_to_file = enabled;
            info!(profile = %name, enabled, "Message archiving overridden for profile");
        }
        if let Some(ref path) = profile_cfg.message_log_file {
            settings.message_log_file = path.clone();
            info!(profile = %name, path = %path.display(), "Archive file overridden for profile");
        }

        if let Some(ref route) = profile_cfg.route_to {
            settings.apply_route(config, &name, route);
        }

        settings
    }

    /// Borrow the phone number from the routed-to profile.
    ///
    /// Routes are followed exactly one hop; a route on the target profile is
    /// warned about and ignored.
    fn apply_route(&mut self, config: &ConfigFile, from: &str, route: &str) {
        if route == from {
            warn!(route = %route, "Route points to its own profile, ignoring");
            return;
        }
        match config.profiles.get(route) {
            Some(target) => match target.phone_number {
                Some(ref number) => {
                    self.phone_number = number.clone();
                    info!(from = %from, to = %route, "Using routed phone number");
                    if target.route_to.is_some() {
                        warn!(
                            profile = %route,
                            phone_number = %number,
                            "Routed profile defines its own route, which is not followed"
                        );
                    }
                }
                None => {
                    info!(route = %route, profile = %from, "Routed profile has no phone number, keeping previous settings");
                }
            },
            None => {
                info!(route = %route, profile = %from, "Route set but no such profile, keeping previous settings");
            }
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load the configuration file, searching standard locations.
///
/// Returns defaults if no file is found or on parse error.
pub fn load_config(override_path: Option<&PathBuf>) -> ConfigFile {
    let Some(path) = config_file_path(override_path) else {
        return ConfigFile::default();
    };
    if !path.exists() {
        return ConfigFile::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
            Ok(cfg) => {
                info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                ConfigFile::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
            ConfigFile::default()
        }
    }
}

/// Determine the config file path (flag, then env var, then standard dirs).
pub fn config_file_path(override_path: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.clone());
    }
    if let Ok(env_path) = std::env::var("MAIL2FAX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("mail2fax").join("config.toml");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    Some(PathBuf::from("/etc/mail2fax/config.toml"))
}

/// Return the log file directory for the tracing file layer.
pub fn log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mail2fax")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.no_data, "(no data)");
        assert_eq!(settings.message_trigger, "!DISCARD!");
        assert_eq!(settings.standard_trigger, "!STANDARD!");
        assert_eq!(settings.subject_trigger, "[FAX] ");
        assert!(settings.use_plain);
        assert!(settings.strip_new_lines_on_startend);
        assert!(!settings.multispaces_to_new_lines);
        assert!(settings.phone_number.is_empty());
        assert_eq!(settings.page_width, 1728);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[message]
message_trigger = "@@DROP@@"

[profiles.FAX]
phone_number = "1001"
"#;
        let cfg: ConfigFile = toml::from_str(partial).expect("parse partial");
        let settings = Settings::resolve(&cfg, "FAX");
        assert_eq!(settings.message_trigger, "@@DROP@@");
        assert_eq!(settings.phone_number, "1001");
        // Untouched keys keep their defaults
        assert_eq!(settings.standard_trigger, "!STANDARD!");
        assert_eq!(settings.date_format, "%Y-%m-%d %H:%M:%S");
    }

    #[test]
    fn test_unknown_profile_without_fallback() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.FAX]
phone_number = "1001"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "NOPE");
        assert!(settings.phone_number.is_empty());
    }

    #[test]
    fn test_unknown_profile_with_fallback() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[defaults]
default_profile = "FAX"
use_default_on_wrong_parameter = true

[profiles.FAX]
phone_number = "1001"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "NOPE");
        assert_eq!(settings.phone_number, "1001");
    }

    #[test]
    fn test_profile_overrides() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.OFFICE]
phone_number = "555123"
subject_trigger = "[OFFICE] "
date_timezone = "+01:00"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "OFFICE");
        assert_eq!(settings.phone_number, "555123");
        assert_eq!(settings.subject_trigger, "[OFFICE] ");
        assert_eq!(settings.date_timezone, "+01:00");
    }

    #[test]
    fn test_route_to_borrows_phone_number() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.ALIAS]
route_to = "FAX"

[profiles.FAX]
phone_number = "1001"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "ALIAS");
        assert_eq!(settings.phone_number, "1001");
    }

    #[test]
    fn test_route_to_self_is_ignored() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.FAX]
phone_number = "1001"
route_to = "FAX"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "FAX");
        assert_eq!(settings.phone_number, "1001");
    }

    #[test]
    fn test_route_to_missing_profile_keeps_previous() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.FAX]
phone_number = "1001"
route_to = "GONE"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "FAX");
        assert_eq!(settings.phone_number, "1001");
    }

    #[test]
    fn test_route_chain_is_not_followed() {
        let cfg: ConfigFile = toml::from_str(
            r#"
[profiles.A]
route_to = "B"

[profiles.B]
phone_number = "2002"
route_to = "C"

[profiles.C]
phone_number = "3003"
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&cfg, "A");
        assert_eq!(settings.phone_number, "2002");
    }
}

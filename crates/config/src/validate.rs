//! Settings validation.
//!
//! Detects unknown/misspelled keys and out-of-range timing values. Nothing
//! here is fatal at load time: the binary logs the diagnostics and carries
//! on with whatever deserialized.

use std::{collections::HashMap, path::Path};

use crate::{loader::parse_config_str, schema::Settings};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error" or "range"
    pub category: &'static str,
    /// Dotted path, e.g. "runtime.retry_delay_ms"
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

fn known_keys() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("server", ["bind", "port"].as_slice()),
        (
            "runtime",
            [
                "retry_delay_ms",
                "stop_timeout_ms",
                "restart_pause_ms",
                "drain_timeout_ms",
                "shutdown_grace_ms",
                "autostart",
            ]
            .as_slice(),
        ),
        (
            "twitch",
            ["nick", "oauth_token", "channels", "url", "idle_timeout_ms"].as_slice(),
        ),
        (
            "youtube",
            [
                "api_key",
                "live_chat_id",
                "api_base",
                "min_poll_interval_ms",
                "request_timeout_ms",
            ]
            .as_slice(),
        ),
        (
            "bridge",
            [
                "host",
                "port",
                "default_channel",
                "outbound_username",
                "forward_platforms",
            ]
            .as_slice(),
        ),
    ])
}

/// Validate a config file; the extension selects the format.
#[must_use]
pub fn validate_file(path: &Path) -> ValidationResult {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
            validate_str(&crate::env_subst::substitute_env(&raw), ext)
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
        },
    }
}

/// Validate settings text without touching the file system.
#[must_use]
pub fn validate_str(raw: &str, ext: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value: serde_json::Value = match ext {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        other => Err(format!("unsupported config format: .{other}")),
    }
    .unwrap_or_else(|message| {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message,
        });
        serde_json::Value::Null
    });
    if value.is_null() && !diagnostics.is_empty() {
        return ValidationResult { diagnostics };
    }

    check_unknown_fields(&value, &mut diagnostics);

    match parse_config_str(raw, ext) {
        Ok(settings) => check_ranges(&settings, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult { diagnostics }
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    let schema = known_keys();
    let sections: Vec<&str> = schema.keys().copied().collect();

    for (key, child) in root {
        let Some(fields) = schema.get(key.as_str()) else {
            diagnostics.push(unknown_field(key.clone(), key, &sections, "at top level "));
            continue;
        };
        let Some(table) = child.as_object() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields, ""));
            }
        }
    }
}

fn unknown_field(path: String, key: &str, candidates: &[&str], level: &str) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
        None => format!("unknown field {level}"),
    };
    Diagnostic {
        severity: Severity::Warning,
        category: "unknown-field",
        path,
        message: message.trim().to_string(),
    }
}

fn check_ranges(settings: &Settings, diagnostics: &mut Vec<Diagnostic>) {
    let rt = &settings.runtime;
    let mut warn = |path: &str, message: String| {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "range",
            path: path.to_string(),
            message,
        });
    };

    if rt.retry_delay_ms < 100 {
        warn(
            "runtime.retry_delay_ms",
            format!(
                "{} ms retry delay will hammer remote platforms",
                rt.retry_delay_ms
            ),
        );
    }
    if rt.stop_timeout_ms == 0 {
        warn(
            "runtime.stop_timeout_ms",
            "0 ms stop timeout aborts every adapter without a graceful stop".into(),
        );
    }
    if rt.drain_timeout_ms == 0 {
        warn(
            "runtime.drain_timeout_ms",
            "0 ms drain timeout drops every queued event on shutdown".into(),
        );
    }
    if settings.server.port == 0 {
        warn(
            "server.port",
            "port 0 binds a random port; dashboards will not find it".into(),
        );
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_config_has_no_diagnostics() {
        let result = validate_str(
            "[server]\nport = 8765\n[twitch]\nnick = \"bot\"\nchannels = [\"a\"]\n",
            "toml",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn misspelled_key_gets_suggestion() {
        let result = validate_str("[twitch]\nnik = \"bot\"\n", "toml");
        assert_eq!(result.count(Severity::Warning), 1);
        let d = &result.diagnostics[0];
        assert_eq!(d.path, "twitch.nik");
        assert!(d.message.contains("did you mean \"nick\""));
    }

    #[test]
    fn unknown_section_flagged() {
        let result = validate_str("[kick]\nchannel = \"x\"\n", "toml");
        assert_eq!(result.diagnostics[0].path, "kick");
        assert!(result.diagnostics[0].message.contains("at top level"));
    }

    #[test]
    fn syntax_error_is_fatal_diagnostic() {
        let result = validate_str("[server\nport = 1", "toml");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_reported() {
        let result = validate_str("[server]\nport = \"eighty\"\n", "toml");
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn range_warnings() {
        let result = validate_str("[runtime]\nretry_delay_ms = 10\nstop_timeout_ms = 0\n", "toml");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 2);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("port", "prot"), 2);
        assert_eq!(suggest("bnd", &["bind", "port"], 3), Some("bind"));
    }
}

//! Layered settings loading.
//!
//! Compiled defaults, then `~/.tinyws/settings.json` deep-merged on top, then
//! `TINYWS_*` environment overrides. Nulls in the file leave the default in
//! place; arrays and scalars replace.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::Settings;

/// `~/.tinyws/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tinyws").join("settings.json")
}

/// Load from the default path and the process environment.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file yields defaults. Malformed JSON, or values that fail
/// [`Settings::validate`], are errors.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load from `path`, reading overrides through `env` instead of the process
/// environment.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut merged = serde_json::to_value(Settings::default())?;
    if path.exists() {
        debug!(?path, "loading settings file");
        let user: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        merged = deep_merge(merged, user);
    } else {
        debug!(?path, "no settings file, using defaults");
    }

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` into `target`, recursing into objects.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut into), Value::Object(from)) => {
            for (key, value) in from {
                if value.is_null() {
                    continue;
                }
                let next = match into.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = into.insert(key, next);
            }
            Value::Object(into)
        }
        (_, source) => source,
    }
}

/// Apply `TINYWS_*` overrides looked up through `env`.
///
/// Unparseable or out-of-range values are logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut Settings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let reader = EnvReader { env };

    if let Some(v) = reader.string("TINYWS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = reader.parsed("TINYWS_PORT", |s| parse_u16_range(s, 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = reader.parsed("TINYWS_READ_TIMEOUT_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.server.read_timeout_ms = v;
    }
    if let Some(v) = reader.parsed("TINYWS_MAX_FRAME_SIZE", |s| {
        parse_usize_range(s, 1, 1 << 30)
    }) {
        settings.server.max_frame_size = v;
    }
    if let Some(v) = reader.string("TINYWS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = reader.parsed("TINYWS_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
    if let Some(v) = reader.parsed("TINYWS_BROADCAST_INTERVAL_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.demo.broadcast_interval_ms = v;
    }
    if let Some(v) = reader.parsed("TINYWS_STATS_INTERVAL_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.demo.stats_interval_ms = v;
    }
}

struct EnvReader<F> {
    env: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.string(name)?;
        let value = parse(raw.trim());
        if value.is_none() {
            warn!(key = name, value = %raw, "ignoring invalid env override");
        }
        value
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` in `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.parse().ok().filter(|n| (min..=max).contains(n))
}

/// Parse a `u64` in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse().ok().filter(|n| (min..=max).contains(n))
}

/// Parse a `usize` in `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.parse().ok().filter(|n| (min..=max).contains(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_keeps_siblings() {
        let target = serde_json::json!({"server": {"port": 8081, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_is_skipped() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": null}),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_arrays_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_scalar_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(&dir.path().join("absent.json"), no_env).unwrap();
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.demo.echo_repeats, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9999, "readTimeoutMs": 100000}, "demo": {"clients": 5}}"#,
        )
        .unwrap();
        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.read_timeout_ms, 100_000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.demo.clients, 5);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_with_env(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"maxFrameSize": 0}}"#).unwrap();
        let err = load_with_env(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9999}}"#).unwrap();
        let env = env_of(&[
            ("TINYWS_PORT", "7000"),
            ("TINYWS_HOST", "0.0.0.0"),
            ("TINYWS_LOG_JSON", "yes"),
            ("TINYWS_BROADCAST_INTERVAL_MS", "250"),
        ]);
        let settings = load_with_env(&path, env).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.logging.json);
        assert_eq!(settings.demo.broadcast_interval_ms, 250);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env_of(&[
                ("TINYWS_PORT", "not-a-port"),
                ("TINYWS_READ_TIMEOUT_MS", "0"),
                ("TINYWS_LOG_JSON", "maybe"),
                ("TINYWS_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.server.read_timeout_ms, 30_000);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn parse_bool_variants() {
        for yes in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(parse_bool(yes), Some(true), "{yes}");
        }
        for no in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(no), Some(false), "{no}");
        }
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8081", 1, 65535), Some(8081));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("100", 1, 100), Some(100));
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("abc", 0, 10), None);
    }

    #[test]
    fn settings_path_ends_with_tinyws() {
        let path = settings_path();
        assert!(path.ends_with(".tinyws/settings.json"));
    }
}

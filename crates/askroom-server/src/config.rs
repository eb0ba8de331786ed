//! Server and process configuration.
//!
//! Loading flow:
//! 1. Start with compiled defaults
//! 2. If a JSON config file was given, deep-merge its values over the defaults
//! 3. Apply `ASKROOM_*` environment overrides
//!
//! The binary applies CLI flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Listener and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks a free port.
    pub port: u16,
    /// Outbound events buffered per watcher before it is considered dead.
    pub send_queue_capacity: usize,
    pub heartbeat_interval_secs: u64,
    /// Watchers silent for this long are disconnected.
    pub heartbeat_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("send_queue_capacity must be at least 1".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("heartbeat_interval_secs must be at least 1".into()));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(ConfigError::InvalidValue(format!(
                "heartbeat_timeout_secs ({}) is shorter than heartbeat_interval_secs ({})",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

/// Everything the binary needs to start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// SQLite file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_path: None,
            log_level: "info".into(),
            log_json: false,
        }
    }
}

/// Load configuration from an optional file plus the process environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Deep-merge a JSON file over the defaults. A missing file is an error:
/// it was asked for explicitly.
pub fn load_file(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(?path, "loading config file");
    let defaults = serde_json::to_value(AppConfig::default())?;
    let content = std::fs::read_to_string(path)?;
    let user: Value = serde_json::from_str(&content)?;
    Ok(serde_json::from_value(deep_merge(defaults, user))?)
}

/// Objects merge per key, everything else is replaced, nulls are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ASKROOM_*` overrides read through `lookup`.
///
/// Values are parsed strictly; anything out of range is ignored with a warning.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("ASKROOM_HOST") {
        config.server.host = v;
    }
    if let Some(v) = env.parsed("ASKROOM_PORT", |s| parse_range::<u16>(s, 0, u16::MAX)) {
        config.server.port = v;
    }
    if let Some(v) = env.parsed("ASKROOM_SEND_QUEUE_CAPACITY", |s| parse_range::<usize>(s, 1, 65_536)) {
        config.server.send_queue_capacity = v;
    }
    if let Some(v) = env.parsed("ASKROOM_HEARTBEAT_INTERVAL_SECS", |s| parse_range::<u64>(s, 1, 3_600)) {
        config.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.parsed("ASKROOM_HEARTBEAT_TIMEOUT_SECS", |s| parse_range::<u64>(s, 1, 86_400)) {
        config.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.parsed("ASKROOM_SHUTDOWN_TIMEOUT_SECS", |s| parse_range::<u64>(s, 1, 600)) {
        config.server.shutdown_timeout_secs = v;
    }
    if let Some(v) = env.string("ASKROOM_DATABASE") {
        config.database_path = Some(PathBuf::from(v));
    }
    if let Some(v) = env.string("ASKROOM_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = env.parsed("ASKROOM_LOG_JSON", parse_bool) {
        config.log_json = v;
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer and accept it only within `min..=max`.
pub fn parse_range<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.string(name)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            warn!(key = name, value = %raw, "invalid env override, ignoring");
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.send_queue_capacity, 256);
        assert_eq!(cfg.server.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.server.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.server.shutdown_timeout(), Duration::from_secs(10));
        assert!(cfg.database_path.is_none());
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.log_json);
        assert!(cfg.server.validate().is_ok());
    }

    #[test]
    fn deep_merge_objects_recursively() {
        let merged = deep_merge(
            json!({"server": {"host": "a", "port": 1}, "log_json": false}),
            json!({"server": {"port": 2}, "log_json": null}),
        );
        assert_eq!(merged, json!({"server": {"host": "a", "port": 2}, "log_json": false}));
    }

    #[test]
    fn deep_merge_replaces_non_objects() {
        assert_eq!(deep_merge(json!([1, 2]), json!([3])), json!([3]));
        assert_eq!(deep_merge(json!({"a": 1}), json!("x")), json!("x"));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askroom.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9000}, "database_path": "/var/lib/askroom.db"}"#,
        )
        .unwrap();

        let cfg = load_file(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.database_path, Some(PathBuf::from("/var/lib/askroom.db")));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file(&path).unwrap_err(), ConfigError::Json(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("ASKROOM_HOST", "0.0.0.0"),
                ("ASKROOM_PORT", "3000"),
                ("ASKROOM_SEND_QUEUE_CAPACITY", "16"),
                ("ASKROOM_HEARTBEAT_INTERVAL_SECS", "5"),
                ("ASKROOM_HEARTBEAT_TIMEOUT_SECS", "15"),
                ("ASKROOM_SHUTDOWN_TIMEOUT_SECS", "2"),
                ("ASKROOM_DATABASE", "rooms.db"),
                ("ASKROOM_LOG_LEVEL", "debug"),
                ("ASKROOM_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.send_queue_capacity, 16);
        assert_eq!(cfg.server.heartbeat_interval_secs, 5);
        assert_eq!(cfg.server.heartbeat_timeout_secs, 15);
        assert_eq!(cfg.server.shutdown_timeout_secs, 2);
        assert_eq!(cfg.database_path, Some(PathBuf::from("rooms.db")));
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.log_json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("ASKROOM_PORT", "70000"),
                ("ASKROOM_SEND_QUEUE_CAPACITY", "0"),
                ("ASKROOM_LOG_JSON", "maybe"),
                ("ASKROOM_HOST", ""),
            ]),
        );
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_range::<u64>("10", 1, 10), Some(10));
        assert_eq!(parse_range::<u64>("11", 1, 10), None);
        assert_eq!(parse_range::<u64>("-1", 0, 10), None);
        assert_eq!(parse_range::<u16>("70000", 0, u16::MAX), None);
    }

    #[test]
    fn validate_rejects_inconsistent_heartbeat() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 60,
            heartbeat_timeout_secs: 30,
            ..ServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue(_))));

        let cfg = ServerConfig {
            send_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serde_roundtrip_with_partial_input() {
        let cfg: AppConfig = serde_json::from_str(r#"{"log_json": true}"#).unwrap();
        assert!(cfg.log_json);
        assert_eq!(cfg.server, ServerConfig::default());
    }
}

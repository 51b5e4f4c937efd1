//! Layered configuration: built-in defaults, then the default file, then the
//! user file. Keys are dotted paths such as `security.backup_before_modify`.

use janus_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config/default_config.yaml";
pub const USER_CONFIG_FILE: &str = "config/user_config.yaml";

const REQUIRED_KEYS: [&str; 4] = [
    "app.name",
    "app.version",
    "backup.backup_directory",
    "logging.log_directory",
];

pub fn defaults() -> Value {
    json!({
        "app": {
            "name": "janus",
            "version": "1.0.0-alpha",
            "debug": false,
            "log_level": "INFO"
        },
        "security": {
            "require_confirmation": true,
            "backup_before_modify": true,
            "max_backup_count": 10,
            "enable_audit_log": true
        },
        "backup": {
            "backup_directory": "./backups",
            "compression_enabled": false,
            "max_backup_size": 1_073_741_824u64
        },
        "logging": {
            "log_directory": "./logs",
            "max_log_size": 10_485_760u64,
            "max_log_files": 5,
            "log_retention_days": 30
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecuritySettings {
    pub require_confirmation: bool,
    pub backup_before_modify: bool,
    pub max_backup_count: usize,
    pub enable_audit_log: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub backup_directory: PathBuf,
    pub compression_enabled: bool,
    pub max_backup_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub log_directory: PathBuf,
    pub max_log_size: u64,
    pub max_log_files: usize,
    pub log_retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    data: Value,
    user_file: PathBuf,
}

fn config_err(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Config(format!("{}: {err}", path.display()))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Parses a config file by extension. A missing file is `Ok(None)`.
fn read_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| config_err(path, e))?;
    let value: Value = if is_json(path) {
        serde_json::from_str(&text).map_err(|e| config_err(path, e))?
    } else {
        serde_yaml::from_str(&text).map_err(|e| config_err(path, e))?
    };
    // an empty YAML document parses as null
    Ok(Some(if value.is_null() { Value::Object(Map::new()) } else { value }))
}

fn write_file(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = if is_json(path) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_yaml::to_string(value).map_err(|e| config_err(path, e))?
    };
    fs::write(path, text).map_err(|e| config_err(path, e))
}

/// Objects merge key by key; anything else replaces.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn set_path(node: &mut Value, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_path(child, rest, value);
    }
}

impl Config {
    /// Defaults only; `save` goes to `user_file`.
    pub fn with_defaults(user_file: impl Into<PathBuf>) -> Self {
        Self {
            data: defaults(),
            user_file: user_file.into(),
        }
    }

    pub fn load(default_file: &Path, user_file: &Path) -> Result<Self> {
        let mut config = Self::with_defaults(user_file);
        for path in [default_file, user_file] {
            if let Some(layer) = read_file(path)? {
                tracing::debug!(file = %path.display(), "config layer loaded");
                merge(&mut config.data, layer);
            }
        }
        Ok(config)
    }

    /// The standard file locations, or `user_file` in place of the user layer.
    pub fn load_standard(user_file: Option<&Path>) -> Result<Self> {
        let user = user_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(USER_CONFIG_FILE));
        Self::load(Path::new(DEFAULT_CONFIG_FILE), &user)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.data, |node, part| node.as_object()?.get(part))
    }

    /// Falls back to `default` when the key is absent or has the wrong type.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    /// Creates intermediate objects as needed.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Config("empty key".to_string()));
        }
        let value = serde_json::to_value(value)?;
        let parts: Vec<&str> = key.split('.').collect();
        set_path(&mut self.data, &parts, value);
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.export(&self.user_file)
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        write_file(path, &self.data)?;
        tracing::info!(file = %path.display(), "configuration written");
        Ok(())
    }

    /// Merges a file over the current values.
    pub fn import(&mut self, path: &Path) -> Result<()> {
        let layer = read_file(path)?
            .ok_or_else(|| Error::Config(format!("{} does not exist", path.display())))?;
        merge(&mut self.data, layer);
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) {
        self.data = defaults();
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| self.get_value(key).map_or(true, Value::is_null))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing keys: {}", missing.join(", "))))
        }
    }

    pub fn log_level(&self) -> String {
        self.get("app.log_level", "INFO".to_string())
    }

    pub fn security(&self) -> SecuritySettings {
        SecuritySettings {
            require_confirmation: self.get("security.require_confirmation", true),
            backup_before_modify: self.get("security.backup_before_modify", true),
            max_backup_count: self.get("security.max_backup_count", 10),
            enable_audit_log: self.get("security.enable_audit_log", true),
        }
    }

    pub fn backup(&self) -> BackupSettings {
        BackupSettings {
            backup_directory: self.get("backup.backup_directory", PathBuf::from("./backups")),
            compression_enabled: self.get("backup.compression_enabled", false),
            max_backup_size: self.get("backup.max_backup_size", 1_073_741_824),
        }
    }

    pub fn logging(&self) -> LoggingSettings {
        LoggingSettings {
            log_directory: self.get("logging.log_directory", PathBuf::from("./logs")),
            max_log_size: self.get("logging.max_log_size", 10_485_760),
            max_log_files: self.get("logging.max_log_files", 5),
            log_retention_days: self.get("logging.log_retention_days", 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::with_defaults("unused.yaml");
        config.validate().unwrap();
        assert_eq!(config.get("app.name", String::new()), "janus");
        assert!(config.security().backup_before_modify);
        assert_eq!(config.backup().max_backup_size, 1_073_741_824);
        assert_eq!(config.logging().max_log_files, 5);
    }

    #[test]
    fn user_layer_overrides_default_layer() {
        let tmp = tempfile::tempdir().unwrap();
        let default_file = tmp.path().join("default.yaml");
        let user_file = tmp.path().join("user.yaml");
        fs::write(&default_file, "security:\n  max_backup_count: 3\napp:\n  debug: true\n").unwrap();
        fs::write(&user_file, "security:\n  max_backup_count: 7\n").unwrap();

        let config = Config::load(&default_file, &user_file).unwrap();
        assert_eq!(config.security().max_backup_count, 7);
        assert!(config.get("app.debug", false));
        assert!(config.security().require_confirmation);
    }

    #[test]
    fn missing_files_are_skipped_and_bad_files_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&tmp.path().join("a.yaml"), &tmp.path().join("b.yaml")).unwrap();
        assert_eq!(config.log_level(), "INFO");

        let bad = tmp.path().join("bad.json");
        fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(
            Config::load(&bad, &tmp.path().join("b.yaml")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn wrong_type_falls_back_to_default() {
        let mut config = Config::with_defaults("unused.yaml");
        config.set("security.max_backup_count", "many").unwrap();
        assert_eq!(config.security().max_backup_count, 10);
    }

    #[test]
    fn set_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let user_file = tmp.path().join("config").join("user.yaml");
        let mut config = Config::with_defaults(&user_file);
        config.set("backup.backup_directory", "/var/janus").unwrap();
        config.set("extra.nested.flag", true).unwrap();
        config.save().unwrap();

        let reloaded = Config::load(&tmp.path().join("none.yaml"), &user_file).unwrap();
        assert_eq!(reloaded.backup().backup_directory, PathBuf::from("/var/janus"));
        assert!(reloaded.get("extra.nested.flag", false));
    }

    #[test]
    fn export_import_json_and_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let exported = tmp.path().join("export.json");
        let mut config = Config::with_defaults("unused.yaml");
        config.set("app.log_level", "DEBUG").unwrap();
        config.export(&exported).unwrap();

        let mut other = Config::with_defaults("unused.yaml");
        other.import(&exported).unwrap();
        assert_eq!(other.log_level(), "DEBUG");

        other.reset_to_defaults();
        assert_eq!(other.log_level(), "INFO");
        assert!(other.import(&tmp.path().join("missing.json")).is_err());
    }

    #[test]
    fn validate_reports_missing_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let user_file = tmp.path().join("user.json");
        fs::write(&user_file, r#"{"app": {"name": null}}"#).unwrap();
        let config = Config::load(&tmp.path().join("none.yaml"), &user_file).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("app.name"));
    }
}

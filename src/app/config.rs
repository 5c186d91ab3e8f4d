use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::logging::APP_DIR_NAME;

pub const CONFIG_PATH_ENV: &str = "QUEST_ADB_TOOL_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdbSettings {
    /// Empty means auto-locate (bundled folder, PATH, Android SDK).
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    pub command_timeout_secs: u64,
    pub install_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            install_timeout_secs: 180,
        }
    }
}

impl CommandSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApkInstallSettings {
    pub replace_existing: bool,
    pub allow_downgrade: bool,
    pub allow_test_packages: bool,
}

impl Default for ApkInstallSettings {
    fn default() -> Self {
        Self {
            replace_existing: true,
            allow_downgrade: false,
            allow_test_packages: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub log_to_file: bool,
    /// Empty means the default location under the local data dir.
    pub log_dir: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
            log_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub apk_install: ApkInstallSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("config.json")
}

pub fn backup_config_path(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    let path = config_path();
    save_config_to_path(config, &path, &backup_config_path(&path))
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = CommandSettings::default();
    if config.command.command_timeout_secs == 0 {
        config.command.command_timeout_secs = defaults.command_timeout_secs;
    }
    if config.command.install_timeout_secs < config.command.command_timeout_secs {
        config.command.install_timeout_secs = defaults
            .install_timeout_secs
            .max(config.command.command_timeout_secs);
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = LoggingSettings::default().log_level;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().expect("tmp");
        let config = load_config_from_path(&tmp.path().join("absent.json")).expect("load");
        assert_eq!(config, AppConfig::default());
        assert!(config.apk_install.replace_existing);
        assert_eq!(config.command.install_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "adb": { "command_path": "/opt/platform-tools/adb" } }"#)
            .expect("write");

        let config = load_config_from_path(&path).expect("load");
        assert_eq!(config.adb.command_path, "/opt/platform-tools/adb");
        assert_eq!(config.command, CommandSettings::default());
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn save_writes_backup_of_previous_file() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("cfg").join("config.json");
        let backup = backup_config_path(&path);

        let mut config = AppConfig::default();
        save_config_to_path(&config, &path, &backup).expect("first save");
        assert!(!backup.exists());

        config.apk_install.allow_downgrade = true;
        save_config_to_path(&config, &path, &backup).expect("second save");
        assert!(backup.exists());

        let reloaded = load_config_from_path(&path).expect("reload");
        assert!(reloaded.apk_install.allow_downgrade);
        let previous = load_config_from_path(&backup).expect("backup");
        assert!(!previous.apk_install.allow_downgrade);
    }

    #[test]
    fn clamps_invalid_values() {
        let mut config = AppConfig::default();
        config.command.command_timeout_secs = 0;
        config.command.install_timeout_secs = 1;
        config.logging.log_level = "  ".to_string();
        let validated = validate_config(config);
        assert_eq!(validated.command.command_timeout_secs, 10);
        assert_eq!(validated.command.install_timeout_secs, 180);
        assert_eq!(validated.logging.log_level, "info");
    }

    #[test]
    fn rejects_malformed_json() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        let err = load_config_from_path(&path).expect_err("parse error");
        assert_eq!(err.code, "ERR_SYSTEM");
    }
}

use crate::error::SettingsError;
use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: LogRotation,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "power_nap".to_string()
}
fn default_rotation() -> LogRotation {
    LogRotation::Daily
}

/// Which runtime permission model the host platform follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PermissionPlatform {
    /// Permissions are granted at the OS level; nothing to prompt for
    Desktop,
    /// Android-style runtime grants, split at API level 31
    Android { api_level: u32 },
}

impl Default for PermissionPlatform {
    fn default() -> Self {
        Self::Desktop
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // BLE Settings
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    #[serde(default = "default_control_uuid")]
    pub control_char_uuid: Uuid,
    #[serde(default)]
    pub platform: PermissionPlatform,

    #[serde(default)]
    pub last_device_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            scan_window_secs: default_scan_window_secs(),
            service_uuid: default_service_uuid(),
            control_char_uuid: default_control_uuid(),
            platform: PermissionPlatform::default(),
            last_device_id: None,
        }
    }
}

fn default_scan_window_secs() -> u64 {
    protocol::SCAN_WINDOW_SECS
}
fn default_service_uuid() -> Uuid {
    protocol::SERVICE_UUID
}
fn default_control_uuid() -> Uuid {
    protocol::CONTROL_CHAR_UUID
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Loads settings from the user config directory, falling back to
    /// defaults when the file is missing or unreadable.
    pub fn new() -> Result<Self, SettingsError> {
        let settings_path = Self::default_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Settings::default()
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable settings at {}: {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn default_settings_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push("PowerNap");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> Result<Settings, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(&mut self, id: &str) -> Result<(), SettingsError> {
        if self.settings.last_device_id.as_deref() != Some(id) {
            self.settings.last_device_id = Some(id.to_string());
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("power_nap_{}_{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let service = SettingsService::with_path(temp_settings_path("missing"));
        let settings = service.get();
        assert_eq!(settings.scan_window_secs, 10);
        assert_eq!(settings.service_uuid, protocol::SERVICE_UUID);
        assert_eq!(settings.platform, PermissionPlatform::Desktop);
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_settings_path("roundtrip");
        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().platform = PermissionPlatform::Android { api_level: 33 };
        service.remember_device("AA:BB:CC:DD:EE:FF").unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.path(), path.as_path());
        assert_eq!(
            reloaded.get().platform,
            PermissionPlatform::Android { api_level: 33 }
        );
        assert_eq!(
            reloaded.get().last_device_id.as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "scan_window_secs": 4, "log_settings": { "rotation": "never" } }"#)
                .unwrap();
        assert_eq!(settings.scan_window_secs, 4);
        assert_eq!(settings.log_settings.rotation, LogRotation::Never);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(settings.control_char_uuid, protocol::CONTROL_CHAR_UUID);
    }
}

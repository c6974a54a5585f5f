use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hotkey::HotkeyConfig;
use crate::style::CustomStyle;

pub const PROVIDER_CLAUDE: &str = "claude";
pub const PROVIDER_OPENAI: &str = "openai";

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RephraserSettings {
    pub hotkey: HotkeyConfig,
    pub provider: String,
    pub style_id: String,
    pub custom_styles: Vec<CustomStyle>,
    pub show_notifications: bool,
    pub launch_at_login: bool,
}

impl Default for RephraserSettings {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            provider: PROVIDER_CLAUDE.to_string(),
            style_id: "builtin-standard".to_string(),
            custom_styles: Vec::new(),
            show_notifications: true,
            launch_at_login: false,
        }
    }
}

impl RephraserSettings {
    fn normalized(mut self) -> Result<Self, String> {
        self.hotkey.validate()?;
        self.provider = normalize_provider(self.provider)?;
        self.style_id = normalize_required_string(self.style_id, "style_id")?;

        Ok(self)
    }

    fn with_update(mut self, update: RephraserSettingsUpdate) -> Result<Self, String> {
        if let Some(hotkey) = update.hotkey {
            self.hotkey = hotkey;
        }

        if let Some(provider) = update.provider {
            self.provider = provider;
        }

        if let Some(style_id) = update.style_id {
            self.style_id = style_id;
        }

        if let Some(custom_styles) = update.custom_styles {
            self.custom_styles = custom_styles;
        }

        if let Some(show_notifications) = update.show_notifications {
            self.show_notifications = show_notifications;
        }

        if let Some(launch_at_login) = update.launch_at_login {
            self.launch_at_login = launch_at_login;
        }

        self.normalized()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RephraserSettingsUpdate {
    pub hotkey: Option<HotkeyConfig>,
    pub provider: Option<String>,
    pub style_id: Option<String>,
    pub custom_styles: Option<Vec<CustomStyle>>,
    pub show_notifications: Option<bool>,
    pub launch_at_login: Option<bool>,
}

#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<RephraserSettings>,
    io_lock: Mutex<()>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    pub fn new() -> Self {
        debug!("settings store initialized");
        Self {
            settings: RwLock::new(RephraserSettings::default()),
            io_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> RephraserSettings {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .unwrap_or_else(|_| RephraserSettings::default())
    }

    pub fn load(&self, data_dir: &Path) -> Result<RephraserSettings, String> {
        let settings_path = data_dir.join(SETTINGS_FILE_NAME);
        debug!(path = %settings_path.display(), "loading settings from disk");
        self.load_from_path(&settings_path)
    }

    pub fn update(
        &self,
        data_dir: &Path,
        update: RephraserSettingsUpdate,
    ) -> Result<RephraserSettings, String> {
        let settings_path = data_dir.join(SETTINGS_FILE_NAME);
        debug!(path = %settings_path.display(), "updating settings on disk");
        self.update_at_path(&settings_path, update)
    }

    fn load_from_path(&self, settings_path: &Path) -> Result<RephraserSettings, String> {
        let _io_guard = self.io_lock.lock().map_err(|_| io_lock_error())?;
        let settings = read_settings_file_with_recovery(settings_path)?;
        let mut guard = self.settings.write().map_err(|_| lock_error())?;
        *guard = settings.clone();
        Ok(settings)
    }

    fn update_at_path(
        &self,
        settings_path: &Path,
        update: RephraserSettingsUpdate,
    ) -> Result<RephraserSettings, String> {
        let _io_guard = self.io_lock.lock().map_err(|_| io_lock_error())?;
        let current_settings = read_settings_file_with_recovery(settings_path)?;
        let updated_settings = current_settings.with_update(update)?;
        write_settings_file(settings_path, &updated_settings)?;

        let mut guard = self.settings.write().map_err(|_| lock_error())?;
        *guard = updated_settings.clone();
        Ok(updated_settings)
    }
}

#[derive(Debug)]
struct SettingsReadError {
    message: String,
    recoverable: bool,
}

impl SettingsReadError {
    fn read(message: String) -> Self {
        Self {
            message,
            recoverable: false,
        }
    }

    fn malformed(message: String) -> Self {
        Self {
            message,
            recoverable: true,
        }
    }
}

fn read_settings_file_with_recovery(settings_path: &Path) -> Result<RephraserSettings, String> {
    match read_settings_file(settings_path) {
        Ok(settings) => Ok(settings),
        Err(error) if error.recoverable => {
            let backup_path = backup_corrupt_settings_file(settings_path)?;
            let defaults = RephraserSettings::default();
            write_settings_file(settings_path, &defaults)?;
            warn!(
                path = %settings_path.display(),
                backup = %backup_path.display(),
                reason = %error.message,
                "recovered malformed settings file"
            );
            Ok(defaults)
        }
        Err(error) => Err(error.message),
    }
}

fn read_settings_file(settings_path: &Path) -> Result<RephraserSettings, SettingsReadError> {
    if !settings_path.exists() {
        info!(path = %settings_path.display(), "settings file missing; using defaults");
        return Ok(RephraserSettings::default());
    }

    let file_contents = fs::read_to_string(settings_path)
        .map_err(|error| {
            format!(
                "Failed to read settings file `{}`: {error}",
                settings_path.display()
            )
        })
        .map_err(SettingsReadError::read)?;

    let parsed = serde_json::from_str::<RephraserSettings>(&file_contents).map_err(|error| {
        SettingsReadError::malformed(format!(
            "Failed to parse settings file `{}`: {error}",
            settings_path.display()
        ))
    })?;

    parsed.normalized().map_err(|error| {
        SettingsReadError::malformed(format!(
            "Failed to validate settings file `{}`: {error}",
            settings_path.display()
        ))
    })
}

fn write_settings_file(settings_path: &Path, settings: &RephraserSettings) -> Result<(), String> {
    if let Some(parent_dir) = settings_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create settings directory `{}`: {error}",
                parent_dir.display()
            )
        })?;
    }

    let serialized = serde_json::to_vec_pretty(settings)
        .map_err(|error| format!("Failed to serialize settings: {error}"))?;
    write_atomic_file(settings_path, &serialized)?;

    info!(
        path = %settings_path.display(),
        provider = %settings.provider,
        style = %settings.style_id,
        hotkey = %settings.hotkey.display_name,
        "settings file written"
    );
    Ok(())
}

fn write_atomic_file(file_path: &Path, contents: &[u8]) -> Result<(), String> {
    let temp_path = temp_file_path_for(file_path);
    let mut temp_file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .map_err(|error| {
            format!(
                "Failed to create temp settings file `{}`: {error}",
                temp_path.display()
            )
        })?;

    if let Err(error) = temp_file.write_all(contents) {
        let _ = fs::remove_file(&temp_path);
        return Err(format!(
            "Failed to write temp settings file `{}`: {error}",
            temp_path.display()
        ));
    }

    if let Err(error) = temp_file.sync_all() {
        let _ = fs::remove_file(&temp_path);
        return Err(format!(
            "Failed to flush temp settings file `{}`: {error}",
            temp_path.display()
        ));
    }

    drop(temp_file);

    fs::rename(&temp_path, file_path).map_err(|error| {
        let _ = fs::remove_file(&temp_path);
        format!(
            "Failed to finalize settings file `{}`: {error}",
            file_path.display()
        )
    })?;

    Ok(())
}

fn temp_file_path_for(file_path: &Path) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = file_path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("settings.json");
    let pid = std::process::id();

    file_path.with_file_name(format!(".{file_name}.{pid}.{timestamp}.tmp"))
}

fn backup_corrupt_settings_file(settings_path: &Path) -> Result<PathBuf, String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = settings_path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("settings.json");
    let backup_path = settings_path.with_file_name(format!(
        "{file_name}.corrupt-{}-{timestamp}.bak",
        std::process::id()
    ));

    fs::rename(settings_path, &backup_path).map_err(|error| {
        format!(
            "Failed to backup malformed settings file `{}` to `{}`: {error}",
            settings_path.display(),
            backup_path.display()
        )
    })?;

    Ok(backup_path)
}

fn normalize_required_string(value: String, field_name: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("`{field_name}` cannot be empty"));
    }

    Ok(trimmed.to_string())
}

fn normalize_provider(value: String) -> Result<String, String> {
    let normalized = normalize_required_string(value, "provider")?.to_lowercase();
    match normalized.as_str() {
        PROVIDER_CLAUDE | PROVIDER_OPENAI => Ok(normalized),
        _ => Err(format!(
            "Unsupported provider `{normalized}`. Expected `{PROVIDER_CLAUDE}` or `{PROVIDER_OPENAI}`"
        )),
    }
}

fn lock_error() -> String {
    "Settings store lock was poisoned".to_string()
}

fn io_lock_error() -> String {
    "Settings store IO lock was poisoned".to_string()
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn unique_settings_path(prefix: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("rephraser-settings-store-{prefix}-{timestamp}"))
            .join("settings.json")
    }

    fn cleanup_settings_path(path: &Path) {
        if let Some(parent_dir) = path.parent() {
            let _ = fs::remove_dir_all(parent_dir);
        }
    }

    fn corrupt_backup_paths(settings_path: &Path) -> Vec<PathBuf> {
        let Some(parent_dir) = settings_path.parent() else {
            return Vec::new();
        };
        let Some(file_name) = settings_path.file_name().and_then(|name| name.to_str()) else {
            return Vec::new();
        };

        let mut backups = Vec::new();
        if let Ok(entries) = fs::read_dir(parent_dir) {
            for entry in entries.flatten() {
                if let Some(candidate) = entry.file_name().to_str() {
                    if candidate.starts_with(&format!("{file_name}.corrupt-"))
                        && candidate.ends_with(".bak")
                    {
                        backups.push(entry.path());
                    }
                }
            }
        }

        backups
    }

    #[test]
    fn defaults_match_expected_schema() {
        let defaults = RephraserSettings::default();

        assert_eq!(defaults.hotkey, HotkeyConfig::default());
        assert_eq!(defaults.provider, PROVIDER_CLAUDE);
        assert_eq!(defaults.style_id, "builtin-standard");
        assert!(defaults.custom_styles.is_empty());
        assert!(defaults.show_notifications);
        assert!(!defaults.launch_at_login);
    }

    #[test]
    fn load_uses_defaults_when_settings_file_is_missing() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("missing");

        let loaded = store
            .load_from_path(&settings_path)
            .expect("loading missing settings should succeed");

        assert_eq!(loaded, RephraserSettings::default());
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_persists_settings_to_disk() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("persist");

        let custom = CustomStyle::new("Pirate", "Talk like a pirate", "Arr, rephrase this:");
        let updated = store
            .update_at_path(
                &settings_path,
                RephraserSettingsUpdate {
                    provider: Some("OpenAI".to_string()),
                    style_id: Some(format!("custom-{}", custom.id)),
                    custom_styles: Some(vec![custom.clone()]),
                    show_notifications: Some(false),
                    launch_at_login: Some(true),
                    ..RephraserSettingsUpdate::default()
                },
            )
            .expect("update should succeed");

        let reloaded = read_settings_file(&settings_path).expect("reloading persisted settings");

        assert_eq!(updated.provider, PROVIDER_OPENAI);
        assert_eq!(updated.style_id, format!("custom-{}", custom.id));
        assert_eq!(updated.custom_styles, vec![custom]);
        assert!(!updated.show_notifications);
        assert!(updated.launch_at_login);
        assert_eq!(reloaded, updated);

        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_rejects_unknown_provider() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("invalid-provider");

        let error = store
            .update_at_path(
                &settings_path,
                RephraserSettingsUpdate {
                    provider: Some("gemini".to_string()),
                    ..RephraserSettingsUpdate::default()
                },
            )
            .expect_err("unsupported provider should fail");

        assert!(error.contains("Unsupported provider"));
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_rejects_invalid_hotkey_config() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("invalid-hotkey");

        let mut hotkey = HotkeyConfig::default();
        hotkey.sequence_count = 0;

        let error = store
            .update_at_path(
                &settings_path,
                RephraserSettingsUpdate {
                    hotkey: Some(hotkey),
                    ..RephraserSettingsUpdate::default()
                },
            )
            .expect_err("invalid hotkey should fail");

        assert!(error.contains("sequence count"));
        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn load_recovers_from_malformed_json_by_backing_up_and_resetting_defaults() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("malformed");

        if let Some(parent_dir) = settings_path.parent() {
            fs::create_dir_all(parent_dir).expect("malformed test directory should be created");
        }
        fs::write(&settings_path, "{ definitely not json")
            .expect("malformed settings should be written");

        let recovered = store
            .load_from_path(&settings_path)
            .expect("malformed settings should be recovered");

        assert_eq!(recovered, RephraserSettings::default());
        assert_eq!(corrupt_backup_paths(&settings_path).len(), 1);

        cleanup_settings_path(&settings_path);
    }

    #[test]
    fn update_recovers_from_malformed_json_before_applying_changes() {
        let store = SettingsStore::new();
        let settings_path = unique_settings_path("malformed-update");

        if let Some(parent_dir) = settings_path.parent() {
            fs::create_dir_all(parent_dir).expect("malformed update directory should be created");
        }
        fs::write(&settings_path, "{ broken ")
            .expect("malformed settings should be written for update test");

        let updated = store
            .update_at_path(
                &settings_path,
                RephraserSettingsUpdate {
                    show_notifications: Some(false),
                    ..RephraserSettingsUpdate::default()
                },
            )
            .expect("update should recover malformed settings");

        assert!(!updated.show_notifications);
        assert_eq!(updated.provider, PROVIDER_CLAUDE);
        assert_eq!(corrupt_backup_paths(&settings_path).len(), 1);
        cleanup_settings_path(&settings_path);
    }
}

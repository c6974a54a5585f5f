//! Persistent rephrasing history. Both successful and failed runs are
//! recorded, capped at the most recent 100 entries.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const HISTORY_FILE_NAME: &str = "rephrase_history.json";
pub const MAX_HISTORY_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub original_text: String,
    #[serde(default)]
    pub rephrased_text: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    pub provider: String,
    pub is_success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HistoryEntry {
    pub fn success(
        original_text: String,
        rephrased_text: String,
        app_name: Option<String>,
        style: Option<String>,
        provider: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_text,
            rephrased_text: Some(rephrased_text),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            app_name: normalize_optional(app_name),
            style: normalize_optional(style),
            provider: provider.trim().to_string(),
            is_success: true,
            error_message: None,
        }
    }

    pub fn failure(
        original_text: String,
        error_message: String,
        app_name: Option<String>,
        style: Option<String>,
        provider: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_text,
            rephrased_text: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            app_name: normalize_optional(app_name),
            style: normalize_optional(style),
            provider: provider.trim().to_string(),
            is_success: false,
            error_message: Some(error_message),
        }
    }
}

#[derive(Debug)]
pub struct HistoryStore {
    file_path: PathBuf,
    io_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(data_dir: &Path) -> Result<Self, String> {
        Self::new_with_file_path(data_dir.join(HISTORY_FILE_NAME))
    }

    pub fn new_with_file_path(file_path: PathBuf) -> Result<Self, String> {
        ensure_history_file(&file_path)?;
        Ok(Self {
            file_path,
            io_lock: Mutex::new(()),
        })
    }

    pub fn add_entry(&self, entry: HistoryEntry) -> Result<(), String> {
        validate_entry(&entry)?;

        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| "History store lock is poisoned".to_string())?;
        let mut entries = self.read_entries()?;

        entries.push(entry);
        entries.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        entries.truncate(MAX_HISTORY_ENTRIES);

        self.write_entries(&entries)
    }

    pub fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>, String> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| "History store lock is poisoned".to_string())?;
        let mut entries = self.read_entries()?;
        entries.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<HistoryEntry>, String> {
        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| "History store lock is poisoned".to_string())?;
        let entries = self.read_entries()?;

        Ok(entries.into_iter().find(|entry| entry.id == id))
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool, String> {
        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| "History store lock is poisoned".to_string())?;
        let mut entries = self.read_entries()?;
        let original_len = entries.len();

        entries.retain(|entry| entry.id != id);
        let deleted = entries.len() != original_len;

        if deleted {
            self.write_entries(&entries)?;
        }

        Ok(deleted)
    }

    pub fn clear_history(&self) -> Result<(), String> {
        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| "History store lock is poisoned".to_string())?;
        self.write_entries(&[])
    }

    fn read_entries(&self) -> Result<Vec<HistoryEntry>, String> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let raw_contents = fs::read_to_string(&self.file_path)
            .map_err(|error| format!("Failed to read rephrase history file: {error}"))?;

        if raw_contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<HistoryEntry>>(&raw_contents)
            .map_err(|error| format!("Failed to parse rephrase history file: {error}"))
    }

    fn write_entries(&self, entries: &[HistoryEntry]) -> Result<(), String> {
        let serialized = serde_json::to_vec_pretty(entries)
            .map_err(|error| format!("Failed to serialize rephrase history entries: {error}"))?;
        let temp_path = self.file_path.with_extension("tmp");

        fs::write(&temp_path, serialized)
            .map_err(|error| format!("Failed to write rephrase history temp file: {error}"))?;
        fs::rename(&temp_path, &self.file_path)
            .map_err(|error| format!("Failed to finalize rephrase history file: {error}"))?;

        Ok(())
    }
}

fn ensure_history_file(file_path: &Path) -> Result<(), String> {
    if let Some(parent_dir) = file_path.parent() {
        fs::create_dir_all(parent_dir)
            .map_err(|error| format!("Failed to create history directory: {error}"))?;
    }

    if !file_path.exists() {
        fs::write(file_path, "[]")
            .map_err(|error| format!("Failed to initialize history file: {error}"))?;
    }

    Ok(())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn validate_entry(entry: &HistoryEntry) -> Result<(), String> {
    if entry.id.trim().is_empty() {
        return Err("History entry id cannot be empty".to_string());
    }

    // Failure entries may have captured nothing (an empty selection is
    // itself a recordable failure); successes always carry the source.
    if entry.is_success && entry.original_text.trim().is_empty() {
        return Err("Successful history entry original text cannot be empty".to_string());
    }

    if entry.timestamp.trim().is_empty() {
        return Err("History entry timestamp cannot be empty".to_string());
    }

    if entry.provider.trim().is_empty() {
        return Err("History entry provider cannot be empty".to_string());
    }

    if entry.is_success && entry.rephrased_text.is_none() {
        return Err("Successful history entry must carry rephrased text".to_string());
    }

    Ok(())
}

use std::path::PathBuf;

const DATA_DIR_ENV: &str = "REPHRASER_DATA_DIR";

/// Runtime configuration for the background service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding settings, history, and the diagnostics log.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        if let Ok(override_dir) = std::env::var(DATA_DIR_ENV) {
            if !override_dir.trim().is_empty() {
                return Ok(Self {
                    data_dir: PathBuf::from(override_dir),
                });
            }
        }

        let home = std::env::var("HOME")
            .map_err(|error| format!("Failed to resolve home directory: {error}"))?;

        Ok(Self {
            data_dir: default_data_dir(&home),
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), String> {
        std::fs::create_dir_all(&self.data_dir).map_err(|error| {
            format!(
                "Failed to create data directory `{}`: {error}",
                self.data_dir.display()
            )
        })
    }
}

#[cfg(target_os = "macos")]
fn default_data_dir(home: &str) -> PathBuf {
    PathBuf::from(home)
        .join("Library")
        .join("Application Support")
        .join("rephraser")
}

#[cfg(not(target_os = "macos"))]
fn default_data_dir(home: &str) -> PathBuf {
    PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("rephraser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_is_under_home() {
        let data_dir = default_data_dir("/home/someone");
        assert!(data_dir.starts_with("/home/someone"));
        assert!(data_dir.to_string_lossy().contains("rephraser"));
    }
}

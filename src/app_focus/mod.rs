//! Tracks and restores the frontmost application.
//!
//! The provider round-trip can take seconds, during which the user may
//! click elsewhere. We remember which app held the selection and bring
//! it back to front before injecting the replacement.

use std::fmt;

/// The application that held focus when the hotkey fired. macOS lets us
/// re-activate by name through System Events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusError(pub String);

impl fmt::Display for FocusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "App focus operation failed: {}", self.0)
    }
}

impl std::error::Error for FocusError {}

pub trait FocusBackend: Send + Sync {
    /// Name of the frontmost application, if one can be determined.
    fn frontmost_app(&self) -> Result<Option<AppHandle>, FocusError>;
    fn activate(&self, app: &AppHandle) -> Result<(), FocusError>;
}

/// Backend shelling out to `osascript`; System Events reports and
/// activates applications by process name.
#[derive(Debug, Default)]
pub struct SystemFocusBackend;

#[cfg(target_os = "macos")]
impl FocusBackend for SystemFocusBackend {
    fn frontmost_app(&self) -> Result<Option<AppHandle>, FocusError> {
        let output = std::process::Command::new("osascript")
            .arg("-e")
            .arg(r#"tell application "System Events" to get name of first application process whose frontmost is true"#)
            .output()
            .map_err(|error| FocusError(format!("Failed to start osascript: {error}")))?;

        if !output.status.success() {
            return Err(FocusError(format!(
                "osascript exited with status: {}",
                output.status
            )));
        }

        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AppHandle { name }))
        }
    }

    fn activate(&self, app: &AppHandle) -> Result<(), FocusError> {
        // App names come from System Events; escape quotes anyway since
        // the name is interpolated into a script.
        let escaped = app.name.replace('\\', "\\\\").replace('"', "\\\"");
        let script = format!(r#"tell application "{escaped}" to activate"#);

        let output = std::process::Command::new("osascript")
            .args(["-e", &script])
            .output()
            .map_err(|error| FocusError(format!("Failed to start osascript: {error}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FocusError(format!(
                "Could not activate {}: {}",
                app.name,
                stderr.trim()
            )))
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl FocusBackend for SystemFocusBackend {
    fn frontmost_app(&self) -> Result<Option<AppHandle>, FocusError> {
        Ok(None)
    }

    fn activate(&self, _app: &AppHandle) -> Result<(), FocusError> {
        Err(FocusError(
            "App activation is only available on macOS".to_string(),
        ))
    }
}

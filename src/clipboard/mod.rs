//! Clipboard capture and injection built on a borrow-and-restore scheme.
//!
//! The user's clipboard is never left holding our data: every capture and
//! injection snapshots the previous contents up front and restores them
//! before returning, on success and on failure alike.

use std::fmt;
use std::time::Duration;

use tracing::warn;

pub const PRIME_DELAY_MS: u64 = 100;
pub const COPY_SETTLE_DELAY_MS: u64 = 300;
pub const PASTE_SETTLE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    AccessFailed(String),
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessFailed(detail) => write!(f, "Clipboard access failed: {detail}"),
        }
    }
}

impl std::error::Error for ClipboardError {}

/// Raw pasteboard and keystroke operations, split out so the broker's
/// sequencing can be tested without touching the real pasteboard.
pub trait ClipboardBackend: Send + Sync {
    /// Returns `None` when the clipboard holds no text (or nothing at all).
    fn read_text(&self) -> Result<Option<String>, String>;
    fn write_text(&self, text: &str) -> Result<(), String>;
    fn clear(&self) -> Result<(), String>;
    fn post_copy_keystroke(&self) -> Result<(), String>;
    fn post_paste_keystroke(&self) -> Result<(), String>;
}

/// Settle delays between keystroke injection and pasteboard reads. The
/// defaults account for how long frontmost apps take to service
/// synthetic Cmd+C / Cmd+V events; tests zero them out.
#[derive(Debug, Clone, Copy)]
pub struct ClipboardTiming {
    pub prime: Duration,
    pub copy_settle: Duration,
    pub paste_settle: Duration,
}

impl Default for ClipboardTiming {
    fn default() -> Self {
        Self {
            prime: Duration::from_millis(PRIME_DELAY_MS),
            copy_settle: Duration::from_millis(COPY_SETTLE_DELAY_MS),
            paste_settle: Duration::from_millis(PASTE_SETTLE_DELAY_MS),
        }
    }
}

impl ClipboardTiming {
    pub fn immediate() -> Self {
        Self {
            prime: Duration::ZERO,
            copy_settle: Duration::ZERO,
            paste_settle: Duration::ZERO,
        }
    }
}

pub struct ClipboardBroker<B: ClipboardBackend> {
    backend: B,
    timing: ClipboardTiming,
}

impl Default for ClipboardBroker<SystemClipboardBackend> {
    fn default() -> Self {
        Self::new(SystemClipboardBackend, ClipboardTiming::default())
    }
}

impl<B: ClipboardBackend> ClipboardBroker<B> {
    pub fn new(backend: B, timing: ClipboardTiming) -> Self {
        Self { backend, timing }
    }

    /// Captures the current selection by issuing a synthetic copy
    /// keystroke and reading the pasteboard once the frontmost app has
    /// had time to service it. An empty selection yields `Ok("")`.
    pub async fn capture_selection(&self) -> Result<String, ClipboardError> {
        let snapshot = self.snapshot()?;

        let result = self.capture_inner().await;

        self.restore(snapshot);
        result
    }

    async fn capture_inner(&self) -> Result<String, ClipboardError> {
        // Clearing first lets us tell "nothing selected" apart from
        // "copy keystroke was never serviced".
        self.backend
            .clear()
            .map_err(ClipboardError::AccessFailed)?;
        tokio::time::sleep(self.timing.prime).await;

        self.backend
            .post_copy_keystroke()
            .map_err(ClipboardError::AccessFailed)?;
        tokio::time::sleep(self.timing.copy_settle).await;

        let captured = self
            .backend
            .read_text()
            .map_err(ClipboardError::AccessFailed)?;

        Ok(captured.unwrap_or_default())
    }

    /// Replaces the current selection by writing `text` to the
    /// pasteboard and issuing a synthetic paste keystroke.
    pub async fn inject_replacement(&self, text: &str) -> Result<(), ClipboardError> {
        let snapshot = self.snapshot()?;

        let result = self.inject_inner(text).await;

        self.restore(snapshot);
        result
    }

    async fn inject_inner(&self, text: &str) -> Result<(), ClipboardError> {
        self.backend
            .write_text(text)
            .map_err(ClipboardError::AccessFailed)?;
        tokio::time::sleep(self.timing.prime).await;

        self.backend
            .post_paste_keystroke()
            .map_err(ClipboardError::AccessFailed)?;
        tokio::time::sleep(self.timing.paste_settle).await;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Borrowing is off the table if the current contents cannot be
    /// read: restoring would otherwise clear a clipboard that merely
    /// failed to answer one read.
    fn snapshot(&self) -> Result<Option<String>, ClipboardError> {
        self.backend.read_text().map_err(|error| {
            warn!(%error, "failed to snapshot clipboard before borrowing it");
            ClipboardError::AccessFailed(error)
        })
    }

    fn restore(&self, snapshot: Option<String>) {
        let result = match snapshot {
            Some(previous) => self.backend.write_text(&previous),
            None => self.backend.clear(),
        };
        if let Err(error) = result {
            warn!(%error, "failed to restore clipboard contents");
        }
    }
}

/// Backend driving the real pasteboard via `pbpaste`/`pbcopy` and
/// posting Cmd+C / Cmd+V through CoreGraphics.
#[derive(Debug, Default)]
pub struct SystemClipboardBackend;

#[cfg(target_os = "macos")]
impl ClipboardBackend for SystemClipboardBackend {
    fn read_text(&self) -> Result<Option<String>, String> {
        macos::read_pasteboard()
    }

    fn write_text(&self, text: &str) -> Result<(), String> {
        macos::write_pasteboard(text)
    }

    fn clear(&self) -> Result<(), String> {
        macos::write_pasteboard("")
    }

    fn post_copy_keystroke(&self) -> Result<(), String> {
        macos::post_command_key(macos::VIRTUAL_KEY_C)
    }

    fn post_paste_keystroke(&self) -> Result<(), String> {
        macos::post_command_key(macos::VIRTUAL_KEY_V)
    }
}

#[cfg(not(target_os = "macos"))]
impl ClipboardBackend for SystemClipboardBackend {
    fn read_text(&self) -> Result<Option<String>, String> {
        Err(unsupported())
    }

    fn write_text(&self, _text: &str) -> Result<(), String> {
        Err(unsupported())
    }

    fn clear(&self) -> Result<(), String> {
        Err(unsupported())
    }

    fn post_copy_keystroke(&self) -> Result<(), String> {
        Err(unsupported())
    }

    fn post_paste_keystroke(&self) -> Result<(), String> {
        Err(unsupported())
    }
}

#[cfg(not(target_os = "macos"))]
fn unsupported() -> String {
    "System clipboard access is only available on macOS".to_string()
}

#[cfg(target_os = "macos")]
mod macos {
    use std::ffi::c_void;
    use std::io::Write;
    use std::process::{Command, Stdio};
    use std::ptr;

    pub(super) const VIRTUAL_KEY_C: u16 = 0x08;
    pub(super) const VIRTUAL_KEY_V: u16 = 0x09;

    const K_CG_ANNOTATED_SESSION_EVENT_TAP: u32 = 2;
    const K_CG_EVENT_FLAG_MASK_COMMAND: u64 = 0x0010_0000;

    type CFTypeRef = *const c_void;
    type Boolean = u8;
    type CGKeyCode = u16;
    type CGEventSourceRef = *mut c_void;
    type CGEventRef = *mut c_void;
    type CGEventFlags = u64;
    type CGEventTapLocation = u32;

    #[link(name = "ApplicationServices", kind = "framework")]
    unsafe extern "C" {
        fn CGEventCreateKeyboardEvent(
            source: CGEventSourceRef,
            virtualKey: CGKeyCode,
            keyDown: Boolean,
        ) -> CGEventRef;
        fn CGEventPost(tap: CGEventTapLocation, event: CGEventRef);
        fn CGEventSetFlags(event: CGEventRef, flags: CGEventFlags);

        fn CFRelease(cf: CFTypeRef);
    }

    pub(super) fn read_pasteboard() -> Result<Option<String>, String> {
        let output = Command::new("pbpaste")
            .output()
            .map_err(|error| format!("Failed to start pbpaste: {error}"))?;

        if !output.status.success() {
            return Err(format!("pbpaste exited with status: {}", output.status));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|error| format!("Clipboard is not UTF-8 text: {error}"))?;

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    pub(super) fn write_pasteboard(text: &str) -> Result<(), String> {
        let mut child = Command::new("pbcopy")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|error| format!("Failed to start pbcopy: {error}"))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| "Failed to open pbcopy stdin".to_string())?;
            stdin
                .write_all(text.as_bytes())
                .map_err(|error| format!("Failed writing text to pbcopy: {error}"))?;
        }

        let status = child
            .wait()
            .map_err(|error| format!("Failed waiting for pbcopy: {error}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("pbcopy exited with status: {status}"))
        }
    }

    pub(super) fn post_command_key(virtual_key: u16) -> Result<(), String> {
        post_key_event(virtual_key, true)?;
        post_key_event(virtual_key, false)
    }

    fn post_key_event(virtual_key: u16, key_down: bool) -> Result<(), String> {
        unsafe {
            let event = CGEventCreateKeyboardEvent(ptr::null_mut(), virtual_key, key_down as Boolean);
            if event.is_null() {
                return Err("Failed to create keyboard event".to_string());
            }
            CGEventSetFlags(event, K_CG_EVENT_FLAG_MASK_COMMAND as CGEventFlags);
            CGEventPost(K_CG_ANNOTATED_SESSION_EVENT_TAP, event);
            CFRelease(event as CFTypeRef);
        }

        Ok(())
    }
}

use std::fmt;

use crate::app_focus::FocusError;
use crate::clipboard::ClipboardError;
use crate::provider::{DispatchError, ProviderError};

pub const MIN_TEXT_CHARS: usize = 3;
pub const MAX_TEXT_CHARS: usize = 4000;

/// Everything that can go wrong between the hotkey firing and the
/// replacement landing. Each variant carries a user-presentable
/// description and a recovery suggestion for the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RephraseError {
    NoTextSelected,
    TextTooShort,
    TextTooLong(usize),
    ClipboardAccessFailed,
    AccessibilityPermissionDenied,
    MissingApiKey,
    InvalidApiKey,
    Network(String),
    Provider(String),
    EmptyResponse,
    Timeout,
    AppSwitchFailed,
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    UserInput,
    Permission,
    Configuration,
    Network,
    Provider,
    Timeout,
    System,
}

impl RephraseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoTextSelected | Self::TextTooShort | Self::TextTooLong(_) => {
                ErrorCategory::UserInput
            }
            Self::ClipboardAccessFailed | Self::AccessibilityPermissionDenied => {
                ErrorCategory::Permission
            }
            Self::MissingApiKey | Self::InvalidApiKey => ErrorCategory::Configuration,
            Self::Network(_) => ErrorCategory::Network,
            Self::Provider(_) | Self::EmptyResponse => ErrorCategory::Provider,
            Self::Timeout => ErrorCategory::Timeout,
            Self::AppSwitchFailed | Self::Unexpected(_) => ErrorCategory::System,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NoTextSelected => {
                "Select some text in any application and try the hotkey again."
            }
            Self::TextTooShort => "Select at least a few words to rephrase.",
            Self::TextTooLong(_) => "Select a shorter portion of text (under 4000 characters).",
            Self::ClipboardAccessFailed => "Restart the app or check system permissions.",
            Self::AccessibilityPermissionDenied => {
                "Open System Settings > Security & Privacy > Accessibility and enable Rephraser."
            }
            Self::MissingApiKey => "Add your provider API key in Settings.",
            Self::InvalidApiKey => {
                "Verify your API key is correct in Settings or generate a new one."
            }
            Self::Network(_) => "Check your internet connection and try again.",
            Self::Provider(_) => {
                "Try again in a moment. If the problem persists, check your API key."
            }
            Self::EmptyResponse => "Try again in a moment with different text.",
            Self::Timeout => "Try again with a shorter text or check your internet connection.",
            Self::AppSwitchFailed => {
                "The text was rephrased but couldn't be automatically pasted. Copy it manually."
            }
            Self::Unexpected(_) => {
                "Try restarting the app. If the problem persists, contact support."
            }
        }
    }
}

impl fmt::Display for RephraseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTextSelected => {
                write!(f, "No text selected. Please select some text and try again.")
            }
            Self::TextTooShort => write!(
                f,
                "Text too short. Please select at least {MIN_TEXT_CHARS} characters."
            ),
            Self::TextTooLong(length) => write!(
                f,
                "Text too long ({length} characters). Please select a shorter text (max {MAX_TEXT_CHARS} characters)."
            ),
            Self::ClipboardAccessFailed => write!(
                f,
                "Unable to access clipboard. Please ensure the app has proper permissions."
            ),
            Self::AccessibilityPermissionDenied => write!(
                f,
                "Accessibility permission required. Please enable it in System Settings > Security & Privacy > Accessibility."
            ),
            Self::MissingApiKey => write!(
                f,
                "API key not configured. Please add your API key in Settings."
            ),
            Self::InvalidApiKey => write!(
                f,
                "Invalid API key. Please check your API key in Settings."
            ),
            Self::Network(message) => write!(
                f,
                "Network error: {message}. Please check your internet connection."
            ),
            Self::Provider(message) => write!(f, "Provider error: {message}"),
            Self::EmptyResponse => write!(f, "No content received from the provider."),
            Self::Timeout => write!(f, "Processing timed out. Please try again with shorter text."),
            Self::AppSwitchFailed => {
                write!(f, "Unable to switch back to the original application.")
            }
            Self::Unexpected(message) => write!(f, "Unexpected error: {message}"),
        }
    }
}

impl std::error::Error for RephraseError {}

impl From<ClipboardError> for RephraseError {
    fn from(_error: ClipboardError) -> Self {
        Self::ClipboardAccessFailed
    }
}

impl From<FocusError> for RephraseError {
    fn from(_error: FocusError) -> Self {
        Self::AppSwitchFailed
    }
}

impl From<DispatchError> for RephraseError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Timeout(_) => Self::Timeout,
            DispatchError::Provider(provider_error) => provider_error.into(),
        }
    }
}

impl From<ProviderError> for RephraseError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::MissingApiKey => Self::MissingApiKey,
            ProviderError::Authentication(_) => Self::InvalidApiKey,
            ProviderError::Network(message) => Self::Network(message),
            ProviderError::InvalidResponse(message) | ProviderError::Provider(message) => {
                Self::Provider(message)
            }
            ProviderError::EmptyResponse => Self::EmptyResponse,
        }
    }
}

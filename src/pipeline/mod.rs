//! The end-to-end rephrase pipeline: capture the selection, validate
//! it, dispatch it to the provider, return focus to the source app,
//! inject the replacement, and record the outcome.

mod error;

pub use error::{ErrorCategory, RephraseError, MAX_TEXT_CHARS, MIN_TEXT_CHARS};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info, warn};

use crate::app_focus::FocusBackend;
use crate::clipboard::{ClipboardBackend, ClipboardBroker};
use crate::history::{HistoryEntry, HistoryStore};
use crate::notify::Notifier;
use crate::provider::ProviderDispatcher;
use crate::style::StyleOption;

pub struct RephrasePipeline<C: ClipboardBackend, F: FocusBackend, N: Notifier> {
    clipboard: ClipboardBroker<C>,
    focus: F,
    dispatcher: ProviderDispatcher,
    history: Arc<HistoryStore>,
    notifier: N,
    style: StyleOption,
    processing: AtomicBool,
}

/// Clears the busy flag on every exit path, panics included.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<C: ClipboardBackend, F: FocusBackend, N: Notifier> RephrasePipeline<C, F, N> {
    pub fn new(
        clipboard: ClipboardBroker<C>,
        focus: F,
        dispatcher: ProviderDispatcher,
        history: Arc<HistoryStore>,
        notifier: N,
        style: StyleOption,
    ) -> Self {
        Self {
            clipboard,
            focus,
            dispatcher,
            history,
            notifier,
            style,
            processing: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Entry point for a hotkey activation. Activations arriving while
    /// a run is in flight are dropped, not queued: the selection they
    /// referred to no longer exists once the current run pastes over it.
    pub async fn handle_activation(&self) {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("activation dropped: a rephrase run is already in flight");
            return;
        }
        let _guard = ProcessingGuard(&self.processing);

        match self.run_once().await {
            Ok(outcome) => {
                let char_count = outcome.rephrased.chars().count();
                info!(chars = char_count, "rephrase run completed");
                self.record_success(&outcome, &self.style, self.dispatcher.provider_name());
                self.notifier.notify_success(
                    &format!("Text rephrased successfully ({char_count} characters)"),
                    Some(self.style.display_name()),
                );
            }
            Err(failure) => {
                warn!(error = %failure.error, "rephrase run failed");
                self.record_failure(&failure, &self.style, self.dispatcher.provider_name());
                self.notifier.notify_error(
                    &failure.error.to_string(),
                    Some(failure.error.recovery_suggestion()),
                );
            }
        }
    }

    /// Rephrases text handed in directly, without touching the
    /// clipboard or keyboard focus. Callers may override the configured
    /// style or provider for this one request; the outcome still lands
    /// in history.
    pub async fn rephrase_text(
        &self,
        text: &str,
        style_override: Option<&StyleOption>,
        dispatcher_override: Option<&ProviderDispatcher>,
    ) -> Result<String, RephraseError> {
        let style = style_override.unwrap_or(&self.style);
        let dispatcher = dispatcher_override.unwrap_or(&self.dispatcher);

        let run = async {
            if !dispatcher.is_configured() {
                return Err(RephraseError::MissingApiKey);
            }
            self.validate(text)?;
            dispatcher
                .dispatch(text, style.prompt())
                .await
                .map_err(RephraseError::from)
        };

        match run.await {
            Ok(rephrased) => {
                self.record_success(
                    &RunOutcome {
                        original: text.to_string(),
                        rephrased: rephrased.clone(),
                        app_name: None,
                    },
                    style,
                    dispatcher.provider_name(),
                );
                Ok(rephrased)
            }
            Err(error) => {
                self.record_failure(
                    &RunFailure {
                        original: Some(text.to_string()),
                        app_name: None,
                        error: error.clone(),
                    },
                    style,
                    dispatcher.provider_name(),
                );
                Err(error)
            }
        }
    }

    async fn run_once(&self) -> Result<RunOutcome, RunFailure> {
        // A missing key is knowable up front; fail before borrowing
        // the clipboard.
        if !self.dispatcher.is_configured() {
            return Err(self.failure(None, None, RephraseError::MissingApiKey));
        }

        debug!("capturing selection");
        let source_app = match self.focus.frontmost_app() {
            Ok(app) => app,
            Err(error) => {
                debug!(%error, "could not determine the frontmost application");
                None
            }
        };
        let app_name = source_app.as_ref().map(|app| app.name.clone());

        let original = self
            .clipboard
            .capture_selection()
            .await
            .map_err(|error| self.failure(None, app_name.clone(), error.into()))?;

        self.validate(&original)
            .map_err(|error| self.failure(Some(original.clone()), app_name.clone(), error))?;

        debug!("dispatching to provider");
        let rephrased = self
            .dispatcher
            .dispatch(&original, self.style.prompt())
            .await
            .map_err(|error| self.failure(Some(original.clone()), app_name.clone(), error.into()))?;

        // Focus restoration failing is not fatal: the paste may still
        // land if the user never left the source app. The user still
        // gets a secondary notice in case it pasted elsewhere.
        if let Some(app) = &source_app {
            if let Err(error) = self.focus.activate(app) {
                warn!(app = %app.name, %error, "failed to restore focus to the source app");
                let notice = RephraseError::AppSwitchFailed;
                self.notifier
                    .notify_error(&notice.to_string(), Some(notice.recovery_suggestion()));
            }
        }

        debug!("injecting replacement");
        self.clipboard
            .inject_replacement(&rephrased)
            .await
            .map_err(|error| self.failure(Some(original.clone()), app_name.clone(), error.into()))?;

        Ok(RunOutcome {
            original,
            rephrased,
            app_name,
        })
    }

    fn validate(&self, text: &str) -> Result<(), RephraseError> {
        if text.trim().is_empty() {
            return Err(RephraseError::NoTextSelected);
        }

        let char_count = text.chars().count();
        if char_count < MIN_TEXT_CHARS {
            return Err(RephraseError::TextTooShort);
        }
        if char_count > MAX_TEXT_CHARS {
            return Err(RephraseError::TextTooLong(char_count));
        }

        Ok(())
    }

    fn failure(
        &self,
        original: Option<String>,
        app_name: Option<String>,
        error: RephraseError,
    ) -> RunFailure {
        RunFailure {
            original,
            app_name,
            error,
        }
    }

    fn record_success(&self, outcome: &RunOutcome, style: &StyleOption, provider: &str) {
        let entry = HistoryEntry::success(
            outcome.original.clone(),
            outcome.rephrased.clone(),
            outcome.app_name.clone(),
            Some(style.id()),
            provider.to_string(),
        );
        if let Err(error) = self.history.add_entry(entry) {
            warn!(%error, "failed to record successful rephrase in history");
        }
    }

    fn record_failure(&self, failure: &RunFailure, style: &StyleOption, provider: &str) {
        // A failure before anything was captured still gets recorded;
        // the original text is simply empty.
        let entry = HistoryEntry::failure(
            failure.original.clone().unwrap_or_default(),
            failure.error.to_string(),
            failure.app_name.clone(),
            Some(style.id()),
            provider.to_string(),
        );
        if let Err(error) = self.history.add_entry(entry) {
            warn!(%error, "failed to record failed rephrase in history");
        }
    }
}

struct RunOutcome {
    original: String,
    rephrased: String,
    app_name: Option<String>,
}

struct RunFailure {
    original: Option<String>,
    app_name: Option<String>,
    error: RephraseError,
}

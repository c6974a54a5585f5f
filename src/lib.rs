pub mod app_focus;
pub mod clipboard;
pub mod config;
pub mod history;
pub mod hotkey;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod provider;
pub mod secrets;
pub mod settings;
pub mod style;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_focus::SystemFocusBackend;
use crate::clipboard::{ClipboardBroker, ClipboardTiming, SystemClipboardBackend};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::hotkey::listener::HotkeyListener;
use crate::hotkey::{Activation, SequenceDetector};
use crate::notify::{Notifier, SystemNotifier};
use crate::pipeline::RephrasePipeline;
use crate::provider::claude::{ClaudeConfig, ClaudeProvider};
use crate::provider::openai::{OpenAiConfig, OpenAiProvider};
use crate::provider::{ProviderDispatcher, ProviderKind, RephraseProvider};
use crate::secrets::SecretStore;
use crate::settings::SettingsStore;

const ACTIVATION_CHANNEL_CAPACITY: usize = 8;

/// Success notifications honor the user's settings toggle; error
/// notifications are always shown.
struct ServiceNotifier {
    inner: SystemNotifier,
    show_success: bool,
}

impl Notifier for ServiceNotifier {
    fn notify_success(&self, message: &str, subtitle: Option<&str>) {
        if self.show_success {
            self.inner.notify_success(message, subtitle);
        }
    }

    fn notify_error(&self, message: &str, recovery: Option<&str>) {
        self.inner.notify_error(message, recovery);
    }
}

/// The assembled background service: the event-tap listener on one
/// side, the rephrase pipeline on the other, joined by an activation
/// channel.
pub struct RephraseService {
    listener: HotkeyListener,
    pipeline: RephrasePipeline<SystemClipboardBackend, SystemFocusBackend, ServiceNotifier>,
    activation_rx: tokio::sync::Mutex<mpsc::Receiver<Activation>>,
    custom_styles: Vec<style::CustomStyle>,
    secret_store: SecretStore,
}

impl RephraseService {
    pub fn new(config: &Config) -> Result<Self, String> {
        let settings_store = SettingsStore::new();
        let settings = settings_store.load(&config.data_dir)?;

        let style = style::resolve_style(&settings.style_id, &settings.custom_styles);
        info!(
            provider = %settings.provider,
            style = %style.display_name(),
            hotkey = %settings.hotkey.display_name,
            "service configuration loaded"
        );

        let secret_store = SecretStore::new();
        let api_key = match secret_store.get_api_key(&settings.provider) {
            Ok(Some(key)) => key,
            Ok(None) => {
                warn!(
                    provider = %settings.provider,
                    "no API key stored; rephrase runs will fail until one is set"
                );
                String::new()
            }
            Err(error) => {
                warn!(%error, "failed to read API key from the secret store");
                String::new()
            }
        };

        let provider = build_provider(&settings.provider, api_key)?;
        let dispatcher = ProviderDispatcher::new(provider);

        let history = Arc::new(HistoryStore::new(&config.data_dir)?);
        let clipboard = ClipboardBroker::new(SystemClipboardBackend, ClipboardTiming::default());
        let notifier = ServiceNotifier {
            inner: SystemNotifier,
            show_success: settings.show_notifications,
        };
        let pipeline = RephrasePipeline::new(
            clipboard,
            SystemFocusBackend,
            dispatcher,
            history,
            notifier,
            style,
        );

        let detector = Arc::new(Mutex::new(SequenceDetector::new(settings.hotkey)));
        let (activation_tx, activation_rx) = mpsc::channel(ACTIVATION_CHANNEL_CAPACITY);
        let listener = HotkeyListener::new(detector, activation_tx);

        Ok(Self {
            listener,
            pipeline,
            activation_rx: tokio::sync::Mutex::new(activation_rx),
            custom_styles: settings.custom_styles,
            secret_store,
        })
    }

    /// Starts the global key listener. The tap never sees key events
    /// without the Accessibility permission, so warn up front.
    pub fn start(&self) -> Result<(), String> {
        if !HotkeyListener::has_accessibility_permission() {
            warn!("Accessibility permission not granted; the event tap may not receive key events");
        }

        self.listener.start()
    }

    /// Drains the activation channel, running the pipeline once per
    /// activation. Returns when the listener side of the channel closes.
    pub async fn run(&self) {
        let mut activation_rx = self.activation_rx.lock().await;
        while activation_rx.recv().await.is_some() {
            self.pipeline.handle_activation().await;
        }
    }

    /// Rephrases text supplied directly, bypassing the hotkey and
    /// clipboard path entirely. A style id or provider given here
    /// overrides the configured defaults for this one request.
    pub async fn rephrase_text(
        &self,
        text: &str,
        style_id: Option<&str>,
        provider: Option<ProviderKind>,
    ) -> Result<String, pipeline::RephraseError> {
        let style = style_id.map(|id| style::resolve_style(id, &self.custom_styles));

        let dispatcher = match provider {
            Some(kind) => {
                let api_key = self
                    .secret_store
                    .get_api_key(kind.name())
                    .map_err(pipeline::RephraseError::Unexpected)?
                    .unwrap_or_default();
                let provider = build_provider(kind.name(), api_key)
                    .map_err(pipeline::RephraseError::Unexpected)?;
                Some(ProviderDispatcher::new(provider))
            }
            None => None,
        };

        self.pipeline
            .rephrase_text(text, style.as_ref(), dispatcher.as_ref())
            .await
    }

    pub fn stop(&self) {
        self.listener.stop();
    }
}

fn build_provider(provider: &str, api_key: String) -> Result<Arc<dyn RephraseProvider>, String> {
    // Settings normalization guarantees a known provider name; fall
    // back to the default for anything else.
    match ProviderKind::from_name(provider).unwrap_or_default() {
        ProviderKind::OpenAi => {
            let provider = OpenAiProvider::new(OpenAiConfig::new(api_key))
                .map_err(|error| format!("Failed to initialize OpenAI provider: {error}"))?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Claude => {
            let provider = ClaudeProvider::new(ClaudeConfig::new(api_key))
                .map_err(|error| format!("Failed to initialize Claude provider: {error}"))?;
            Ok(Arc::new(provider))
        }
    }
}

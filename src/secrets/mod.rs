//! Keychain-backed secret storage for provider API keys.

use std::sync::Arc;
use tracing::{debug, info, warn};

const KEYCHAIN_SERVICE: &str = "rephraser.provider.api-keys";
#[cfg(target_os = "macos")]
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

#[derive(Debug, Clone)]
pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore {
    pub fn new() -> Self {
        debug!("secret store initialized");
        Self {
            backend: Arc::new(SystemKeychainBackend),
        }
    }

    #[cfg(test)]
    fn with_backend(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let account = normalize_provider(provider)?;
        debug!(provider = %account, "reading api key from secret store");
        self.backend.get(KEYCHAIN_SERVICE, account.as_str())
    }

    pub fn has_api_key(&self, provider: &str) -> Result<bool, String> {
        Ok(self.get_api_key(provider)?.is_some())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let account = normalize_provider(provider)?;
        let normalized_key = normalize_api_key(key)?;
        info!(provider = %account, "writing api key to secret store");
        self.backend
            .set(KEYCHAIN_SERVICE, account.as_str(), normalized_key.as_str())
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), String> {
        let account = normalize_provider(provider)?;
        info!(provider = %account, "deleting api key from secret store");
        self.backend.delete(KEYCHAIN_SERVICE, account.as_str())
    }
}

trait SecretBackend: Send + Sync + std::fmt::Debug {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, String>;
    fn set(&self, service: &str, account: &str, key: &str) -> Result<(), String>;
    fn delete(&self, service: &str, account: &str) -> Result<(), String>;
}

#[derive(Debug)]
struct SystemKeychainBackend;

#[cfg(target_os = "macos")]
impl SecretBackend for SystemKeychainBackend {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, String> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(service, account) {
            Ok(raw_key) => {
                let key = String::from_utf8(raw_key)
                    .map_err(|error| format!("Stored key is not valid UTF-8: {error}"))?;
                debug!(provider = %account, "api key read from macOS keychain");
                Ok(normalize_optional_string(Some(key)))
            }
            Err(error) if is_item_not_found(&error) => Ok(None),
            Err(error) => Err(format!("Failed to read macOS keychain item: {error}")),
        }
    }

    fn set(&self, service: &str, account: &str, key: &str) -> Result<(), String> {
        use security_framework::passwords::set_generic_password;

        set_generic_password(service, account, key.as_bytes())
            .map_err(|error| format!("Failed to write macOS keychain item: {error}"))
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), String> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(service, account) {
            Ok(()) => Ok(()),
            Err(error) if is_item_not_found(&error) => {
                warn!(provider = %account, "api key delete requested but keychain item was absent");
                Ok(())
            }
            Err(error) => Err(format!("Failed to delete macOS keychain item: {error}")),
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl SecretBackend for SystemKeychainBackend {
    fn get(&self, _service: &str, _account: &str) -> Result<Option<String>, String> {
        Err("macOS keychain is only available on macOS targets".to_string())
    }

    fn set(&self, _service: &str, _account: &str, _key: &str) -> Result<(), String> {
        Err("macOS keychain is only available on macOS targets".to_string())
    }

    fn delete(&self, _service: &str, _account: &str) -> Result<(), String> {
        Err("macOS keychain is only available on macOS targets".to_string())
    }
}

#[cfg(target_os = "macos")]
fn is_item_not_found(error: &security_framework::base::Error) -> bool {
    error.code() == ERR_SEC_ITEM_NOT_FOUND
}

fn normalize_provider(provider: &str) -> Result<String, String> {
    let trimmed = provider.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("`provider` cannot be empty".to_string());
    }

    Ok(trimmed)
}

fn normalize_api_key(key: &str) -> Result<String, String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err("`key` cannot be empty".to_string());
    }

    Ok(trimmed.to_string())
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|candidate| {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

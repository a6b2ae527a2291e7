// Secret storage: one token per instance URL, kept in the host's
// credential facility (macOS Keychain, Windows Credential Manager, Linux
// kernel keyring) through the `keyring` crate.

use std::cell::RefCell;
use std::collections::HashMap;

use keyring::Entry;

/// Service name every token is filed under.
pub const SERVICE_NAME: &str = "fxf";

/// Key/value store for tokens, addressed by instance URL.
pub trait SecretStore {
    /// Stores `token` for `instance`, replacing any previous one.
    fn save(&self, instance: &str, token: &str) -> Result<(), keyring::Error>;

    /// Returns the stored token, or `None` when nothing was ever saved.
    fn load(&self, instance: &str) -> Result<Option<String>, keyring::Error>;
}

/// Secret store backed by the OS keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        KeyringStore {
            service: SERVICE_NAME.to_string(),
        }
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn save(&self, instance: &str, token: &str) -> Result<(), keyring::Error> {
        Entry::new(&self.service, instance)?.set_password(token)
    }

    fn load(&self, instance: &str) -> Result<Option<String>, keyring::Error> {
        match Entry::new(&self.service, instance)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Process-local secret store. Nothing survives the process.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn save(&self, instance: &str, token: &str) -> Result<(), keyring::Error> {
        self.entries
            .borrow_mut()
            .insert(instance.to_string(), token.to_string());
        Ok(())
    }

    fn load(&self, instance: &str) -> Result<Option<String>, keyring::Error> {
        Ok(self.entries.borrow().get(instance).cloned())
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rusty_wallet_sdk_core::{ProviderError, StoragePort};

/// Scopes owned by the SDK; `clear_all` wipes every key under them.
pub const SDK_SCOPES: &[&str] = &["CBWSDK", "walletlink"];

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, ProviderError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| ProviderError::Internal(format!("storage lock poisoned: {e}")))?;
        Ok(g.len())
    }

    pub fn is_empty(&self) -> Result<bool, ProviderError> {
        Ok(self.len()? == 0)
    }
}

impl StoragePort for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, ProviderError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| ProviderError::Internal(format!("storage lock poisoned: {e}")))?;
        Ok(g.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), ProviderError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| ProviderError::Internal(format!("storage lock poisoned: {e}")))?;
        g.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), ProviderError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| ProviderError::Internal(format!("storage lock poisoned: {e}")))?;
        g.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, ProviderError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| ProviderError::Internal(format!("storage lock poisoned: {e}")))?;
        Ok(g.keys().cloned().collect())
    }
}

/// Key-value view that prefixes every key with `-{scope}:{module}:`.
#[derive(Clone)]
pub struct ScopedStorage {
    scope: String,
    module: String,
    backend: Arc<dyn StoragePort>,
}

impl std::fmt::Debug for ScopedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStorage")
            .field("scope", &self.scope)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl ScopedStorage {
    pub fn new(
        backend: Arc<dyn StoragePort>,
        scope: impl Into<String>,
        module: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            module: module.into(),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StoragePort> {
        &self.backend
    }

    fn prefix(&self) -> String {
        format!("-{}:{}:", self.scope, self.module)
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix())
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, ProviderError> {
        self.backend.get_item(&self.scoped_key(key))
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), ProviderError> {
        self.backend.set_item(&self.scoped_key(key), value)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), ProviderError> {
        self.backend.remove_item(&self.scoped_key(key))
    }

    pub fn load_object<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ProviderError> {
        match self.get_item(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ProviderError::Internal(format!("stored {key} is corrupt: {e}"))),
            None => Ok(None),
        }
    }

    pub fn store_object<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), ProviderError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| ProviderError::Internal(format!("encode {key} failed: {e}")))?;
        self.set_item(key, &raw)
    }

    /// Removes only this store's keys.
    pub fn clear(&self) -> Result<(), ProviderError> {
        let prefix = self.prefix();
        for key in self.backend.keys()? {
            if key.starts_with(&prefix) {
                self.backend.remove_item(&key)?;
            }
        }
        Ok(())
    }

    /// Removes every key of every SDK scope from the backend.
    pub fn clear_all(backend: &dyn StoragePort) -> Result<usize, ProviderError> {
        let mut removed = 0;
        for key in backend.keys()? {
            let owned = SDK_SCOPES
                .iter()
                .any(|scope| key.starts_with(&format!("-{scope}:")));
            if owned {
                backend.remove_item(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_do_not_leak() {
        let backend: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        let a = ScopedStorage::new(Arc::clone(&backend), "CBWSDK", "SignerConfigurator");
        let b = ScopedStorage::new(Arc::clone(&backend), "CBWSDK", "SCWStateManager");
        a.set_item("SignerType", "scw").expect("set a");
        b.set_item("accounts", "[]").expect("set b");
        backend.set_item("unrelated", "1").expect("set raw");

        assert_eq!(
            backend
                .get_item("-CBWSDK:SignerConfigurator:SignerType")
                .expect("raw get"),
            Some("scw".to_owned())
        );
        a.clear().expect("clear a");
        assert_eq!(a.get_item("SignerType").expect("get a"), None);
        assert_eq!(b.get_item("accounts").expect("get b"), Some("[]".to_owned()));

        let removed = ScopedStorage::clear_all(backend.as_ref()).expect("clear all");
        assert_eq!(removed, 1);
        assert_eq!(backend.get_item("unrelated").expect("raw"), Some("1".to_owned()));
    }
}

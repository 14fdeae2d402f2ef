use std::sync::Arc;
use crate::error::{InputError, StoreError};
use crate::store::PersistentStore;

const MIN_KEY_LEN: usize = 10;

/// Holds the single API key used for every remote call.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn PersistentStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(transparent)]
    Invalid(#[from] InputError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialStore {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// The stored key, if any. Read failures are logged and reported as absent.
    pub fn get(&self) -> Option<String> {
        match self.store.get(crate::CREDENTIAL_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<String>(&raw)
                .ok()
                .filter(|k| !k.is_empty()),
            Ok(None) => None,
            Err(e) => {
                log::error!("Failed to read API key: {}", e);
                None
            }
        }
    }

    pub fn set(&self, key: &str) -> Result<(), CredentialError> {
        let key = key.trim();
        if key.len() < MIN_KEY_LEN {
            return Err(InputError::InvalidApiKey.into());
        }
        let json = serde_json::to_string(key).map_err(StoreError::from)?;
        self.store.set(crate::CREDENTIAL_KEY, &json)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(crate::CREDENTIAL_KEY)
    }

    /// The key with everything but the last four characters hidden.
    pub fn masked(&self) -> Option<String> {
        self.get().map(|key| {
            let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("{}{}", "*".repeat(key.chars().count().saturating_sub(4)), visible)
        })
    }
}

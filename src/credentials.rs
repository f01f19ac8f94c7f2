use crate::error::StorageError;
use crate::storage::StateStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialDocument {
    #[serde(default)]
    bearer_token: String,
}

/// Bearer token persisted as `{"bearer_token": "..."}`
pub struct CredentialStore<S: StateStore> {
    store: S,
}

impl<S: StateStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored token, `None` when absent or blank
    pub fn load(&self) -> Result<Option<String>, StorageError> {
        let Some(contents) = self.store.read()? else {
            return Ok(None);
        };
        let document: CredentialDocument = serde_json::from_str(&contents)?;
        let token = document.bearer_token.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }

    pub fn save(&self, bearer_token: &str) -> Result<(), StorageError> {
        let document = CredentialDocument {
            bearer_token: bearer_token.trim().to_string(),
        };
        self.store.write(&serde_json::to_string(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let credentials = CredentialStore::new(store.clone());
        assert_eq!(credentials.load().unwrap(), None);

        credentials.save("  AAAA-token  ").unwrap();
        assert_eq!(credentials.load().unwrap(), Some("AAAA-token".to_string()));
        assert_eq!(
            store.read().unwrap(),
            Some(r#"{"bearer_token":"AAAA-token"}"#.to_string())
        );
    }

    #[test]
    fn test_blank_or_missing_key_is_none() {
        let credentials = CredentialStore::new(MemoryStore::with_contents(r#"{"bearer_token": ""}"#));
        assert_eq!(credentials.load().unwrap(), None);

        let credentials = CredentialStore::new(MemoryStore::with_contents("{}"));
        assert_eq!(credentials.load().unwrap(), None);
    }
}

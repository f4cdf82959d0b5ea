use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory cache in front of [`SecretManager`].
///
/// Misses are cached too, so an absent keychain entry is probed once per
/// process instead of once per request.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, Option<SecretString>>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached lookup; `Ok(None)` when the secret is configured nowhere
    pub fn get(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(key) {
                return Ok(entry.clone());
            }
        }

        let secret = self.manager.get_secret(key)?;

        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Cached lookup of a secret that must be present
    pub fn require(&self, key: &str) -> Result<SecretString, EngineError> {
        match self.get(key)? {
            Some(secret) => Ok(secret),
            None => self.manager.require(key),
        }
    }

    /// Seed the cache without touching the environment or keychain
    pub fn insert(&self, key: &str, value: SecretString) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(key.to_string(), Some(value));
    }
}

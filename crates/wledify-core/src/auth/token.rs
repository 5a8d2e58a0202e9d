//! Bearer token lifecycle
//!
//! The token and its expiry are mirrored to durable storage. Memory and
//! storage never diverge across a failure: `set` persists before it exposes
//! the new token, `clear` drops the in-memory token unconditionally.

use anyhow::{Context, Result};

use crate::constants::keys;
use crate::storage::SharedStore;

/// Access token with its absolute expiry in epoch milliseconds
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at_ms: i64,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at_ms: i64) -> Self {
        Self {
            value: value.into(),
            expires_at_ms,
        }
    }

    /// Build a token from a token-endpoint `expires_in` relative to `now_ms`
    pub fn from_expires_in(value: impl Into<String>, expires_in_secs: u64, now_ms: i64) -> Self {
        let lifetime_ms = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Self::new(value, now_ms.saturating_add(lifetime_ms))
    }

    /// Valid iff the value is non-empty and `now < expires_at`
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.value.is_empty() && now_ms < self.expires_at_ms
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Current wall clock in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Holds the current token and keeps durable storage in step with it
pub struct TokenStore {
    storage: SharedStore,
    current: Option<Token>,
}

impl TokenStore {
    /// Empty store; call [`TokenStore::load`] to restore a persisted token
    pub fn new(storage: SharedStore) -> Self {
        Self {
            storage,
            current: None,
        }
    }

    /// Restore the persisted token. An already expired one is cleared.
    pub fn load(storage: SharedStore) -> Self {
        let mut store = Self::new(storage);
        let value = store.storage.get(keys::ACCESS_TOKEN);
        let expires_at = store
            .storage
            .get(keys::TOKEN_EXPIRES_AT)
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        match (value, expires_at) {
            (Some(value), Some(expires_at_ms)) => {
                let token = Token::new(value, expires_at_ms);
                if token.is_valid() {
                    tracing::info!("Restored Spotify token from storage");
                    store.current = Some(token);
                } else {
                    tracing::info!("Stored Spotify token expired, clearing");
                    if let Err(e) = store.clear() {
                        tracing::warn!("Failed to clear expired token: {:#}", e);
                    }
                }
            }
            (None, None) => {}
            _ => {
                tracing::warn!("Incomplete token in storage, clearing");
                if let Err(e) = store.clear() {
                    tracing::warn!("Failed to clear incomplete token: {:#}", e);
                }
            }
        }
        store
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.current.as_ref().is_some_and(|t| t.is_valid_at(now_ms))
    }

    /// The held token, valid or not
    pub fn token(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Bearer value for a request, only if currently valid
    pub fn bearer(&self) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|t| t.is_valid())
            .map(|t| t.value.as_str())
    }

    /// Persist, then hold in memory. On a storage failure the previous token is kept.
    pub fn set(&mut self, token: Token) -> Result<()> {
        let expires_at = token.expires_at_ms.to_string();
        self.storage
            .set_many(&[
                (keys::ACCESS_TOKEN, token.value.as_str()),
                (keys::TOKEN_EXPIRES_AT, expires_at.as_str()),
            ])
            .context("Failed to persist access token")?;
        self.current = Some(token);
        Ok(())
    }

    /// Drop the token from memory and mirror the removal to storage
    pub fn clear(&mut self) -> Result<()> {
        self.current = None;
        self.storage
            .remove_many(&[keys::ACCESS_TOKEN, keys::TOKEN_EXPIRES_AT])
            .context("Failed to remove access token from storage")
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_validity_boundaries() {
        let token = Token::new("abc", 1_000);
        assert!(token.is_valid_at(999));
        assert!(!token.is_valid_at(1_000));
        assert!(!token.is_valid_at(1_001));

        let empty = Token::new("", i64::MAX);
        assert!(!empty.is_valid_at(0));
    }

    #[test]
    fn test_expiry_from_expires_in() {
        let token = Token::from_expires_in("abc", 3600, 10_000);
        assert_eq!(token.expires_at_ms, 10_000 + 3_600_000);
    }

    #[test]
    fn test_set_persists_and_load_restores() {
        let storage = memory();
        let mut store = TokenStore::new(storage.clone());
        let expires = now_ms() + 60_000;
        store.set(Token::new("abc", expires)).unwrap();

        assert!(store.is_valid());
        assert_eq!(storage.get(keys::ACCESS_TOKEN).as_deref(), Some("abc"));
        assert_eq!(
            storage.get(keys::TOKEN_EXPIRES_AT),
            Some(expires.to_string())
        );

        let restored = TokenStore::load(storage);
        assert_eq!(restored.bearer(), Some("abc"));
    }

    #[test]
    fn test_clear_is_mirrored_to_storage() {
        let storage = memory();
        let mut store = TokenStore::new(storage.clone());
        store.set(Token::new("abc", now_ms() + 60_000)).unwrap();
        store.clear().unwrap();

        assert!(!store.is_valid());
        assert!(storage.get(keys::ACCESS_TOKEN).is_none());
        assert!(!TokenStore::load(storage).is_valid());
    }

    #[test]
    fn test_expired_token_is_cleared_on_load() {
        let storage = memory();
        storage.set(keys::ACCESS_TOKEN, "old").unwrap();
        storage
            .set(keys::TOKEN_EXPIRES_AT, &(now_ms() - 1).to_string())
            .unwrap();

        let store = TokenStore::load(storage.clone());
        assert!(store.token().is_none());
        assert!(storage.get(keys::ACCESS_TOKEN).is_none());
        assert!(storage.get(keys::TOKEN_EXPIRES_AT).is_none());
    }

    #[test]
    fn test_failed_set_keeps_previous_token() {
        let storage = memory();
        let mut store = TokenStore::new(storage.clone());
        store.set(Token::new("first", now_ms() + 60_000)).unwrap();

        storage.set_fail_writes(true);
        assert!(store.set(Token::new("second", now_ms() + 60_000)).is_err());
        assert_eq!(store.bearer(), Some("first"));
        assert_eq!(storage.get(keys::ACCESS_TOKEN).as_deref(), Some("first"));
    }

    #[test]
    fn test_failed_clear_still_drops_memory() {
        let storage = memory();
        let mut store = TokenStore::new(storage.clone());
        store.set(Token::new("abc", now_ms() + 60_000)).unwrap();

        storage.set_fail_writes(true);
        assert!(store.clear().is_err());
        assert!(!store.is_valid());
    }
}

// Credential store: owns the persisted token pair, expiry and cached user

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::storage::{CredentialStorage, MemoryStorage};
use super::types::{
    CredentialSet, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_EXPIRY_KEY, USER_KEY,
};
use crate::error::ApiError;
use crate::models::UserProfile;

/// Default lead time before expiry at which a proactive refresh kicks in
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 300;

/// Expiry-aware access to the persisted credentials.
///
/// All reads and writes of the credential set go through this type. Backend
/// read failures are logged and reported as absence, the way an unavailable
/// browser storage would behave.
pub struct CredentialStore {
    storage: Arc<dyn CredentialStorage>,
    refresh_skew: Duration,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn CredentialStorage>, refresh_skew: Duration) -> Self {
        Self {
            storage,
            refresh_skew,
        }
    }

    /// Store backed by [`MemoryStorage`] with the default skew
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
        )
    }

    pub fn refresh_skew(&self) -> Duration {
        self.refresh_skew
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Failed to read credential storage");
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.read(TOKEN_EXPIRY_KEY)?;
        match raw.parse::<i64>() {
            Ok(millis) => DateTime::from_timestamp_millis(millis),
            Err(_) => {
                tracing::warn!("Ignoring unparseable token expiry: {}", raw);
                None
            }
        }
    }

    pub fn snapshot(&self) -> CredentialSet {
        CredentialSet {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
            expires_at: self.expires_at(),
        }
    }

    /// Persist a new token pair; expiry is `now + lifetime_secs`
    pub fn write_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        lifetime_secs: i64,
    ) -> Result<(), ApiError> {
        self.write_tokens_at(access_token, refresh_token, lifetime_secs, Utc::now())
    }

    pub fn write_tokens_at(
        &self,
        access_token: &str,
        refresh_token: &str,
        lifetime_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(ApiError::AuthError(
                "Token response must contain both access_token and refresh_token".to_string(),
            ));
        }

        let expires_at = Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ApiError::AuthError(format!("Token lifetime out of range: {}s", lifetime_secs))
            })?;
        let expiry = expires_at.timestamp_millis().to_string();

        self.storage
            .set_many(&[
                (ACCESS_TOKEN_KEY, access_token),
                (REFRESH_TOKEN_KEY, refresh_token),
                (TOKEN_EXPIRY_KEY, expiry.as_str()),
            ])
            .map_err(|e| ApiError::Storage(e.to_string()))?;

        tracing::debug!(expires_at = %expires_at.to_rfc3339(), "Stored new token pair");
        Ok(())
    }

    /// Remove tokens, expiry and the cached user. Safe to call when empty.
    pub fn clear(&self) -> Result<(), ApiError> {
        self.storage
            .remove_many(&SESSION_KEYS)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        tracing::debug!("Cleared stored credentials");
        Ok(())
    }

    /// True when no expiry is recorded or `now >= expiry - skew`
    pub fn is_expiring_soon(&self) -> bool {
        self.is_expiring_soon_at(Utc::now())
    }

    pub fn is_expiring_soon_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            None => true,
            Some(exp) => match exp.checked_sub_signed(self.refresh_skew) {
                Some(threshold) => now >= threshold,
                None => true,
            },
        }
    }

    /// Both tokens present. Expiry only drives proactive refresh.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.refresh_token().is_some()
    }

    /// Cached user profile, if one was stored and still parses
    pub fn user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse cached user profile");
                None
            }
        }
    }

    pub fn set_user(&self, user: &UserProfile) -> Result<(), ApiError> {
        let json = serde_json::to_string(user)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to serialize user: {}", e)))?;
        self.storage
            .set(USER_KEY, &json)
            .map_err(|e| ApiError::Storage(e.to_string()))
    }
}

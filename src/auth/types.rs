// Authentication types

use chrono::{DateTime, Utc};

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key of the access token expiry (milliseconds since the Unix epoch)
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Storage key of the cached user profile (JSON)
pub const USER_KEY: &str = "user";

/// Every key owned by the credential store
pub const SESSION_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY, USER_KEY];

/// Point-in-time view of the persisted credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Both tokens present; expiry is advisory and not checked here
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

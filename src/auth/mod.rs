// Authentication module
// Persists the session, coordinates token refresh and answers role checks

mod guard;
mod manager;
mod refresh;
mod storage;
mod store;
mod types;

pub use guard::{check_access, is_role_allowed, AccessDecision, Role};
pub use manager::AuthSession;
pub use refresh::{request_token_refresh, RefreshCoordinator};
pub use storage::{CredentialStorage, MemoryStorage, SqliteStorage};
pub use store::{CredentialStore, DEFAULT_REFRESH_SKEW_SECS};
pub use types::{
    CredentialSet, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_EXPIRY_KEY, USER_KEY,
};

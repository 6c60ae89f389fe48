use std::sync::Arc;
use tokio::sync::RwLock;

use super::guard::{check_access, is_role_allowed, AccessDecision, Role};
use crate::error::ApiError;
use crate::events::SessionEvent;
use crate::http_client::ApiClient;
use crate::models::{ApiRequest, ChangePasswordRequest, LoginRequest, TokenResponse, UserProfile};

/// Authentication session
/// Drives login, logout and the signed-in user on top of the API client
pub struct AuthSession {
    /// Client used for every auth call
    api: Arc<ApiClient>,

    /// Signed-in user, mirrored to the credential store
    user: RwLock<Option<UserProfile>>,
}

impl AuthSession {
    /// Create a session, restoring the cached user if credentials are present
    pub fn new(api: Arc<ApiClient>) -> Self {
        let store = api.store();
        let user = if store.is_authenticated() {
            store.user()
        } else {
            None
        };

        if let Some(ref user) = user {
            tracing::debug!(user = %user.email, "Restored cached user");
        }

        Self {
            api,
            user: RwLock::new(user),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Sign in and persist the token pair and user
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        tracing::info!(email = %email, "Logging in");

        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| ApiError::Internal(e.into()))?;

        let payload = self
            .api
            .send(
                ApiRequest::post("/auth/login")
                    .json(body)
                    .without_auth()
                    .skip_token_refresh(),
            )
            .await?;
        let tokens: TokenResponse = payload.into_json()?;

        let store = self.api.store();
        store.write_tokens(&tokens.access_token, &tokens.refresh_token, tokens.expires_in)?;

        let user = match tokens.user {
            Some(user) => {
                store.set_user(&user)?;
                *self.user.write().await = Some(user.clone());
                user
            }
            None => self.fetch_current_user().await?,
        };

        self.api.events().session_started();
        tracing::info!(user = %user.email, role = %user.role, "Logged in");
        Ok(user)
    }

    /// Sign out. The backend call is a single best-effort attempt with the
    /// stored token as-is; local state is always cleared.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            let request = ApiRequest::post("/auth/logout")
                .json(serde_json::json!({}))
                .skip_token_refresh()
                .max_attempts(1);
            if let Err(e) = self.api.send(request).await {
                tracing::warn!("Logout API call failed: {}", e);
            }
        }

        self.clear_auth().await?;
        self.api.events().emit(SessionEvent::LoggedOut);
        tracing::info!("Logged out");
        Ok(())
    }

    /// Drop tokens and the cached user without contacting the backend
    pub async fn clear_auth(&self) -> Result<(), ApiError> {
        *self.user.write().await = None;
        self.api.store().clear()
    }

    /// Load the signed-in user from `/auth/me` and cache it
    pub async fn fetch_current_user(&self) -> Result<UserProfile, ApiError> {
        let result = async {
            let user: UserProfile = self.api.get("/auth/me").await?.into_json()?;
            Ok::<_, ApiError>(user)
        }
        .await;

        match result {
            Ok(user) => {
                self.api.store().set_user(&user)?;
                *self.user.write().await = Some(user.clone());
                Ok(user)
            }
            Err(e) => {
                if e.status() == Some(401) {
                    if let Err(clear_err) = self.clear_auth().await {
                        tracing::warn!("Failed to clear credentials: {}", clear_err);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        })
        .map_err(|e| ApiError::Internal(e.into()))?;

        self.api.post("/auth/change-password", body).await?;
        tracing::info!("Password changed");
        Ok(())
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.user.read().await.clone()
    }

    /// Both tokens present in the store
    pub fn is_authenticated(&self) -> bool {
        self.api.store().is_authenticated()
    }

    async fn current_role(&self) -> Option<String> {
        self.user.read().await.as_ref().map(|u| u.role.clone())
    }

    pub async fn has_role(&self, role: Role) -> bool {
        self.has_any_role(&[role]).await
    }

    pub async fn has_any_role(&self, roles: &[Role]) -> bool {
        let allowed: Vec<&str> = roles.iter().map(Role::as_str).collect();
        is_role_allowed(self.current_role().await.as_deref(), &allowed)
    }

    pub async fn is_admin(&self) -> bool {
        self.has_role(Role::Admin).await
    }

    pub async fn is_procurement_officer(&self) -> bool {
        self.has_role(Role::ProcurementOfficer).await
    }

    pub async fn is_bac_member(&self) -> bool {
        self.has_any_role(&[Role::BacChair, Role::BacMember]).await
    }

    pub async fn is_end_user(&self) -> bool {
        self.has_role(Role::EndUser).await
    }

    /// Page guard: `None` admits any signed-in user
    pub async fn check_page_access<S: AsRef<str>>(&self, allowed: Option<&[S]>) -> AccessDecision {
        let role = self.current_role().await;
        check_access(self.is_authenticated(), role.as_deref(), allowed)
    }
}

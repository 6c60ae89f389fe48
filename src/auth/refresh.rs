// Token refresh logic
//
// Collapses concurrent refresh demand into a single outbound call. State is
// Idle -> Refreshing -> Idle; the Idle check and the switch to Refreshing
// happen under one synchronous lock with no await in between.

use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use super::store::CredentialStore;
use crate::error::{ApiError, RefreshError};
use crate::events::{SessionEvent, SessionEvents};
use crate::models::{RefreshRequest, TokenResponse};

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        /// Callers that arrived while the refresh was in flight, in arrival order
        waiters: Vec<Waiter>,
    },
}

/// Single-flight refresh of the stored credentials
pub struct RefreshCoordinator {
    client: Client,
    refresh_url: String,
    store: Arc<CredentialStore>,
    events: Arc<SessionEvents>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        client: Client,
        base_url: &str,
        store: Arc<CredentialStore>,
        events: Arc<SessionEvents>,
    ) -> Self {
        Self {
            client,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            store,
            events,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        // The state is a plain enum; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a refresh call is currently in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Refresh unconditionally (or join the refresh already in flight)
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        self.refresh_from(None).await
    }

    /// Refresh because `stale` was found to be unusable.
    ///
    /// If no refresh is in flight and the store already holds a different
    /// token, someone rotated it in the meantime and that token is returned
    /// without another call.
    pub async fn refresh_from(&self, stale: Option<&str>) -> Result<String, RefreshError> {
        loop {
            let waiter = {
                let mut state = self.lock_state();
                match &mut *state {
                    RefreshState::Refreshing { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        rx
                    }
                    RefreshState::Idle => {
                        if let (Some(stale), Some(current)) = (stale, self.store.access_token()) {
                            if current != stale {
                                tracing::debug!("Token already rotated, skipping refresh");
                                return Ok(current);
                            }
                        }
                        *state = RefreshState::Refreshing {
                            waiters: Vec::new(),
                        };
                        break;
                    }
                }
            };

            tracing::debug!("Token refresh already in flight, waiting for its result");
            match waiter.await {
                Ok(result) => return result,
                // The leader was dropped before settling; take over or join the next flight
                Err(_) => tracing::debug!("Refresh leader went away, retrying"),
            }
        }

        let flight = InFlight {
            coordinator: self,
            settled: false,
        };
        let result = self.perform_refresh().await;
        flight.settle(result.clone());
        result
    }

    async fn perform_refresh(&self) -> Result<String, RefreshError> {
        let result = match self.store.refresh_token() {
            Some(refresh_token) => {
                match request_token_refresh(&self.client, &self.refresh_url, &refresh_token).await
                {
                    Ok(data) => self.persist(data),
                    Err(e) => Err(e),
                }
            }
            None => Err(RefreshError::NoRefreshToken),
        };

        match &result {
            Ok(_) => {
                tracing::info!("Access token refreshed");
                self.events.emit(SessionEvent::TokenRefreshed);
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                if let Err(clear_err) = self.store.clear() {
                    tracing::warn!("Failed to clear credentials after refresh failure: {}", clear_err);
                }
            }
        }

        result
    }

    fn persist(&self, data: TokenResponse) -> Result<String, RefreshError> {
        self.store
            .write_tokens(&data.access_token, &data.refresh_token, data.expires_in)
            .map_err(|e| match e {
                ApiError::AuthError(message) => RefreshError::InvalidResponse(message),
                other => RefreshError::Storage(other.to_string()),
            })?;

        if let Some(ref user) = data.user {
            if let Err(e) = self.store.set_user(user) {
                tracing::warn!("Failed to cache user after refresh: {}", e);
            }
        }

        Ok(data.access_token)
    }
}

/// Marks the coordinator as refreshing for the lifetime of one refresh call.
///
/// Settling drains the waiters in arrival order. Dropping without settling
/// (the refreshing task was cancelled) returns to Idle and drops the waiters'
/// senders; each waiter then re-enters `refresh_from` and the first one in
/// becomes the new leader.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, result: Result<String, RefreshError>) {
        self.settled = true;
        let waiters = self.take_waiters();

        if !waiters.is_empty() {
            tracing::debug!(waiters = waiters.len(), "Resolving queued refresh waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn take_waiters(&self) -> Vec<Waiter> {
        let mut state = self.coordinator.lock_state();
        match std::mem::take(&mut *state) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.take_waiters();
        tracing::warn!(
            waiters = waiters.len(),
            "Token refresh abandoned before completing"
        );
    }
}

/// POST the refresh token and decode the new token pair
pub async fn request_token_refresh(
    client: &Client,
    url: &str,
    refresh_token: &str,
) -> Result<TokenResponse, RefreshError> {
    tracing::debug!(url = %url, "Sending token refresh request");

    let request = RefreshRequest {
        refresh_token: refresh_token.to_string(),
    };

    let response = client
        .post(url)
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                RefreshError::Timeout
            } else {
                RefreshError::Transport(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| "Token refresh failed".to_string());

        tracing::error!(
            status = status.as_u16(),
            body = %error_text,
            "Token refresh rejected"
        );
        return Err(RefreshError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let data: TokenResponse = response
        .json()
        .await
        .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

    if data.access_token.is_empty() || data.refresh_token.is_empty() {
        return Err(RefreshError::InvalidResponse(
            "response does not contain both access_token and refresh_token".to_string(),
        ));
    }

    Ok(data)
}

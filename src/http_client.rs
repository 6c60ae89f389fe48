use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::config::Config;
use crate::error::{ApiError, RefreshError};
use crate::events::SessionEvents;
use crate::models::{ApiRequest, FormData, Payload, RequestBody};

/// HTTP client for the procurement API with token refresh and retry logic
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL that relative endpoints are resolved against
    base_url: String,

    /// Persisted credentials
    store: Arc<CredentialStore>,

    /// Single-flight token refresh
    refresher: Arc<RefreshCoordinator>,

    /// Session lifecycle notifications
    events: Arc<SessionEvents>,

    /// Total attempts per call, first try included; requests may lower it
    max_attempts: u32,

    /// Base delay for linear backoff
    base_delay: Duration,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let events = Arc::new(SessionEvents::new(config.login_path.clone()));
        let refresher = Arc::new(RefreshCoordinator::new(
            client.clone(),
            &base_url,
            store.clone(),
            events.clone(),
        ));

        Ok(Self {
            client,
            base_url,
            store,
            refresher,
            events,
            max_attempts: config.retry_attempts.max(1),
            base_delay: config.retry_base_delay,
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<SessionEvents> {
        &self.events
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a call with retry logic
    /// Automatically handles:
    /// - expiring token: refreshes before sending
    /// - 401: refreshes token and reissues once
    /// - network errors, timeouts, 5xx and other statuses: linear backoff
    /// - 401/403/404: fails immediately
    pub async fn send(&self, request: ApiRequest) -> Result<Payload, ApiError> {
        let url = self.resolve_url(&request.endpoint);

        tracing::debug!(
            method = %request.method,
            url = %url,
            "Sending API request"
        );

        let max_attempts = request.max_attempts.unwrap_or(self.max_attempts).max(1);
        let mut reissued = false;
        let mut attempt = 1;
        loop {
            tracing::debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing request attempt"
            );

            let err = match self.attempt(&request, &url, &mut reissued).await {
                Ok(payload) => return Ok(payload),
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::debug!(error = %err, url = %url, "Request failed with terminal error");
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    error = %err,
                    url = %url,
                    total_attempts = attempt,
                    "API request failed after all retries"
                );
                return Err(err);
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                "Request failed: {}, retrying after {}ms (attempt {}/{})",
                err,
                delay.as_millis(),
                attempt,
                max_attempts
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One pass of auth + transport + decode, including the 401 reissue.
    ///
    /// `reissued` spans the whole retry loop: once a call has been reissued
    /// after a refresh, later 401s are surfaced instead of refreshing again.
    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &str,
        reissued: &mut bool,
    ) -> Result<Payload, ApiError> {
        let token = self.authorize(request).await?;
        let response = self.execute(request, url, token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && request.requires_auth
            && !request.skip_token_refresh
            && !*reissued
        {
            tracing::warn!(url = %url, "Received 401, refreshing token and reissuing request");

            let token = match self.refresher.refresh_from(token.as_deref()).await {
                Ok(token) => token,
                Err(e) => return Err(self.expire_session(e)),
            };

            // The reissue is decoded as-is; a second 401 is surfaced, not refreshed
            *reissued = true;
            let response = self.execute(request, url, Some(&token)).await?;
            return self.decode_response(response, url, request.raw_response).await;
        }

        self.decode_response(response, url, request.raw_response).await
    }

    /// Token to attach, refreshing first when the stored one is about to expire
    async fn authorize(&self, request: &ApiRequest) -> Result<Option<String>, ApiError> {
        if !request.requires_auth || !self.store.is_authenticated() {
            return Ok(None);
        }

        let token = self.store.access_token();
        if request.skip_token_refresh || !self.store.is_expiring_soon() {
            return Ok(token);
        }

        tracing::debug!("Access token expiring soon, refreshing before request");
        match self.refresher.refresh_from(token.as_deref()).await {
            Ok(token) => Ok(Some(token)),
            Err(e) => Err(self.expire_session(e)),
        }
    }

    /// Drop the credentials and signal the login redirect
    fn expire_session(&self, cause: RefreshError) -> ApiError {
        tracing::warn!(error = %cause, "Session expired");
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to clear credentials: {}", e);
        }
        self.events.session_expired();
        ApiError::SessionExpired
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let headers = build_headers(request, token)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(form) => builder.multipart(form.to_multipart()?),
        };

        builder.send().await.map_err(|e| transport_error(e, url))
    }

    async fn decode_response(
        &self,
        response: Response,
        url: &str,
        raw: bool,
    ) -> Result<Payload, ApiError> {
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if status.is_success() && raw {
            let data = response
                .bytes()
                .await
                .map_err(|e| transport_error(e, url))?;
            tracing::debug!(status = %status, bytes = data.len(), "Request successful");
            return Ok(Payload::Binary(data));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, url))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "Received error response"
            );
            let body = serde_json::from_str::<Value>(&text).ok();
            return Err(ApiError::from_status(status, body));
        }

        tracing::debug!(status = %status, "Request successful");

        if !is_json {
            return Ok(Payload::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(Payload::Json(Value::Null));
        }

        let value: Value = serde_json::from_str(&text).context("Failed to decode JSON response")?;
        Ok(Payload::Json(value))
    }

    /// Absolute http(s) URLs pass through; anything else is joined onto the base
    fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Linear backoff: base_delay * attempt
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn get(&self, endpoint: &str) -> Result<Payload, ApiError> {
        self.send(ApiRequest::get(endpoint)).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Payload, ApiError> {
        self.send(ApiRequest::post(endpoint).json(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Payload, ApiError> {
        self.send(ApiRequest::put(endpoint).json(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Payload, ApiError> {
        self.send(ApiRequest::patch(endpoint).json(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Payload, ApiError> {
        self.send(ApiRequest::delete(endpoint)).await
    }

    /// POST multipart form data
    pub async fn upload(&self, endpoint: &str, form: FormData) -> Result<Payload, ApiError> {
        self.send(ApiRequest::post(endpoint).form(form)).await
    }

    /// GET an endpoint and save the raw body to `path`.
    ///
    /// Returns the number of bytes written. Nothing is written when the call fails.
    pub async fn download(&self, endpoint: &str, path: impl AsRef<Path>) -> Result<u64, ApiError> {
        let path = path.as_ref();
        let payload = self.send(ApiRequest::get(endpoint).raw_response()).await?;
        let Payload::Binary(data) = payload else {
            return Err(anyhow::anyhow!("Download of {} returned a decoded body", endpoint).into());
        };

        tokio::fs::write(path, &data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(bytes = data.len(), path = %path.display(), "Downloaded file");
        Ok(data.len() as u64)
    }
}

/// Default JSON content type, caller overrides, no content type for forms, bearer last
fn build_headers(request: &ApiRequest, token: Option<&str>) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.extend(request.headers.clone());

    if request.body.is_form() {
        // The transport sets multipart/form-data with its boundary
        headers.remove(CONTENT_TYPE);
    }

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Access token is not a valid header value")?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

fn transport_error(e: reqwest::Error, url: &str) -> ApiError {
    // Categorize the error for better debugging
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    };

    tracing::warn!(
        error_kind = error_kind,
        error = %e,
        url = %url,
        "HTTP request error"
    );

    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

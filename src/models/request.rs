// Outbound call description and decoded response payloads

use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{multipart, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

// ==================================================================================================
// Request Models
// ==================================================================================================

/// Body of an outbound call
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(FormData),
}

impl RequestBody {
    pub fn is_form(&self) -> bool {
        matches!(self, RequestBody::Form(_))
    }
}

/// One part of a multipart form
#[derive(Debug, Clone)]
pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

/// Multipart form data.
///
/// Kept as plain data so the same form can be rebuilt for every retry.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    parts: Vec<(String, FormPart)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_string),
                data: data.into(),
            },
        ));
        self
    }

    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build a fresh multipart form for one attempt
    pub fn to_multipart(&self) -> Result<multipart::Form, ApiError> {
        let mut form = multipart::Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File {
                    file_name,
                    content_type,
                    data,
                } => {
                    let mut file_part =
                        multipart::Part::bytes(data.to_vec()).file_name(file_name.clone());
                    if let Some(content_type) = content_type {
                        file_part = file_part.mime_str(content_type).with_context(|| {
                            format!("Invalid content type for form part '{}'", name)
                        })?;
                    }
                    form.part(name.clone(), file_part)
                }
            };
        }
        Ok(form)
    }
}

/// Description of one outbound call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL or path relative to the configured base
    pub endpoint: String,
    pub body: RequestBody,
    pub headers: HeaderMap,
    pub requires_auth: bool,
    pub skip_token_refresh: bool,
    /// Return the success body as raw bytes instead of decoding it
    pub raw_response: bool,
    /// Per-call override of the client's attempt budget
    pub max_attempts: Option<u32>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            requires_auth: true,
            skip_token_refresh: false,
            raw_response: false,
            max_attempts: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, form: FormData) -> Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Add a header; caller headers override the defaults
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send without credentials (login, public endpoints)
    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Attach the current token as-is and never refresh for this call
    pub fn skip_token_refresh(mut self) -> Self {
        self.skip_token_refresh = true;
        self
    }

    /// Deliver the body untouched as [`Payload::Binary`]
    pub fn raw_response(mut self) -> Self {
        self.raw_response = true;
        self
    }

    /// Cap the attempts for this call; 1 disables retries
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }
}

// ==================================================================================================
// Response Models
// ==================================================================================================

/// Decoded success response
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    /// Body of a `raw_response` call (file downloads)
    Binary(Bytes),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(data) => Some(data),
            _ => None,
        }
    }

    /// Deserialize the payload; text payloads are parsed as JSON
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let parsed = match self {
            Payload::Json(value) => serde_json::from_value(value),
            Payload::Text(text) => serde_json::from_str(&text),
            Payload::Binary(data) => serde_json::from_slice(&data),
        };
        Ok(parsed.context("Failed to decode response payload")?)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(pretty) => f.write_str(&pretty),
                Err(_) => write!(f, "{}", value),
            },
            Payload::Text(text) => f.write_str(text),
            Payload::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

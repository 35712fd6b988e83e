//! HTTP Client Module
//!
//! A `reqwest` client bound to the backend base URL. The session cookie is
//! kept in the client's cookie store and attached to every request. This
//! layer never retries; 401 recovery belongs to the interceptor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::validation::FieldError;

/// An outgoing API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/auth/me`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Set once this request has been replayed after a session renewal.
    pub retried: bool,
    /// Whether a 401 on this request may trigger a session renewal.
    pub renewable: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            retried: false,
            renewable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    /// Attach text fields, sent as `multipart/form-data`.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn queries(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Exempt this request from session renewal.
    pub fn without_renewal(mut self) -> Self {
        self.renewable = false;
        self
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A response received from the backend, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into `ApiError::Http`.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Http {
                status: self.status.as_u16(),
                body: parse_body(&self.body),
            })
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

/// Something that can deliver an `ApiRequest`.
///
/// Returns `Ok` for every HTTP status; `Err` only when no response arrived.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `reqwest`-backed transport with a cookie store
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        debug!("{} {} (retried: {})", request.method, url, request.retried);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match &request.body {
            Some(RequestBody::Json(body)) => builder = builder.json(body),
            Some(RequestBody::Form(fields)) => {
                let form = fields.iter().fold(Form::new(), |form, (name, value)| {
                    form.text(name.clone(), value.clone())
                });
                builder = builder.multipart(form);
            }
            None => {}
        }

        let response = builder.send().await.map_err(|e| {
            let err = self.transport_error(e);
            warn!("{} {} failed: {}", request.method, url, err);
            err
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!("{} {} -> {}", request.method, url, status);

        Ok(ApiResponse { status, body })
    }
}

/// API errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error: HTTP {status}")]
    Http {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Session renewal failed: {0}")]
    RenewalFailed(#[source] Box<ApiError>),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RenewalFailed(cause) => cause.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }

    /// The backend's `message` field, if any.
    pub fn server_message(&self) -> Option<String> {
        match self {
            Self::Http { body, .. } => match body {
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
                serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
                _ => None,
            },
            Self::RenewalFailed(cause) => cause.server_message(),
            _ => None,
        }
    }

    /// Field-level failures, from local checks or a 400 `validationErrors` body.
    ///
    /// The backend sends either a list of `{field, error}` or a single one.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Validation(errors) => errors.clone(),
            Self::Http { status: 400, body } => match body.get("validationErrors") {
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect(),
                Some(item @ serde_json::Value::Object(_)) => {
                    serde_json::from_value(item.clone()).map(|e| vec![e]).unwrap_or_default()
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// A message fit for display to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Please check your connection.".to_string(),
            Self::Timeout(_) => "The server took too long to respond.".to_string(),
            Self::RenewalFailed(_) => "Your session has expired. Please log in again.".to_string(),
            Self::Validation(_) => "Please correct the highlighted fields.".to_string(),
            Self::Http { status, .. } => self
                .server_message()
                .unwrap_or_else(|| format!("Request failed (HTTP {status}). Please try again.")),
            Self::Parse(_) => "Unexpected response from the server.".to_string(),
        }
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        Self::Validation(errors)
    }
}

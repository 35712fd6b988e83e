//! Authentication Module
//!
//! Holds who is logged in. The store is the only writer of `AuthState`;
//! every transition keeps `is_authenticated == user.is_some()`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::http::ApiError;
use crate::interceptor::SessionListener;
use crate::validation::{FieldError, Validator};

/// Server-assigned role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Role {
    Member,
    Doctor,
    Unknown(i64),
}

impl From<i64> for Role {
    fn from(value: i64) -> Self {
        match value {
            0 => Role::Member,
            2 => Role::Doctor,
            other => Role::Unknown(other),
        }
    }
}

impl From<Role> for i64 {
    fn from(role: Role) -> Self {
        match role {
            Role::Member => 0,
            Role::Doctor => 2,
            Role::Unknown(value) => value,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Doctor => write!(f, "doctor"),
            Role::Unknown(value) => write!(f, "unknown({})", value),
        }
    }
}

/// Membership subscription attached to a member account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub current_plan: Option<String>,
    #[serde(default)]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

/// The logged-in user as the server sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    /// Fields this client does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Error kept in `AuthState` for the UI to show once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthError {
    pub status: Option<u16>,
    pub message: String,
    pub field_errors: Vec<FieldError>,
}

impl From<&ApiError> for AuthError {
    fn from(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            message: err.user_message(),
            field_errors: err.field_errors(),
        }
    }
}

/// Current login status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    user: Option<User>,
    is_authenticated: bool,
    loading: bool,
    error: Option<AuthError>,
    #[serde(skip)]
    pending: u32,
}

impl AuthState {
    /// A settled state for `user`.
    pub fn new(user: Option<User>, loading: bool) -> Self {
        Self {
            is_authenticated: user.is_some(),
            user,
            loading,
            error: None,
            pending: u32::from(loading),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    fn set_user(&mut self, user: Option<User>) {
        self.is_authenticated = user.is_some();
        self.user = user;
    }

    fn begin(&mut self) {
        self.pending += 1;
        self.loading = true;
        self.error = None;
    }

    fn finish(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.loading = self.pending > 0;
    }
}

/// Login form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .email("email", &self.email)
            .required("password", &self.password, "Password is required")
            .min_len(
                "password",
                &self.password,
                8,
                "Password must be at least 8 characters long",
            )
            .finish()
    }
}

/// Signup form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("name", &self.name, "Name is required")
            .email("email", &self.email)
            .required("password", &self.password, "Password is required")
            .min_len(
                "password",
                &self.password,
                8,
                "Password must be at least 8 characters long",
            )
            .finish()
    }
}

/// Single source of truth for who is logged in.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AuthStore {
    state: Arc<watch::Sender<AuthState>>,
}

impl AuthStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Load the current user from `/auth/me`.
    pub async fn fetch_current_user(&self, api: &ApiClient) -> Result<User, ApiError> {
        self.state.send_modify(AuthState::begin);

        let result = api.me().await;

        self.state.send_modify(|state| {
            match &result {
                Ok(user) => {
                    state.set_user(Some(user.clone()));
                    state.error = None;
                }
                Err(e) => {
                    state.set_user(None);
                    state.error = Some(AuthError::from(e));
                }
            }
            state.finish();
        });

        match &result {
            Ok(user) => info!("Current user: {} ({})", user.id, user.role),
            Err(e) => warn!("Could not load current user: {}", e),
        }
        result
    }

    /// Establish a session. Does not load the user; call
    /// `fetch_current_user` afterwards (or use `sign_in`).
    pub async fn login(&self, api: &ApiClient, credentials: &LoginCredentials) -> Result<(), ApiError> {
        self.state.send_modify(AuthState::begin);
        let result = match credentials.validate() {
            Ok(()) => api.login(credentials).await,
            Err(errors) => Err(ApiError::Validation(errors)),
        };
        self.settle(result)
    }

    /// Create an account.
    pub async fn signup(&self, api: &ApiClient, form: &SignupForm) -> Result<(), ApiError> {
        self.state.send_modify(AuthState::begin);
        let result = match form.validate() {
            Ok(()) => api.signup(form).await,
            Err(errors) => Err(ApiError::Validation(errors)),
        };
        self.settle(result)
    }

    /// Log in, then load the user. Stays loading across both steps.
    pub async fn sign_in(&self, api: &ApiClient, credentials: &LoginCredentials) -> Result<User, ApiError> {
        self.state.send_modify(AuthState::begin);
        let result = match self.login(api, credentials).await {
            Ok(()) => self.fetch_current_user(api).await,
            Err(e) => Err(e),
        };
        self.state.send_modify(AuthState::finish);
        result
    }

    /// End the session. Local state always ends logged out, even if the
    /// server call fails.
    pub async fn logout(&self, api: &ApiClient) {
        self.state.send_modify(AuthState::begin);

        if let Err(e) = api.logout().await {
            warn!("Logout request failed, clearing local session anyway: {}", e);
        }

        self.state.send_modify(|state| {
            state.set_user(None);
            state.error = None;
            state.finish();
        });
        info!("Logged out");
    }

    fn settle(&self, result: Result<(), ApiError>) -> Result<(), ApiError> {
        self.state.send_modify(|state| {
            if let Err(e) = &result {
                state.error = Some(AuthError::from(e));
            }
            state.finish();
        });
        result
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionListener for AuthStore {
    fn session_expired(&self, cause: &ApiError) {
        error!("Session expired and could not be renewed: {}", cause);
        let reported = ApiError::RenewalFailed(Box::new(cause.clone()));
        self.state.send_modify(|state| {
            state.set_user(None);
            state.error = Some(AuthError::from(&reported));
        });
    }
}

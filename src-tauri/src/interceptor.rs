//! Auth Interceptor Module
//!
//! Recovers from an expired session exactly once per request: on a 401 the
//! session is renewed and the request replayed. Concurrent 401s share a
//! single renewal call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::http::{ApiError, ApiRequest, ApiResponse, Transport};

/// Session renewal endpoint.
pub const RENEW_PATH: &str = "/auth/renew-access-token";

/// Logout endpoint, notified when renewal fails.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Told when the session could not be renewed.
pub trait SessionListener: Send + Sync {
    fn session_expired(&self, error: &ApiError);
}

/// Wraps a transport with the renew-then-retry policy.
pub struct AuthInterceptor {
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn SessionListener>>,
    /// Bumped each time a renewal finishes, successfully or not.
    generation: AtomicU64,
    /// Outcome of the latest renewal; the lock also serializes renewals.
    last_renewal: Mutex<Option<Result<(), ApiError>>>,
}

impl AuthInterceptor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            listener: None,
            generation: AtomicU64::new(0),
            last_renewal: Mutex::new(None),
        }
    }

    /// Notify `listener` when renewal fails.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Number of renewals completed so far.
    pub fn renewals(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Send a request, renewing the session once if it comes back 401.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let observed = self.generation.load(Ordering::Acquire);
        let response = self.transport.send(&request).await?;

        if response.status != StatusCode::UNAUTHORIZED || !request.renewable {
            return response.into_result();
        }

        if request.retried {
            warn!("Request rejected again after renewal");
            return response.into_result();
        }

        request.retried = true;
        self.renew(observed).await?;

        debug!("Replaying request after session renewal");
        let replay = self.transport.send(&request).await?;
        if replay.status == StatusCode::UNAUTHORIZED {
            warn!("Request rejected again after renewal");
        }
        replay.into_result()
    }

    /// Renew the session unless a renewal already finished after `observed`.
    async fn renew(&self, observed: u64) -> Result<(), ApiError> {
        let mut last = self.last_renewal.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last.as_ref() {
                debug!("Reusing concurrent renewal outcome");
                return outcome.clone();
            }
        }

        info!("Session rejected, renewing");
        let renewal = ApiRequest::post(RENEW_PATH).without_renewal();
        let outcome = match self
            .transport
            .send(&renewal)
            .await
            .and_then(ApiResponse::into_result)
        {
            Ok(_) => {
                info!("Session renewed");
                Ok(())
            }
            Err(cause) => {
                warn!("Session renewal failed: {}", cause);
                self.end_session(&cause).await;
                Err(ApiError::RenewalFailed(Box::new(cause)))
            }
        };

        *last = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn end_session(&self, cause: &ApiError) {
        let logout = ApiRequest::post(LOGOUT_PATH).without_renewal();
        if let Err(e) = self.transport.send(&logout).await {
            debug!("Logout notification failed: {}", e);
        }
        if let Some(listener) = &self.listener {
            listener.session_expired(cause);
        }
    }
}

//! Scripted transports for exercising the client without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::http::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::interceptor::{LOGOUT_PATH, RENEW_PATH};

/// Answers each path from a queue; the last queued answer repeats.
/// Unscripted paths get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Result<ApiResponse, ApiError>>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.push(path, Ok(ApiResponse::new(status, body)));
    }

    pub fn fail(&self, path: &str, error: ApiError) {
        self.push(path, Err(error));
    }

    fn push(&self, path: &str, answer: Result<ApiResponse, ApiError>) {
        self.script
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(answer);
    }

    /// `METHOD /path` for every request sent, in order.
    pub fn calls(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.log.lock().unwrap().push(request.clone());

        let mut script = self.script.lock().unwrap();
        match script.get_mut(&request.path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Ok(ApiResponse::new(StatusCode::NOT_FOUND, "")),
        }
    }
}

/// A backend whose session has expired. Renewal takes a moment so
/// concurrent requests pile up behind it.
pub struct ExpiringSession {
    valid: AtomicBool,
    renewable: bool,
    renewals: AtomicUsize,
}

impl ExpiringSession {
    /// Expired, but renewal succeeds.
    pub fn expired() -> Self {
        Self {
            valid: AtomicBool::new(false),
            renewable: true,
            renewals: AtomicUsize::new(0),
        }
    }

    /// Expired, and renewal is refused.
    pub fn dead() -> Self {
        Self {
            renewable: false,
            ..Self::expired()
        }
    }

    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ExpiringSession {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        match request.path.as_str() {
            RENEW_PATH => {
                self.renewals.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.renewable {
                    self.valid.store(true, Ordering::SeqCst);
                    Ok(ApiResponse::new(StatusCode::OK, ""))
                } else {
                    Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""))
                }
            }
            LOGOUT_PATH => {
                self.valid.store(false, Ordering::SeqCst);
                Ok(ApiResponse::new(StatusCode::OK, ""))
            }
            _ if self.valid.load(Ordering::SeqCst) => Ok(ApiResponse::new(StatusCode::OK, "{}")),
            _ => Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "")),
        }
    }
}

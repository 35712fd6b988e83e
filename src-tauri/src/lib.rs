//! Growth Tracker Mobile Library
//!
//! Native core of the Growth Tracker app: the authenticated API client,
//! session renewal, auth state and the route set the screens are built from.

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod models;
pub mod routes;
pub mod validation;

#[cfg(feature = "app")]
pub mod commands;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use anyhow::Context;

use api::ApiClient;
use auth::{AuthState, AuthStore};
use config::Config;
use routes::{RouteSet, Screen};

/// Application state shared across commands
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub api: ApiClient,
    pub auth: AuthStore,
}

impl AppState {
    /// Build the state from the process environment
    pub fn bootstrap() -> anyhow::Result<Self> {
        let config = Config::from_env().context("Failed to read client configuration")?;
        Self::with_config(config)
    }

    /// Build the state for an explicit config. The auth store is wired in as
    /// the client's session listener so a failed renewal logs the user out.
    pub fn with_config(config: Config) -> anyhow::Result<Self> {
        let auth = AuthStore::new();
        let api = ApiClient::from_config(&config, Some(Arc::new(auth.clone())))
            .context("Failed to create API client")?;
        Ok(Self { config, api, auth })
    }

    /// Ask the backend who is logged in. Failures are recorded in the state.
    pub async fn restore_session(&self) -> AuthState {
        let _ = self.auth.fetch_current_user(&self.api).await;
        self.auth.snapshot()
    }

    pub fn routes(&self) -> RouteSet {
        routes::compose(&self.auth.snapshot())
    }

    /// Navigation guard for the current session.
    pub fn can_navigate(&self, screen: Screen) -> bool {
        self.routes().permits(screen)
    }
}

/// Start the app shell
#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tracing::{error, info};

    let logs = logging::init();
    info!("Growth Tracker starting, logging to {}", logs.directory.display());

    let state = match AppState::bootstrap() {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return;
        }
    };
    info!("Backend: {}", state.config.api_base_url);

    let result = tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            commands::get_auth_state,
            commands::get_routes,
            commands::can_navigate,
            commands::fetch_current_user,
            commands::sign_in,
            commands::sign_up,
            commands::logout,
            commands::get_profile,
            commands::list_doctors,
            commands::list_children,
            commands::get_growth_data,
            commands::update_growth_data,
            commands::consultation_history,
            commands::request_consultation,
            commands::consultation_messages,
            commands::send_consultation_message,
            commands::membership_package,
            commands::create_payment,
        ])
        .setup(|app| {
            commands::watch_session(app.handle().clone());
            info!("Application setup complete");
            Ok(())
        })
        .run(tauri::generate_context!());

    if let Err(e) = result {
        error!("Error running Growth Tracker: {}", e);
    }
}

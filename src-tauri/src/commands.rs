//! Tauri Commands Module
//!
//! IPC commands exposed to the webview screens, and the `auth_changed`
//! event pushed on every auth transition.

use serde::Serialize;
use tauri::{command, AppHandle, Emitter, Manager, State};
use tracing::{debug, info, warn};

use crate::auth::{AuthState, LoginCredentials, SignupForm, User};
use crate::http::ApiError;
use crate::models::{
    Child, Consultation, ConsultationMessage, ConsultationRequestInput, ConsultationSide,
    GrowthData, GrowthDataInput, MembershipPackage, PageQuery, PaymentProvider, PaymentRequest,
};
use crate::routes::{compose, RouteSet, Screen};
use crate::validation::FieldError;
use crate::AppState;

/// Event name carrying `SessionSnapshot`.
pub const AUTH_CHANGED: &str = "auth_changed";

// Response types for frontend

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub auth: AuthState,
    pub routes: RouteSet,
}

impl SessionSnapshot {
    fn of(auth: AuthState) -> Self {
        let routes = compose(&auth);
        Self { auth, routes }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub message: String,
    pub status: Option<u16>,
    pub field_errors: Vec<FieldError>,
}

impl From<ApiError> for CommandError {
    fn from(err: ApiError) -> Self {
        debug!("Command failed: {}", err);
        Self {
            message: err.user_message(),
            status: err.status(),
            field_errors: err.field_errors(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: User,
    pub membership: Option<MembershipPackage>,
}

type CommandResult<T> = Result<T, CommandError>;

/// Restore the session on boot and forward every auth change to the webview.
pub fn watch_session(app: AppHandle) {
    let state = app.state::<AppState>().inner().clone();

    let boot = state.clone();
    tauri::async_runtime::spawn(async move {
        let restored = boot.restore_session().await;
        info!("Session restored (authenticated: {})", restored.is_authenticated());
    });

    let mut changes = state.auth.subscribe();
    tauri::async_runtime::spawn(async move {
        while changes.changed().await.is_ok() {
            let snapshot = SessionSnapshot::of(changes.borrow_and_update().clone());
            if let Err(e) = app.emit(AUTH_CHANGED, &snapshot) {
                warn!("Failed to emit auth change: {}", e);
            }
        }
    });
}

// Session

#[command]
pub fn get_auth_state(state: State<'_, AppState>) -> AuthState {
    state.auth.snapshot()
}

#[command]
pub fn get_routes(state: State<'_, AppState>) -> RouteSet {
    state.routes()
}

#[command]
pub fn can_navigate(screen: Screen, state: State<'_, AppState>) -> bool {
    let allowed = state.can_navigate(screen);
    if !allowed {
        debug!("Navigation to {:?} refused", screen);
    }
    allowed
}

#[command]
pub async fn fetch_current_user(state: State<'_, AppState>) -> CommandResult<SessionSnapshot> {
    state.auth.fetch_current_user(&state.api).await?;
    Ok(SessionSnapshot::of(state.auth.snapshot()))
}

#[command]
pub async fn sign_in(
    credentials: LoginCredentials,
    state: State<'_, AppState>,
) -> CommandResult<SessionSnapshot> {
    state.auth.sign_in(&state.api, &credentials).await?;
    Ok(SessionSnapshot::of(state.auth.snapshot()))
}

#[command]
pub async fn sign_up(form: SignupForm, state: State<'_, AppState>) -> CommandResult<()> {
    state.auth.signup(&state.api, &form).await?;
    Ok(())
}

#[command]
pub async fn logout(state: State<'_, AppState>) -> CommandResult<SessionSnapshot> {
    state.auth.logout(&state.api).await;
    Ok(SessionSnapshot::of(state.auth.snapshot()))
}

// Profile & users

#[command]
pub async fn get_profile(state: State<'_, AppState>) -> CommandResult<Profile> {
    let current = state.auth.snapshot().user().cloned().ok_or(CommandError {
        message: "Not logged in".to_string(),
        status: Some(401),
        field_errors: Vec::new(),
    })?;

    let user = state.api.get_user(&current.id).await?;
    let plan = user
        .subscription
        .as_ref()
        .and_then(|s| s.current_plan.clone());
    let membership = match plan {
        Some(plan) => Some(state.api.membership_package(&plan).await?),
        None => None,
    };
    Ok(Profile { user, membership })
}

#[command]
pub async fn list_doctors(page: Option<PageQuery>, state: State<'_, AppState>) -> CommandResult<Vec<User>> {
    Ok(state.api.list_doctors(&page.unwrap_or_default()).await?)
}

// Children & growth data

#[command]
pub async fn list_children(page: Option<PageQuery>, state: State<'_, AppState>) -> CommandResult<Vec<Child>> {
    let page = page.unwrap_or_else(crate::api::children_for_request);
    Ok(state.api.list_children(&page).await?)
}

#[command]
pub async fn get_growth_data(
    child_id: String,
    growth_data_id: String,
    state: State<'_, AppState>,
) -> CommandResult<GrowthData> {
    Ok(state.api.get_growth_data(&child_id, &growth_data_id).await?)
}

#[command]
pub async fn update_growth_data(
    child_id: String,
    growth_data_id: String,
    input: GrowthDataInput,
    state: State<'_, AppState>,
) -> CommandResult<()> {
    Ok(state
        .api
        .update_growth_data(&child_id, &growth_data_id, &input)
        .await?)
}

// Consultations

#[command]
pub async fn consultation_history(
    page: Option<PageQuery>,
    state: State<'_, AppState>,
) -> CommandResult<Vec<Consultation>> {
    let snapshot = state.auth.snapshot();
    let Some(user) = snapshot.user() else {
        return Ok(Vec::new());
    };
    let Some(side) = ConsultationSide::for_role(user.role) else {
        warn!("No consultation history for role {}", user.role);
        return Ok(Vec::new());
    };
    Ok(state
        .api
        .consultation_history(&user.id, side, &page.unwrap_or_default())
        .await?)
}

#[command]
pub async fn request_consultation(
    input: ConsultationRequestInput,
    state: State<'_, AppState>,
) -> CommandResult<()> {
    Ok(state.api.request_consultation(&input).await?)
}

#[command]
pub async fn consultation_messages(
    consultation_id: String,
    state: State<'_, AppState>,
) -> CommandResult<Vec<ConsultationMessage>> {
    Ok(state.api.consultation_messages(&consultation_id).await?)
}

#[command]
pub async fn send_consultation_message(
    consultation_id: String,
    message: String,
    state: State<'_, AppState>,
) -> CommandResult<Option<String>> {
    Ok(state
        .api
        .send_consultation_message(&consultation_id, &message)
        .await?)
}

// Membership & payments

#[command]
pub async fn membership_package(
    package_id: String,
    state: State<'_, AppState>,
) -> CommandResult<MembershipPackage> {
    Ok(state.api.membership_package(&package_id).await?)
}

/// Start checkout for a membership; returns the URL to open
#[command]
pub async fn create_payment(
    provider: PaymentProvider,
    package_id: String,
    state: State<'_, AppState>,
) -> CommandResult<String> {
    let package = state.api.membership_package(&package_id).await?;
    let payment = PaymentRequest::membership(&package);
    info!("Creating {} payment for package {}", provider.as_str(), package.id);
    Ok(state.api.create_payment(provider, &payment).await?)
}

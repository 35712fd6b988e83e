//! Route Composer
//!
//! Derives the navigable screens from the auth state. Pure; recompute on
//! every state change.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{AuthState, Role};

/// A destination in the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    /// Placeholder shown while an auth request is in flight.
    Loading,
    Home,
    Login,
    Signup,
    Child,
    ConsultationRequest,
    ConsultationHistory,
    Settings,
    // nested
    Blogs,
    BlogDetail,
    Faqs,
    ChildDetails,
    GrowthDataDetails,
    Profile,
    MembershipDetails,
    ConsultationChat,
}

impl Screen {
    /// Screens pushed on top of this tab.
    pub fn stack(self) -> &'static [Screen] {
        match self {
            Screen::Home => &[Screen::Blogs, Screen::BlogDetail, Screen::Faqs],
            Screen::Child => &[Screen::ChildDetails, Screen::GrowthDataDetails],
            Screen::Settings => &[Screen::Profile, Screen::MembershipDetails],
            Screen::ConsultationHistory => &[Screen::ConsultationChat],
            _ => &[],
        }
    }
}

/// Screens the user may currently reach
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSet {
    /// Top-level tabs, in display order. Never empty.
    pub screens: Vec<Screen>,
    pub initial: Screen,
}

impl RouteSet {
    fn tabs(screens: &[Screen]) -> Self {
        Self {
            screens: screens.to_vec(),
            initial: screens[0],
        }
    }

    /// Whether `screen` is a tab here or nested under one.
    pub fn permits(&self, screen: Screen) -> bool {
        self.screens
            .iter()
            .any(|tab| *tab == screen || tab.stack().contains(&screen))
    }

    pub fn is_loading(&self) -> bool {
        self.screens == [Screen::Loading]
    }
}

const SIGNED_OUT: &[Screen] = &[Screen::Home, Screen::Login, Screen::Signup];

const MEMBER: &[Screen] = &[
    Screen::Home,
    Screen::Child,
    Screen::ConsultationRequest,
    Screen::ConsultationHistory,
    Screen::Settings,
];

const DOCTOR: &[Screen] = &[
    Screen::Home,
    Screen::ConsultationRequest,
    Screen::ConsultationHistory,
    Screen::Settings,
];

/// Compose the route set for `state`.
pub fn compose(state: &AuthState) -> RouteSet {
    if state.loading() {
        return RouteSet::tabs(&[Screen::Loading]);
    }

    match state.role() {
        None => RouteSet::tabs(SIGNED_OUT),
        Some(Role::Member) => RouteSet::tabs(MEMBER),
        Some(Role::Doctor) => RouteSet::tabs(DOCTOR),
        Some(Role::Unknown(value)) => {
            warn!("Unrecognized role {}, only Home is reachable", value);
            RouteSet::tabs(&[Screen::Home])
        }
    }
}

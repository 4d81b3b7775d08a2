//! Screen selection from the resolved user and loading flag.

use crate::auth::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Login,
    ConsumerDashboard,
    FarmerDashboard,
}

impl Screen {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Loading => "Loading...",
            Self::Login => "FarmConnect PH",
            Self::ConsumerDashboard => "Welcome, Consumer!",
            Self::FarmerDashboard => "Welcome, Farmer!",
        }
    }

    #[must_use]
    pub fn subtitle(self) -> &'static str {
        match self {
            Self::Loading => "",
            Self::Login => "Connecting Filipino farmers with consumers",
            Self::ConsumerDashboard => "Browse fresh produce from local farmers",
            Self::FarmerDashboard => "Manage your products and connect with consumers",
        }
    }

    #[must_use]
    pub fn is_dashboard(self) -> bool {
        matches!(self, Self::ConsumerDashboard | Self::FarmerDashboard)
    }
}

/// Pick exactly one screen. Loading wins over everything; an unknown or
/// missing role lands on the consumer dashboard.
#[must_use]
pub fn route(user: Option<&User>, loading: bool) -> Screen {
    if loading {
        return Screen::Loading;
    }
    match user.map(User::role) {
        None => Screen::Login,
        Some(Role::Farmer) => Screen::FarmerDashboard,
        Some(Role::Consumer) => Screen::ConsumerDashboard,
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;

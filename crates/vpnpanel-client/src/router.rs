use std::fmt;

use vpnpanel_types::Session;

use crate::admin::AdminAllowList;

/// Screens reachable in the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Auth,
    Profile,
    ProfilePay,
    AdminList,
    AdminReview,
}

impl Screen {
    /// Resolve a path. `/` has no screen of its own and resolves to `Auth`;
    /// `route` forwards it to `Profile` when a session exists.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let normalized = trimmed.trim_end_matches('/');
        match normalized {
            "" | "/auth" => Some(Self::Auth),
            "/profile" => Some(Self::Profile),
            "/profile-pay" => Some(Self::ProfilePay),
            "/admin" => Some(Self::AdminList),
            "/admin-check" => Some(Self::AdminReview),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Auth => "/auth",
            Self::Profile => "/profile",
            Self::ProfilePay => "/profile-pay",
            Self::AdminList => "/admin",
            Self::AdminReview => "/admin-check",
        }
    }

    pub fn requires_session(&self) -> bool {
        !matches!(self, Self::Auth)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::AdminList | Self::AdminReview)
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Show(Screen),
    Redirect(Screen),
}

impl Route {
    pub fn screen(&self) -> Screen {
        match self {
            Self::Show(s) | Self::Redirect(s) => *s,
        }
    }
}

/// Decide what to show for `requested`. Checks run on every navigation
/// against the current session and allow-list.
pub fn route(requested: Screen, session: Option<&Session>, admins: &AdminAllowList) -> Route {
    let Some(session) = session else {
        return if requested == Screen::Auth {
            Route::Show(Screen::Auth)
        } else {
            Route::Redirect(Screen::Auth)
        };
    };

    if requested == Screen::Auth {
        return Route::Redirect(Screen::Profile);
    }

    if requested.requires_admin() && !admins.is_admin_user_id(session.identity.id) {
        return Route::Redirect(Screen::Profile);
    }

    Route::Show(requested)
}

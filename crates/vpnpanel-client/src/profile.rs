use chrono::{DateTime, Utc};

use vpnpanel_types::Session;

use crate::admin::AdminAllowList;
use crate::expiry::{Expiry, RenewalSchedule};

/// Everything the profile screen renders, derived fresh on each build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub user_id: i64,
    pub display_name: String,
    pub photo: Option<String>,
    pub expiry: Expiry,
    pub subscription_url: Option<String>,
    pub can_view_admin_panel: bool,
}

impl ProfileView {
    pub fn build(
        session: &Session,
        admins: &AdminAllowList,
        schedule: &RenewalSchedule,
        now: DateTime<Utc>,
    ) -> Self {
        let identity = &session.identity;
        let display_name = identity
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or("User")
            .to_string();

        Self {
            user_id: identity.id,
            display_name,
            photo: identity.photo.clone().filter(|p| !p.is_empty()),
            expiry: schedule.expiry_at(now),
            subscription_url: session.subscription_url.clone().filter(|u| !u.is_empty()),
            can_view_admin_panel: admins.is_admin_user_id(identity.id),
        }
    }

    pub fn days_left(&self) -> i64 {
        self.expiry.days_left
    }

    pub fn formatted_expiry(&self) -> String {
        self.expiry.formatted()
    }
}

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{info, warn};

use vpnpanel_types::{AuthResponse, Identity, Session};

use crate::error::{ClientError, ClientResult};
use crate::storage::KeyValueStore;

pub const USER_KEY: &str = "tg_user";
pub const TOKEN_KEY: &str = "token";
pub const SUBSCRIPTION_URL_KEY: &str = "subscription_url";

pub const USER_ID_HEADER: &str = "x-telegram-user-id";
pub const USERNAME_HEADER: &str = "x-telegram-username";

/// Persisted session access. Only the auth callback (`save`) and logout
/// (`clear_session`) write; everything else reads.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read the stored session. A corrupt bundle or unreadable storage is
    /// treated exactly like "never logged in".
    pub fn get_stored_user(&self) -> Option<Session> {
        let raw = match self.kv.get(USER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Session storage unreadable, treating as signed out: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<AuthResponse>(&raw) {
            Ok(bundle) => Some(Session::from(bundle)),
            Err(e) => {
                warn!("Stored session is corrupt, treating as signed out: {}", e);
                None
            }
        }
    }

    /// Raw bearer token, empty when absent.
    pub fn token(&self) -> String {
        self.kv.get(TOKEN_KEY).ok().flatten().unwrap_or_default()
    }

    /// Persist a fresh session from the auth endpoint's response.
    pub fn save(&self, resp: AuthResponse) -> ClientResult<Session> {
        let bundle = serde_json::to_string(&resp)?;
        self.kv.set(USER_KEY, &bundle)?;
        self.kv.set(TOKEN_KEY, &resp.token)?;
        match resp.subscription_url.as_deref() {
            Some(url) if !url.is_empty() => self.kv.set(SUBSCRIPTION_URL_KEY, url)?,
            _ => self.kv.remove(SUBSCRIPTION_URL_KEY)?,
        }

        info!("Session stored for user {}", resp.id);
        Ok(Session::from(resp))
    }

    /// Remove all three session keys.
    pub fn clear_session(&self) -> ClientResult<()> {
        let mut first_err = None;
        for key in [USER_KEY, TOKEN_KEY, SUBSCRIPTION_URL_KEY] {
            if let Err(e) = self.kv.remove(key) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                info!("Session cleared");
                Ok(())
            }
        }
    }

    /// Per-request auth headers. The token is re-read on every call so a
    /// token rotated by another writer is picked up immediately.
    pub fn build_auth_headers(&self, identity: &Identity) -> AuthHeaders {
        AuthHeaders {
            authorization: format!("Bearer {}", self.token()),
            user_id: identity.id.to_string(),
            username: identity.username.clone().unwrap_or_default(),
        }
    }
}

/// Headers every authenticated request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub authorization: String,
    pub user_id: String,
    pub username: String,
}

impl AuthHeaders {
    pub fn to_header_map(&self) -> ClientResult<HeaderMap> {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, header_value("Authorization", &self.authorization)?);
        map.insert(
            HeaderName::from_static(USER_ID_HEADER),
            header_value("X-Telegram-User-Id", &self.user_id)?,
        );
        map.insert(
            HeaderName::from_static(USERNAME_HEADER),
            header_value("X-Telegram-Username", &self.username)?,
        );
        Ok(map)
    }
}

fn header_value(name: &'static str, value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader { name })
}

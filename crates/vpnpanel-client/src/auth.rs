use std::sync::Arc;

use tracing::{info, warn};

use vpnpanel_types::{Session, TelegramAuthPayload};

use crate::api::PortalApi;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionStore;

/// Login and logout. The only writers of the session store.
pub struct AuthFlow<A: PortalApi> {
    api: Arc<A>,
    sessions: SessionStore,
}

impl<A: PortalApi> AuthFlow<A> {
    pub fn new(api: Arc<A>, sessions: SessionStore) -> Self {
        Self { api, sessions }
    }

    /// Exchange the identity widget's payload for a session and persist it.
    /// Failures come back as `ClientError::Rejected` carrying the message to
    /// show on the auth screen.
    pub async fn on_telegram_auth(&self, payload: &TelegramAuthPayload) -> ClientResult<Session> {
        let resp = match self.api.telegram_login(payload).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Telegram login failed for user {}: {}", payload.id, e);
                return Err(ClientError::Rejected(login_failure_message(&e)));
            }
        };

        let session = self.sessions.save(resp)?;
        info!("User {} signed in", session.identity.id);
        Ok(session)
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.sessions.clear_session()
    }

    pub fn current(&self) -> Option<Session> {
        self.sessions.get_stored_user()
    }
}

fn login_failure_message(e: &ClientError) -> String {
    match e {
        ClientError::Server { message, .. } => format!("Authorization failed: {}", message),
        ClientError::Network(_) => "Network error during authorization, please try again".to_string(),
        other => format!("Authorization failed: {}", other),
    }
}

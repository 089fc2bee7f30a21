use serde::{Deserialize, Serialize};

use crate::models::PaymentStatus;

// -- Auth --

/// Payload handed to the page by the Telegram login widget callback.
/// Forwarded verbatim to the auth endpoint, which verifies `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramAuthPayload {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Body returned by `POST /api/auth/telegram/`. Also the persisted session bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    pub token: String,
    #[serde(default)]
    pub subscription_url: Option<String>,
}

// -- Payment proofs --

/// Every list endpoint wraps its rows in `{ "items": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PaymentStatus,
}

// -- Errors --

/// Error body shape used by the backend. `error` may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::AuthResponse;

/// Telegram identity captured at login. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: Option<String>,
    pub photo: Option<String>,
}

/// An authenticated session as persisted on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
    pub subscription_url: Option<String>,
}

impl From<AuthResponse> for Session {
    fn from(resp: AuthResponse) -> Self {
        Self {
            identity: Identity {
                id: resp.id,
                username: resp.username,
                photo: resp.photo,
            },
            token: resp.token,
            subscription_url: resp.subscription_url,
        }
    }
}

/// Moderation status of a payment proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// A user-submitted payment screenshot. Status is only ever changed by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_by: Option<i64>,
    #[serde(default)]
    pub reviewed_by_username: String,
    /// Absolute URL or a path relative to the API host. Empty when the
    /// server has no file for the record.
    #[serde(default)]
    pub file_url: String,
}

impl PaymentProof {
    pub fn has_file(&self) -> bool {
        !self.file_url.trim().is_empty()
    }
}

/// Admin rollup: one row per user that ever submitted a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProofUser {
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    pub pending_count: u32,
}

//! Runtime configuration, validated once at startup.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use url::Url;

use crate::admin::AdminAllowList;
use crate::error::{ClientError, ClientResult};
use crate::expiry::{DEFAULT_ANCHOR, DEFAULT_PERIOD_DAYS, RenewalSchedule};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SESSION_DB: &str = "vpnpanel.db";
pub const DEFAULT_BLOB_DIR: &str = "./blob-cache";
pub const DEFAULT_POLL_SECS: u64 = 5;

/// Unvalidated settings as they come from the environment or the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub api_url: String,
    pub admin: String,
    pub session_db: String,
    pub blob_dir: String,
    pub poll_secs: String,
    pub renewal_anchor: String,
    pub renewal_days: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            admin: String::new(),
            session_db: DEFAULT_SESSION_DB.into(),
            blob_dir: DEFAULT_BLOB_DIR.into(),
            poll_secs: DEFAULT_POLL_SECS.to_string(),
            renewal_anchor: DEFAULT_ANCHOR.into(),
            renewal_days: DEFAULT_PERIOD_DAYS.to_string(),
        }
    }
}

impl RawConfig {
    /// Read `VPNPANEL_*` variables through `lookup`. The allow-list falls
    /// back to `ADMIN` when `VPNPANEL_ADMIN` is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: lookup("VPNPANEL_API_URL").unwrap_or(defaults.api_url),
            admin: lookup("VPNPANEL_ADMIN")
                .or_else(|| lookup("ADMIN"))
                .unwrap_or(defaults.admin),
            session_db: lookup("VPNPANEL_SESSION_DB").unwrap_or(defaults.session_db),
            blob_dir: lookup("VPNPANEL_BLOB_DIR").unwrap_or(defaults.blob_dir),
            poll_secs: lookup("VPNPANEL_POLL_SECS").unwrap_or(defaults.poll_secs),
            renewal_anchor: lookup("VPNPANEL_RENEWAL_ANCHOR").unwrap_or(defaults.renewal_anchor),
            renewal_days: lookup("VPNPANEL_RENEWAL_DAYS").unwrap_or(defaults.renewal_days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub api_url: Url,
    pub admins: AdminAllowList,
    pub session_db: PathBuf,
    pub blob_dir: PathBuf,
    pub poll_interval: Duration,
    pub schedule: RenewalSchedule,
}

impl PortalConfig {
    pub fn parse(raw: &RawConfig) -> ClientResult<Self> {
        let api_url = Url::parse(raw.api_url.trim())
            .map_err(|e| ClientError::InvalidConfig(format!("bad API URL '{}': {}", raw.api_url, e)))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "API URL must be http or https, got '{}'",
                api_url.scheme()
            )));
        }

        let poll_secs: u64 = raw
            .poll_secs
            .trim()
            .parse()
            .map_err(|_| ClientError::InvalidConfig(format!("bad poll interval '{}'", raw.poll_secs)))?;
        if poll_secs == 0 {
            return Err(ClientError::InvalidConfig("poll interval must be at least 1 second".into()));
        }

        let renewal_days: i64 = raw
            .renewal_days
            .trim()
            .parse()
            .map_err(|_| ClientError::InvalidConfig(format!("bad renewal period '{}'", raw.renewal_days)))?;
        let anchor = RenewalSchedule::parse_anchor(&raw.renewal_anchor)?;
        let schedule = RenewalSchedule::new(anchor, ChronoDuration::days(renewal_days))?;

        if raw.session_db.trim().is_empty() {
            return Err(ClientError::InvalidConfig("session database path is empty".into()));
        }
        if raw.blob_dir.trim().is_empty() {
            return Err(ClientError::InvalidConfig("blob cache directory is empty".into()));
        }

        Ok(Self {
            api_url,
            admins: AdminAllowList::parse(&raw.admin),
            session_db: PathBuf::from(raw.session_db.trim()),
            blob_dir: PathBuf::from(raw.blob_dir.trim()),
            poll_interval: Duration::from_secs(poll_secs),
            schedule,
        })
    }
}

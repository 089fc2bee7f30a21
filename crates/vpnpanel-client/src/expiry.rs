//! Subscription expiry under indefinite auto-renewal.
//!
//! The subscription renews every `period` starting from a fixed anchor. The
//! current expiry is the first anchor-aligned boundary after `now`.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{ClientError, ClientResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub const DEFAULT_ANCHOR: &str = "2026-03-05T13:33:00";
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalSchedule {
    pub anchor: DateTime<Utc>,
    pub period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub expires_at: DateTime<Utc>,
    pub days_left: i64,
}

impl Expiry {
    pub fn formatted(&self) -> String {
        self.expires_at.format("%d %b %Y, %H:%M").to_string()
    }
}

impl RenewalSchedule {
    pub fn new(anchor: DateTime<Utc>, period: Duration) -> ClientResult<Self> {
        if period <= Duration::zero() {
            return Err(ClientError::InvalidConfig(
                "renewal period must be positive".into(),
            ));
        }
        Ok(Self { anchor, period })
    }

    /// Parse an anchor given either as RFC 3339 or as a naive timestamp
    /// (interpreted as UTC).
    pub fn parse_anchor(raw: &str) -> ClientResult<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .map_err(|e| ClientError::InvalidConfig(format!("bad renewal anchor '{}': {}", raw, e)))
    }

    pub fn expiry_at(&self, now: DateTime<Utc>) -> Expiry {
        compute_expiry(self.anchor, self.period, now)
    }
}

impl Default for RenewalSchedule {
    fn default() -> Self {
        Self {
            anchor: NaiveDateTime::parse_from_str(DEFAULT_ANCHOR, "%Y-%m-%dT%H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .unwrap_or_default(),
            period: Duration::days(DEFAULT_PERIOD_DAYS),
        }
    }
}

/// Pure expiry computation. `period` must be positive.
pub fn compute_expiry(anchor: DateTime<Utc>, period: Duration, now: DateTime<Utc>) -> Expiry {
    let expires_at = if now <= anchor {
        anchor
    } else {
        let elapsed_ms = (now - anchor).num_milliseconds();
        let period_ms = period.num_milliseconds().max(1);
        let periods_passed = elapsed_ms / period_ms + 1;
        anchor + Duration::milliseconds(periods_passed * period_ms)
    };

    let remaining_ms = (expires_at - now).num_milliseconds();
    let days_left = if remaining_ms <= 0 {
        0
    } else {
        (remaining_ms + DAY_MS - 1) / DAY_MS
    };

    Expiry {
        expires_at,
        days_left,
    }
}

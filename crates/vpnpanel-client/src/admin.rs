/// Telegram ids allowed to see the admin screens.
///
/// This only decides what the client shows. It is not authorization: the
/// admin endpoints have to enforce their own allow-list server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowList {
    ids: Vec<i64>,
}

impl AdminAllowList {
    /// Parse a configuration value such as `"[111, 222,333]"` or `"111,222"`.
    /// Tokens that are not finite integral numbers are dropped.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
        let inner = inner.strip_suffix(']').unwrap_or(inner);

        let ids = inner.split(',').filter_map(parse_id).collect();
        Self { ids }
    }

    pub fn is_admin_user_id(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn parse_id(token: &str) -> Option<i64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Ok(id) = token.parse::<i64>() {
        return Some(id);
    }

    // Accept "1e3", "222.0" and the like, but nothing that could never equal an id.
    let value = token.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return None;
    }
    Some(value as i64)
}

use crate::api::ApiToken;

pub const UNLIMITED_MARKER: &str = "Unlimited";
pub const NOT_AVAILABLE: &str = "N/A";

const TEN_MILLION: i64 = 10_000_000;
const TEN_THOUSAND: i64 = 10_000;
const THOUSAND: i64 = 1_000;

/// Human-readable quota, truncated to the largest tier that fits:
/// `千W` (ten million), `W` (ten thousand), `K` (thousand).
pub fn format_quota(quota: i64) -> String {
    if quota < 0 {
        return NOT_AVAILABLE.to_string();
    }
    if quota >= TEN_MILLION {
        return format!("{}千W", quota / TEN_MILLION);
    }
    if quota >= TEN_THOUSAND {
        return format!("{}W", quota / TEN_THOUSAND);
    }
    if quota >= THOUSAND {
        return format!("{}K", quota / THOUSAND);
    }
    quota.to_string()
}

pub fn token_quota(token: &ApiToken) -> String {
    if token.unlimited_quota {
        return UNLIMITED_MARKER.to_string();
    }
    format_quota(token.remaining_quota.saturating_sub(token.used_quota))
}

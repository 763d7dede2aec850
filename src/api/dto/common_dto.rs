//! Shared query parameters.

use serde::Deserialize;
use utoipa::IntoParams;

/// Largest page a list endpoint returns.
pub const MAX_LIMIT: usize = 500;

/// Page size used when `limit` is absent.
pub const DEFAULT_LIMIT: usize = 50;

/// Query parameters for `GET /rewards`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RewardQuery {
    /// Only rewards in this status (`pending`, `claimed`, `bought`, `burned`, `failed`).
    #[serde(default)]
    pub status: Option<String>,
    /// Maximum number of rows, newest first. Defaults to 50, max 500.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Query parameters for list endpoints without filters.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Maximum number of rows, newest first. Defaults to 50, max 500.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Clamps a requested page size to `1..=MAX_LIMIT`.
#[must_use]
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
        assert_eq!(clamp_limit(Some(7)), 7);
    }
}

//! Input validation for tool arguments
//!
//! Failures carry `VaultError::InvalidInput` so callers see a stable
//! `INVALID_INPUT` code instead of an opaque internal error.

use chrono::{DateTime, NaiveDate, Utc};

use crate::VaultError;

/// Query length cap: bounds embedding and FTS work per call.
pub const MAX_QUERY_LENGTH: usize = 8192;

/// Hard cap on a single result page.
pub const MAX_PAGE_LIMIT: usize = 100;

pub fn validate_query_length(query: &str) -> Result<(), VaultError> {
    if query.len() > MAX_QUERY_LENGTH {
        return Err(VaultError::InvalidInput(format!(
            "query too long: {} bytes (max {})",
            query.len(),
            MAX_QUERY_LENGTH
        )));
    }
    Ok(())
}

/// Clamp a requested page size to [1, MAX_PAGE_LIMIT], defaulting when unset.
pub fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_PAGE_LIMIT)
}

/// Parse a tool timestamp argument: RFC 3339, or a bare `YYYY-MM-DD` date
/// (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, VaultError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(VaultError::InvalidInput(format!(
        "invalid timestamp '{value}': expected RFC 3339 or YYYY-MM-DD"
    )))
}

/// Parse a category argument.
pub fn parse_category(value: &str) -> Result<crate::kind::Category, VaultError> {
    value
        .parse()
        .map_err(|e: String| VaultError::InvalidInput(e))
}

//! Pagination helpers shared by list queries.

/// Default page size for list queries.
pub const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// Hard upper bound on page size.
pub const MAX_SEARCH_LIMIT: i64 = 500;

/// Clamp a requested limit into `1..=max`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// Clamp a requested offset to be non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_when_absent() {
        assert_eq!(clamp_limit(None, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT), 50);
    }

    #[test]
    fn limit_clamped_to_bounds() {
        assert_eq!(clamp_limit(Some(0), 10, 100), 1);
        assert_eq!(clamp_limit(Some(1_000), 10, 100), 100);
    }

    #[test]
    fn negative_offset_becomes_zero() {
        assert_eq!(clamp_offset(Some(-5)), 0);
        assert_eq!(clamp_offset(Some(7)), 7);
    }
}

/// Largest page any list command will request from the store.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Resolve the row limit for a list command.
///
/// The subcommand's own `--limit` beats the global one, which beats the
/// configured default. Zero falls through to the next source and the result
/// is capped at [`MAX_LIST_LIMIT`].
#[must_use]
pub fn effective_limit(local: Option<u32>, global: Option<u32>, fallback: u32) -> u32 {
    [local, global]
        .into_iter()
        .flatten()
        .find(|limit| *limit > 0)
        .unwrap_or(fallback)
        .clamp(1, MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::{MAX_LIST_LIMIT, effective_limit};

    #[test]
    fn subcommand_limit_wins() {
        assert_eq!(effective_limit(Some(5), Some(10), 20), 5);
    }

    #[test]
    fn zero_falls_through_to_global() {
        assert_eq!(effective_limit(Some(0), Some(10), 20), 10);
    }

    #[test]
    fn configured_default_used_when_unset() {
        assert_eq!(effective_limit(None, None, 20), 20);
    }

    #[test]
    fn oversized_requests_are_capped() {
        assert_eq!(effective_limit(Some(10_000), None, 20), MAX_LIST_LIMIT);
    }
}

/// Get environment variable with TOLLGATE_ prefix, falling back to unprefixed version
///
/// This helper function checks for `TOLLGATE_{key}` first, then falls back to `{key}`
/// for compatibility with standard environment variable naming.
///
/// # Examples
///
/// ```rust
/// use tollgate::utils::get_env_with_prefix;
///
/// // Checks TOLLGATE_RETRY_ATTEMPTS first, then RETRY_ATTEMPTS
/// let attempts = get_env_with_prefix("RETRY_ATTEMPTS");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("TOLLGATE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        std::env::set_var("TOLLGATE_PREFIX_PROBE", "prefixed_value");
        assert_eq!(
            get_env_with_prefix("PREFIX_PROBE"),
            Some("prefixed_value".to_string())
        );
        std::env::remove_var("TOLLGATE_PREFIX_PROBE");

        std::env::set_var("FALLBACK_PROBE", "unprefixed_value");
        assert_eq!(
            get_env_with_prefix("FALLBACK_PROBE"),
            Some("unprefixed_value".to_string())
        );
        std::env::remove_var("FALLBACK_PROBE");

        assert_eq!(get_env_with_prefix("NON_EXISTENT_PROBE"), None);
    }
}

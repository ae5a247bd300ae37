/// Read `FORGE_{key}`, falling back to the bare `{key}`.
///
/// The fallback keeps platform-provided variables such as `PORT` and
/// `DATABASE_URL` working without renaming them.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("FORGE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse an environment value, ignoring it when it does not parse.
pub fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = get_env_with_prefix(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("FORGE_ENV_TEST_PREFIXED", "prefixed");
            std::env::set_var("ENV_TEST_PREFIXED", "bare");
        }
        assert_eq!(
            get_env_with_prefix("ENV_TEST_PREFIXED"),
            Some("prefixed".to_string())
        );

        unsafe {
            std::env::remove_var("FORGE_ENV_TEST_PREFIXED");
        }
        assert_eq!(
            get_env_with_prefix("ENV_TEST_PREFIXED"),
            Some("bare".to_string())
        );

        unsafe {
            std::env::remove_var("ENV_TEST_PREFIXED");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_PREFIXED"), None);
    }

    #[test]
    fn test_parse_env_skips_garbage() {
        unsafe {
            std::env::set_var("FORGE_ENV_TEST_NUMBER", "not-a-number");
        }
        assert_eq!(parse_env::<u64>("ENV_TEST_NUMBER"), None);

        unsafe {
            std::env::set_var("FORGE_ENV_TEST_NUMBER", " 42 ");
        }
        assert_eq!(parse_env::<u64>("ENV_TEST_NUMBER"), Some(42));

        unsafe {
            std::env::remove_var("FORGE_ENV_TEST_NUMBER");
        }
    }
}

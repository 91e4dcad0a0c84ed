const MAX_DURABLE_LEN: usize = 100;

/// `env.app.>` → `env-app-all`, `env.app.*` → `env-app-wildcard`, then the
/// remaining dots become dashes and anything outside `[A-Za-z0-9_-]` is
/// stripped, truncated to 100 characters.
pub fn durable_name_for_pattern(pattern: &str) -> String {
    let sanitized = pattern.replace(".>", "-all").replace(".*", "-wildcard").replace('.', "-");

    let filtered: String = sanitized.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-').collect();

    filtered.chars().take(MAX_DURABLE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcard_becomes_all() {
        assert_eq!(durable_name_for_pattern("dev.app.>"), "dev-app-all");
    }

    #[test]
    fn single_token_wildcard_becomes_wildcard() {
        assert_eq!(durable_name_for_pattern("dev.app.*.created"), "dev-app-wildcard-created");
    }

    #[test]
    fn plain_dots_become_dashes() {
        assert_eq!(durable_name_for_pattern("dev.app.orders.created"), "dev-app-orders-created");
    }

    #[test]
    fn disallowed_characters_are_stripped() {
        assert_eq!(durable_name_for_pattern("dev.app.orders!created"), "dev-app-orderscreated");
    }

    #[test]
    fn long_patterns_are_truncated() {
        let pattern = format!("dev.app.{}", "x".repeat(200));
        assert_eq!(durable_name_for_pattern(&pattern).len(), MAX_DURABLE_LEN);
    }
}

use omniagent_core::config::GatewayConfig;

/// Check the presented credential against `gateway.token`.
///
/// With no token configured every request passes. Otherwise the bearer
/// header is checked first, then the `?token=` query parameter.
pub fn validate_auth(config: &GatewayConfig, bearer: Option<&str>, query_token: Option<&str>) -> bool {
    let Some(expected) = config.token.as_deref().filter(|t| !t.is_empty()) else {
        return true;
    };
    match bearer {
        Some(presented) => presented == expected,
        None => query_token == Some(expected),
    }
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    for pair in query.split('&') {
        if let Some(val) = pair.strip_prefix("token=") {
            return Some(val);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:8000".to_string(),
            token: token.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_no_token_always_passes() {
        let config = gateway(None);
        assert!(validate_auth(&config, None, None));
        assert!(validate_auth(&config, Some("anything"), None));
        assert!(validate_auth(&gateway(Some("")), None, None));
    }

    #[test]
    fn test_token_auth() {
        let config = gateway(Some("secret"));
        assert!(!validate_auth(&config, None, None));
        assert!(!validate_auth(&config, Some("wrong"), None));
        assert!(validate_auth(&config, Some("secret"), None));
        assert!(validate_auth(&config, None, Some("secret")));
        // A wrong bearer is not rescued by the query string
        assert!(!validate_auth(&config, Some("wrong"), Some("secret")));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_query("token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("user_id=u&token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("user_id=u"), None);
    }
}

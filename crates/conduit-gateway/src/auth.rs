use conduit_core::config::GatewayConfig;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub name: String,
}

/// Bearer validation: api_keys -> legacy token -> anonymous.
///
/// Anonymous access is only granted when neither a token nor any API key is
/// configured. Returns `None` on auth failure.
pub fn validate_auth(config: &GatewayConfig, bearer: Option<&str>) -> Option<AuthResult> {
    let auth_configured = config.token.is_some() || !config.api_keys.is_empty();

    let Some(bearer_val) = bearer else {
        return (!auth_configured).then(|| AuthResult {
            name: "anonymous".into(),
        });
    };

    for ak in &config.api_keys {
        if ak.key == bearer_val {
            return Some(AuthResult {
                name: ak.name.clone(),
            });
        }
    }
    if config.token.as_deref() == Some(bearer_val) {
        return Some(AuthResult {
            name: "token".into(),
        });
    }
    None // Bearer provided but no match
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::config::ApiKeyConfig;

    fn gateway(token: Option<&str>, api_keys: Vec<ApiKeyConfig>) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:10101".to_string(),
            token: token.map(|s| s.to_string()),
            api_keys,
        }
    }

    #[test]
    fn test_no_auth_configured() {
        let config = gateway(None, vec![]);
        assert_eq!(validate_auth(&config, None).unwrap().name, "anonymous");
        // Bearer with no match
        assert!(validate_auth(&config, Some("anything")).is_none());
    }

    #[test]
    fn test_token_auth() {
        let config = gateway(Some("secret"), vec![]);
        assert!(validate_auth(&config, None).is_none());
        assert!(validate_auth(&config, Some("wrong")).is_none());
        assert_eq!(validate_auth(&config, Some("secret")).unwrap().name, "token");
    }

    #[test]
    fn test_bearer_api_key() {
        let keys = vec![ApiKeyConfig {
            name: "planner-ui".to_string(),
            key: "ck_test123".to_string(),
        }];
        let config = gateway(Some("legacy"), keys);

        let auth = validate_auth(&config, Some("ck_test123")).unwrap();
        assert_eq!(auth.name, "planner-ui");
        assert!(validate_auth(&config, Some("legacy")).is_some());
        assert!(validate_auth(&config, Some("wrong")).is_none());
        assert!(validate_auth(&config, None).is_none());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("Basic abc"), None);
    }
}

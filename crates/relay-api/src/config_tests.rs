//! Tests for service configuration defaults and validation.

use super::*;

fn valid_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.security.internal_token = "token".to_string();
    config.security.github_webhook_secret = "gh-secret".to_string();
    config.security.zammad_webhook_secret = "zd-secret".to_string();
    config.github.token = "ghp_test".to_string();
    config.discord.bot_token = "bot-token".to_string();
    config
}

mod default_tests {
    use super::*;

    #[test]
    fn test_empty_document_deserializes_with_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.delivery.poll_interval_seconds, 60);
        assert_eq!(config.delivery.send_timeout_seconds, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.routing.file.is_none());
        assert!(config.github.graphql_endpoint.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"server": {"host": "127.0.0.1", "port": 9000, "shutdown_timeout_seconds": 5}}"#)
                .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.delivery.poll_interval_seconds, 60);
    }

    #[test]
    fn test_drainer_config_conversion() {
        let config = ServiceConfig::default();
        let drainer = config.delivery.drainer_config();
        assert_eq!(drainer.poll_interval, Duration::from_secs(60));
        assert_eq!(drainer.send_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_logging_level_drives_the_filter_directives() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"logging": {"level": "debug"}}"#).unwrap();

        let directives = config.logging.filter_directives();
        assert!(directives.contains("relay_service=debug"));
        assert!(directives.contains("relay_api=debug"));
        assert!(directives.contains("relay_core=debug"));
    }

    #[test]
    fn test_webhook_secrets_conversion() {
        let config = valid_config();
        let secrets = config.security.webhook_secrets();
        assert_eq!(secrets.internal_token, "token");
        assert_eq!(secrets.github_secret, "gh-secret");
        assert_eq!(secrets.zammad_secret, "zd-secret");
    }
}

mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_lists_every_missing_secret() {
        let err = ServiceConfig::default().validate().unwrap_err();
        let joined = err.errors.join("\n");

        assert!(joined.contains("security.internal_token"));
        assert!(joined.contains("security.github_webhook_secret"));
        assert!(joined.contains("security.zammad_webhook_secret"));
        assert!(joined.contains("github.token"));
        assert!(joined.contains("discord.bot_token"));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut config = valid_config();
        config.server.port = 0;
        let err = config.validate().unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("server.port")));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut config = valid_config();
        config.delivery.poll_interval_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err
            .errors
            .iter()
            .any(|e| e.contains("delivery.poll_interval_seconds")));
    }
}

mod redaction_tests {
    use super::*;

    #[test]
    fn test_debug_never_exposes_secret_values() {
        let rendered = format!("{:?}", valid_config());
        assert!(!rendered.contains("gh-secret"));
        assert!(!rendered.contains("zd-secret"));
        assert!(!rendered.contains("ghp_test"));
        assert!(!rendered.contains("bot-token"));
        assert!(rendered.contains("***"));
    }
}

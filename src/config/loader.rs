//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LimitAction, RuleEngineMode, RulePhase, RuleTarget};
    use crate::engine::Action;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.engine.rule_engine, RuleEngineMode::On);
        assert_eq!(config.engine.request_body_limit, 128 * 1024);
        assert!(config.paths.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [upstream]
            address = "127.0.0.1:4000"

            [engine]
            rule_engine = "detection_only"
            request_body_limit = 1024
            request_body_limit_action = "reject"

            [[engine.rules]]
            id = 100
            phase = "request_headers"
            target = "uri"
            pattern = "(?i)union\\s+select"
            status = 406
            action = "drop"
            msg = "SQL injection"

            [[paths]]
            path = "/health"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.address, "127.0.0.1:4000");
        assert_eq!(config.engine.rule_engine, RuleEngineMode::DetectionOnly);
        assert_eq!(config.engine.request_body_limit_action, LimitAction::Reject);

        let rule = &config.engine.rules[0];
        assert_eq!(rule.phase, RulePhase::RequestHeaders);
        assert_eq!(rule.target, RuleTarget::Uri);
        assert_eq!(rule.status, 406);
        assert_eq!(rule.action, Action::Drop);

        let path = &config.paths[0];
        assert!(!path.enabled);
        assert!(path.check_response_body);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = parse_config("[engine]\nrule_engine = \"sometimes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_errors_are_collected() {
        let err = parse_config(
            r#"
            [engine]
            request_body_limit = 0

            [[paths]]
            path = "no-slash"
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/waf-gate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Rule patterns compile, rule ids are unique, statuses are real HTTP codes
//! - Validate value ranges (limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `engine.rules[2].pattern`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_addr(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let engine = &config.engine;
    if engine.request_body_limit == 0 {
        errors.push(ValidationError::new("engine.request_body_limit", "must be greater than 0"));
    }
    if engine.response_body_limit == 0 {
        errors.push(ValidationError::new("engine.response_body_limit", "must be greater than 0"));
    }

    let mut seen_ids = HashSet::new();
    for (i, rule) in engine.rules.iter().enumerate() {
        if !seen_ids.insert(rule.id) {
            errors.push(ValidationError::new(
                format!("engine.rules[{i}].id"),
                format!("duplicate rule id {}", rule.id),
            ));
        }
        if !(100..=599).contains(&rule.status) {
            errors.push(ValidationError::new(
                format!("engine.rules[{i}].status"),
                format!("{} is not an HTTP status code", rule.status),
            ));
        }
        if let Err(e) = regex::Regex::new(&rule.pattern) {
            errors.push(ValidationError::new(format!("engine.rules[{i}].pattern"), e.to_string()));
        }
    }

    for (i, entry) in config.paths.iter().enumerate() {
        if !entry.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("paths[{i}].path"),
                format!("{:?} must start with '/'", entry.path),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{value:?} is not a socket address")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PathPolicyConfig, RuleConfig, RulePhase, RuleTarget};
    use crate::engine::Action;

    fn rule(id: u32, pattern: &str, status: u16) -> RuleConfig {
        RuleConfig {
            id,
            phase: RulePhase::RequestHeaders,
            target: RuleTarget::Uri,
            pattern: pattern.to_string(),
            status,
            action: Action::Deny,
            msg: String::new(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn bad_rules_are_all_reported() {
        let mut config = GatewayConfig::default();
        config.engine.rules = vec![rule(1, "ok", 403), rule(1, "(unclosed", 42)];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["engine.rules[1].id", "engine.rules[1].status", "engine.rules[1].pattern"]
        );
    }

    #[test]
    fn relative_path_and_bad_address_rejected() {
        let mut config = GatewayConfig::default();
        config.upstream.address = "not an address".into();
        config.paths.push(PathPolicyConfig {
            path: "api".into(),
            enabled: true,
            check_request_headers: true,
            check_request_body: true,
            check_response_headers: true,
            check_response_body: true,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().starts_with("upstream.address:"));
    }

    #[test]
    fn admin_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.admin.bind_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}

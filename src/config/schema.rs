//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::engine::Action;

/// Root configuration for the inspecting gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream that inspected traffic is forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Inspection engine settings and rules.
    pub engine: EngineConfig,

    /// Paths pre-registered before traffic arrives.
    pub paths: Vec<PathPolicyConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Whether rules run, and whether their matches block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleEngineMode {
    #[default]
    On,
    Off,
    /// Rules are evaluated and logged but never interrupt.
    DetectionOnly,
}

/// What happens when a body exceeds its buffering limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimitAction {
    /// Interrupt the transaction.
    Reject,
    /// Inspect only what fits in the buffer.
    #[default]
    ProcessPartial,
}

/// Inspection engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rule_engine: RuleEngineMode,

    /// Allow the engine to buffer and inspect request bodies.
    pub request_body_access: bool,

    /// Request body buffering limit in bytes.
    pub request_body_limit: usize,

    pub request_body_limit_action: LimitAction,

    /// Allow the engine to buffer and inspect response bodies.
    pub response_body_access: bool,

    /// Response body inspection limit in bytes.
    pub response_body_limit: usize,

    pub response_body_limit_action: LimitAction,

    /// Response Content-Types whose bodies are processed.
    pub response_body_mime_types: Vec<String>,

    /// Detection rules, evaluated in declaration order.
    pub rules: Vec<RuleConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_engine: RuleEngineMode::On,
            request_body_access: true,
            request_body_limit: 128 * 1024, // 128KB
            request_body_limit_action: LimitAction::ProcessPartial,
            response_body_access: true,
            response_body_limit: 512 * 1024, // 512KB
            response_body_limit_action: LimitAction::ProcessPartial,
            response_body_mime_types: vec![
                "text/plain".to_string(),
                "text/html".to_string(),
                "application/json".to_string(),
            ],
            rules: Vec::new(),
        }
    }
}

/// Transaction phase a rule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePhase {
    Connection,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

/// Transaction data a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    RemoteAddr,
    Uri,
    Method,
    RequestHeaders,
    RequestBody,
    ResponseStatus,
    ResponseHeaders,
    ResponseBody,
}

/// A single detection rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Unique rule identifier, reported in interruptions.
    pub id: u32,

    pub phase: RulePhase,

    pub target: RuleTarget,

    /// Regular expression matched against the target.
    pub pattern: String,

    /// Status returned when the rule blocks.
    #[serde(default = "default_rule_status")]
    pub status: u16,

    #[serde(default)]
    pub action: Action,

    /// Optional description for audit logs.
    #[serde(default)]
    pub msg: String,
}

fn default_rule_status() -> u16 {
    403
}

/// Pre-registered inspection policy for one path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathPolicyConfig {
    /// Request path (exact match).
    pub path: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub check_request_headers: bool,

    #[serde(default = "default_true")]
    pub check_request_body: bool,

    #[serde(default = "default_true")]
    pub check_response_headers: bool,

    #[serde(default = "default_true")]
    pub check_response_body: bool,
}

fn default_true() -> bool {
    true
}

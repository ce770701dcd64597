//! Reference inspection engine.
//!
//! A small regex rule engine implementing the [`Transaction`] contract from
//! configuration. It exists so the gateway runs without an external engine
//! and so the interception pipeline can be exercised end to end.
//!
//! # Design Decisions
//! - Request bodies are buffered up to the limit; beyond it the engine
//!   either rejects (413) or accepts a short write and inspects the prefix
//! - Response bodies are always buffered whole, since the gateway emits the
//!   buffered copy; only the first `response_body_limit` bytes are inspected
//! - In detection-only mode matches are logged but never interrupt

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use crate::config::schema::{EngineConfig, LimitAction, RuleEngineMode, RulePhase, RuleTarget};
use crate::engine::rules::RuleSet;
use crate::engine::{
    Action, BodyWrite, EngineError, InspectionEngine, Interruption, Transaction,
};

/// Engine-internal rule id used for limit verdicts.
const LIMIT_RULE_ID: u32 = 0;

#[derive(Debug)]
struct Settings {
    mode: RuleEngineMode,
    request_body_access: bool,
    request_body_limit: usize,
    request_body_limit_action: LimitAction,
    response_body_access: bool,
    response_body_limit: usize,
    response_body_limit_action: LimitAction,
    response_mime_types: Vec<String>,
    rules: RuleSet,
}

/// Rule engine built from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct BasicEngine {
    settings: Arc<Settings>,
}

impl BasicEngine {
    /// Compile the configured rules. Fails on the first invalid pattern.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let rules = RuleSet::compile(&config.rules)?;
        tracing::info!(
            rules = rules.len(),
            mode = ?config.rule_engine,
            "Inspection engine initialised"
        );

        Ok(Self {
            settings: Arc::new(Settings {
                mode: config.rule_engine,
                request_body_access: config.request_body_access,
                request_body_limit: config.request_body_limit,
                request_body_limit_action: config.request_body_limit_action,
                response_body_access: config.response_body_access,
                response_body_limit: config.response_body_limit,
                response_body_limit_action: config.response_body_limit_action,
                response_mime_types: config
                    .response_body_mime_types
                    .iter()
                    .map(|m| m.to_ascii_lowercase())
                    .collect(),
                rules,
            }),
        })
    }
}

impl InspectionEngine for BasicEngine {
    fn new_transaction(&self) -> Box<dyn Transaction> {
        Box::new(BasicTransaction::new(Arc::clone(&self.settings)))
    }
}

/// Per-request state of the reference engine.
#[derive(Debug)]
pub struct BasicTransaction {
    id: String,
    settings: Arc<Settings>,
    remote_addr: String,
    server_name: String,
    uri: String,
    method: String,
    protocol: String,
    request_headers: Vec<(String, String)>,
    request_body: BytesMut,
    response_status: u16,
    response_headers: Vec<(String, String)>,
    response_content_type: Option<String>,
    response_body: BytesMut,
    interruption: Option<Interruption>,
    matched: Vec<u32>,
    closed: bool,
}

impl BasicTransaction {
    fn new(settings: Arc<Settings>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            settings,
            remote_addr: String::new(),
            server_name: String::new(),
            uri: String::new(),
            method: String::new(),
            protocol: String::new(),
            request_headers: Vec::new(),
            request_body: BytesMut::new(),
            response_status: 0,
            response_headers: Vec::new(),
            response_content_type: None,
            response_body: BytesMut::new(),
            interruption: None,
            matched: Vec::new(),
            closed: false,
        }
    }

    fn target_values(&self, target: RuleTarget) -> Vec<String> {
        match target {
            RuleTarget::RemoteAddr => vec![self.remote_addr.clone()],
            RuleTarget::Uri => vec![self.uri.clone()],
            RuleTarget::Method => vec![self.method.clone()],
            RuleTarget::RequestHeaders => header_lines(&self.request_headers),
            RuleTarget::RequestBody => {
                vec![String::from_utf8_lossy(&self.request_body).into_owned()]
            }
            RuleTarget::ResponseStatus => vec![self.response_status.to_string()],
            RuleTarget::ResponseHeaders => header_lines(&self.response_headers),
            RuleTarget::ResponseBody => {
                let end = self.response_body.len().min(self.settings.response_body_limit);
                vec![String::from_utf8_lossy(&self.response_body[..end]).into_owned()]
            }
        }
    }

    /// Run every rule of `phase`; the first blocking match becomes the verdict.
    fn evaluate(&mut self, phase: RulePhase) -> Option<Interruption> {
        if self.interruption.is_some() {
            return self.interruption.clone();
        }
        if self.settings.mode == RuleEngineMode::Off {
            return None;
        }

        let settings = Arc::clone(&self.settings);
        for rule in settings.rules.for_phase(phase) {
            let values = self.target_values(rule.target);
            let Some(hit) = values.iter().find(|v| rule.is_match(v)) else {
                continue;
            };

            self.matched.push(rule.id);
            let verdict = rule.interruption(hit);
            if settings.mode == RuleEngineMode::DetectionOnly {
                tracing::info!(
                    transaction_id = %self.id,
                    rule_id = rule.id,
                    phase = ?phase,
                    "Rule matched in detection-only mode"
                );
                continue;
            }

            tracing::debug!(
                transaction_id = %self.id,
                rule_id = rule.id,
                phase = ?phase,
                status = verdict.status,
                "Rule matched"
            );
            self.interruption = Some(verdict.clone());
            return Some(verdict);
        }
        None
    }

    fn limit_interruption(&mut self, status: u16, data: &str) -> Interruption {
        let it = Interruption {
            rule_id: LIMIT_RULE_ID,
            status,
            action: Action::Deny,
            data: data.to_string(),
        };
        if self.settings.mode == RuleEngineMode::On {
            self.interruption = Some(it.clone());
        }
        it
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

fn header_lines(headers: &[(String, String)]) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name.to_ascii_lowercase(), value))
        .collect()
}

impl Transaction for BasicTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_host: &str,
        server_port: u16,
    ) -> Option<Interruption> {
        self.remote_addr = client_ip.to_string();
        tracing::trace!(
            transaction_id = %self.id,
            client_ip,
            client_port,
            server_host,
            server_port,
            "Connection recorded"
        );
        self.evaluate(RulePhase::Connection)
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.uri = uri.to_string();
        self.method = method.to_string();
        self.protocol = protocol.to_string();
    }

    fn set_server_name(&mut self, host: &str) {
        self.server_name = host.to_string();
    }

    fn add_request_header(&mut self, name: &str, value: &str) {
        self.request_headers.push((name.to_string(), value.to_string()));
    }

    fn process_request_headers(&mut self) -> Option<Interruption> {
        self.evaluate(RulePhase::RequestHeaders)
    }

    fn is_request_body_accessible(&self) -> bool {
        self.settings.mode != RuleEngineMode::Off && self.settings.request_body_access
    }

    fn write_request_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError> {
        self.ensure_open()?;
        if let Some(it) = &self.interruption {
            return Ok(BodyWrite {
                interruption: Some(it.clone()),
                accepted: 0,
            });
        }
        if !self.is_request_body_accessible() {
            return Ok(BodyWrite::default());
        }

        let room = self
            .settings
            .request_body_limit
            .saturating_sub(self.request_body.len());
        if data.len() <= room {
            self.request_body.extend_from_slice(data);
            return Ok(BodyWrite {
                interruption: None,
                accepted: data.len(),
            });
        }

        match self.settings.request_body_limit_action {
            LimitAction::Reject => {
                let it = self.limit_interruption(413, "request body limit exceeded");
                Ok(BodyWrite {
                    interruption: self.interruption.as_ref().map(|_| it),
                    accepted: 0,
                })
            }
            LimitAction::ProcessPartial => {
                self.request_body.extend_from_slice(&data[..room]);
                Ok(BodyWrite {
                    interruption: None,
                    accepted: room,
                })
            }
        }
    }

    fn request_body_reader(&mut self) -> Result<Bytes, EngineError> {
        self.ensure_open()?;
        Ok(Bytes::copy_from_slice(&self.request_body))
    }

    fn process_request_body(&mut self) -> Result<Option<Interruption>, EngineError> {
        self.ensure_open()?;
        Ok(self.evaluate(RulePhase::RequestBody))
    }

    fn add_response_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            let mime = value.split(';').next().unwrap_or_default().trim();
            self.response_content_type = Some(mime.to_ascii_lowercase());
        }
        self.response_headers.push((name.to_string(), value.to_string()));
    }

    fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<Interruption> {
        self.response_status = status;
        if !protocol.is_empty() {
            self.protocol = protocol.to_string();
        }
        self.evaluate(RulePhase::ResponseHeaders)
    }

    fn is_response_body_accessible(&self) -> bool {
        self.settings.mode != RuleEngineMode::Off && self.settings.response_body_access
    }

    fn is_response_body_processable(&self) -> bool {
        self.response_content_type
            .as_ref()
            .is_some_and(|ct| self.settings.response_mime_types.iter().any(|m| m == ct))
    }

    fn write_response_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError> {
        self.ensure_open()?;
        if let Some(it) = &self.interruption {
            return Ok(BodyWrite {
                interruption: Some(it.clone()),
                accepted: 0,
            });
        }
        if !self.is_response_body_accessible() {
            return Ok(BodyWrite::default());
        }

        let over_limit =
            self.response_body.len() + data.len() > self.settings.response_body_limit;
        if over_limit && self.settings.response_body_limit_action == LimitAction::Reject {
            let it = self.limit_interruption(500, "response body limit exceeded");
            if self.interruption.is_some() {
                return Ok(BodyWrite {
                    interruption: Some(it),
                    accepted: 0,
                });
            }
        }

        self.response_body.extend_from_slice(data);
        Ok(BodyWrite {
            interruption: None,
            accepted: data.len(),
        })
    }

    fn process_response_body(&mut self) -> Result<Option<Interruption>, EngineError> {
        self.ensure_open()?;
        Ok(self.evaluate(RulePhase::ResponseBody))
    }

    fn response_body_reader(&mut self) -> Result<Bytes, EngineError> {
        self.ensure_open()?;
        Ok(Bytes::copy_from_slice(&self.response_body))
    }

    fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    fn is_rule_engine_off(&self) -> bool {
        self.settings.mode == RuleEngineMode::Off
    }

    fn process_logging(&mut self) {
        if self.matched.is_empty() && self.interruption.is_none() {
            tracing::debug!(transaction_id = %self.id, uri = %self.uri, "Transaction clean");
            return;
        }

        tracing::warn!(
            target: "waf_gate::audit",
            transaction_id = %self.id,
            client = %self.remote_addr,
            server = %self.server_name,
            method = %self.method,
            uri = %self.uri,
            protocol = %self.protocol,
            matched_rules = ?self.matched,
            blocked = self.interruption.is_some(),
            status = self.interruption.as_ref().map(|i| i.status),
            "Transaction matched rules"
        );
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.closed = true;
        self.request_body = BytesMut::new();
        self.response_body = BytesMut::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RuleConfig;

    fn engine_with(rules: Vec<RuleConfig>, tweak: impl FnOnce(&mut EngineConfig)) -> BasicEngine {
        let mut config = EngineConfig {
            rules,
            ..EngineConfig::default()
        };
        tweak(&mut config);
        BasicEngine::from_config(&config).unwrap()
    }

    fn rule(id: u32, phase: RulePhase, target: RuleTarget, pattern: &str) -> RuleConfig {
        RuleConfig {
            id,
            phase,
            target,
            pattern: pattern.to_string(),
            status: 403,
            action: Action::Deny,
            msg: String::new(),
        }
    }

    #[test]
    fn header_rule_interrupts() {
        let engine = engine_with(
            vec![rule(100, RulePhase::RequestHeaders, RuleTarget::RequestHeaders, "(?i)user-agent: sqlmap")],
            |_| {},
        );
        let mut tx = engine.new_transaction();
        tx.add_request_header("User-Agent", "sqlmap/1.7");

        let it = tx.process_request_headers().expect("should interrupt");
        assert_eq!(it.rule_id, 100);
        assert!(tx.is_interrupted());
    }

    #[test]
    fn detection_only_never_interrupts() {
        let engine = engine_with(
            vec![rule(1, RulePhase::RequestHeaders, RuleTarget::Uri, "admin")],
            |c| c.rule_engine = RuleEngineMode::DetectionOnly,
        );
        let mut tx = engine.new_transaction();
        tx.process_uri("/admin", "GET", "1.1");

        assert!(tx.process_request_headers().is_none());
        assert!(!tx.is_interrupted());
    }

    #[test]
    fn request_body_partial_write_stops_at_limit() {
        let engine = engine_with(vec![], |c| c.request_body_limit = 4);
        let mut tx = engine.new_transaction();

        let first = tx.write_request_body(b"abc").unwrap();
        assert_eq!(first.accepted, 3);
        let second = tx.write_request_body(b"defg").unwrap();
        assert_eq!(second.accepted, 1);
        assert!(second.interruption.is_none());
        assert_eq!(tx.request_body_reader().unwrap(), Bytes::from_static(b"abcd"));
    }

    #[test]
    fn request_body_reject_interrupts_with_413() {
        let engine = engine_with(vec![], |c| {
            c.request_body_limit = 2;
            c.request_body_limit_action = LimitAction::Reject;
        });
        let mut tx = engine.new_transaction();

        let write = tx.write_request_body(b"abc").unwrap();
        assert_eq!(write.interruption.map(|i| i.status), Some(413));
    }

    #[test]
    fn response_processable_by_mime_type() {
        let engine = engine_with(vec![], |_| {});
        let mut tx = engine.new_transaction();
        assert!(!tx.is_response_body_processable());

        tx.add_response_header("Content-Type", "application/json; charset=utf-8");
        assert!(tx.is_response_body_processable());
    }

    #[test]
    fn response_body_rule_sees_buffered_bytes() {
        let engine = engine_with(
            vec![rule(5, RulePhase::ResponseBody, RuleTarget::ResponseBody, "secret")],
            |_| {},
        );
        let mut tx = engine.new_transaction();
        tx.write_response_body(b"top ").unwrap();
        tx.write_response_body(b"secret").unwrap();

        let it = tx.process_response_body().unwrap();
        assert_eq!(it.map(|i| i.rule_id), Some(5));
    }

    #[test]
    fn engine_off_skips_rules_and_bodies() {
        let engine = engine_with(
            vec![rule(1, RulePhase::RequestHeaders, RuleTarget::Uri, ".*")],
            |c| c.rule_engine = RuleEngineMode::Off,
        );
        let mut tx = engine.new_transaction();
        assert!(tx.is_rule_engine_off());
        assert!(!tx.is_request_body_accessible());
        assert!(tx.process_request_headers().is_none());
    }

    #[test]
    fn close_twice_fails() {
        let engine = engine_with(vec![], |_| {});
        let mut tx = engine.new_transaction();
        tx.close().unwrap();
        assert!(matches!(tx.close(), Err(EngineError::Closed)));
    }
}

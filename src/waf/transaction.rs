//! Per-request transaction lifecycle.
//!
//! # State Machine
//! ```text
//! Opened → Connection → Uri → RequestHeaders → RequestBody
//!        → [handler] → ResponseHeaders → ResponseBody → Closed
//! ```
//! Every transition goes through [`TransactionController::advance`], which
//! refuses to move on once the engine has interrupted. Closure (logging +
//! release) happens exactly once, from `Drop` if nobody closed earlier, so
//! early returns, panics and cancelled futures all close the transaction.

use std::fmt;

use axum::http::{header, HeaderMap, Method, StatusCode, Uri, Version};
use bytes::Bytes;

use crate::engine::{EngineError, InspectionEngine, Interruption, Transaction};
use crate::waf::WafError;

/// Server port reported to the engine in the connection phase.
///
/// Fixed rather than detected: rule sets assume an HTTPS-fronted
/// deployment regardless of the listener's real scheme and port.
pub const SERVER_PORT: u16 = 443;

/// Transaction phases, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Opened,
    Connection,
    Uri,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
    Closed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Opened => "opened",
            Phase::Connection => "connection",
            Phase::Uri => "uri",
            Phase::RequestHeaders => "request_headers",
            Phase::RequestBody => "request_body",
            Phase::ResponseHeaders => "response_headers",
            Phase::ResponseBody => "response_body",
            Phase::Closed => "closed",
        }
    }

    /// Whether the handler has already produced a response at this phase.
    pub fn is_response_side(&self) -> bool {
        matches!(self, Phase::ResponseHeaders | Phase::ResponseBody)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a peer address into host and port.
///
/// Splits on the last colon. `[v6]:port` loses its brackets, a missing or
/// unparsable port becomes 0, and an unbracketed address with several
/// colons is taken to be a bare IPv6 host.
pub fn split_remote_addr(addr: &str) -> (String, u16) {
    let Some(idx) = addr.rfind(':') else {
        return (addr.to_string(), 0);
    };

    let host = &addr[..idx];
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return (inner.to_string(), addr[idx + 1..].parse().unwrap_or(0));
    }
    if host.contains(':') {
        let bare = addr.trim_start_matches('[').trim_end_matches(']');
        return (bare.to_string(), 0);
    }

    (host.to_string(), addr[idx + 1..].parse().unwrap_or(0))
}

/// Protocol identifier as sent on the wire, e.g. `HTTP/1.1`.
pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Protocol version without the `HTTP/` prefix, e.g. `1.1`.
pub fn protocol_version(version: Version) -> &'static str {
    let name = protocol_name(version);
    name.strip_prefix("HTTP/").unwrap_or(name)
}

/// Owns one engine transaction and drives it through the phases.
pub struct TransactionController {
    tx: Box<dyn Transaction>,
    phase: Phase,
}

impl TransactionController {
    pub fn open(engine: &dyn InspectionEngine) -> Self {
        let tx = engine.new_transaction();
        tracing::trace!(transaction_id = %tx.id(), "Transaction opened");
        Self {
            tx,
            phase: Phase::Opened,
        }
    }

    pub fn id(&self) -> &str {
        self.tx.id()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_rule_engine_off(&self) -> bool {
        self.tx.is_rule_engine_off()
    }

    pub fn interruption(&self) -> Option<&Interruption> {
        self.tx.interruption()
    }

    pub fn is_interrupted(&self) -> bool {
        self.tx.is_interrupted()
    }

    /// Fail if the engine has already produced a verdict.
    pub fn ensure_not_interrupted(&self) -> Result<(), WafError> {
        match self.tx.interruption() {
            Some(it) => Err(WafError::Interrupted {
                phase: self.phase,
                interruption: it.clone(),
            }),
            None => Ok(()),
        }
    }

    fn advance(&mut self, next: Phase) -> Result<(), WafError> {
        debug_assert!(
            next >= self.phase,
            "phase {next} cannot follow {}",
            self.phase
        );
        self.ensure_not_interrupted()?;
        self.phase = next;
        Ok(())
    }

    fn gate(&self, verdict: Option<Interruption>) -> Result<(), WafError> {
        match verdict {
            Some(interruption) => Err(WafError::Interrupted {
                phase: self.phase,
                interruption,
            }),
            None => Ok(()),
        }
    }

    fn engine_error(&self, source: EngineError) -> WafError {
        WafError::Engine {
            phase: self.phase,
            source,
        }
    }

    pub fn process_connection(&mut self, remote_addr: &str, server_host: &str) -> Result<(), WafError> {
        self.advance(Phase::Connection)?;
        let (client, client_port) = split_remote_addr(remote_addr);
        let verdict = self
            .tx
            .process_connection(&client, client_port, server_host, SERVER_PORT);
        self.gate(verdict)
    }

    pub fn process_uri(&mut self, uri: &Uri, method: &Method, version: Version) -> Result<(), WafError> {
        self.advance(Phase::Uri)?;
        self.tx
            .process_uri(&uri.to_string(), method.as_str(), protocol_version(version));
        Ok(())
    }

    /// Feed every request header (plus a synthesized `Host` when the host
    /// only arrived in the URI authority) and evaluate them.
    pub fn process_request_headers(&mut self, headers: &HeaderMap, host: &str) -> Result<(), WafError> {
        self.advance(Phase::RequestHeaders)?;

        for (name, value) in headers {
            self.tx
                .add_request_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        if !host.is_empty() {
            if !headers.contains_key(header::HOST) {
                self.tx.add_request_header("Host", host);
            }
            self.tx.set_server_name(host);
        }

        let verdict = self.tx.process_request_headers();
        self.gate(verdict)
    }

    pub fn is_request_body_accessible(&self) -> bool {
        self.tx.is_request_body_accessible()
    }

    /// Buffer a request body chunk. Returns how many bytes the engine took.
    pub fn write_request_body(&mut self, data: &[u8]) -> Result<usize, WafError> {
        self.advance(Phase::RequestBody)?;
        let write = self
            .tx
            .write_request_body(data)
            .map_err(|e| self.engine_error(e))?;
        self.gate(write.interruption)?;
        Ok(write.accepted)
    }

    pub fn request_body_reader(&mut self) -> Result<Bytes, WafError> {
        self.advance(Phase::RequestBody)?;
        self.tx
            .request_body_reader()
            .map_err(|e| self.engine_error(e))
    }

    pub fn process_request_body(&mut self) -> Result<(), WafError> {
        self.advance(Phase::RequestBody)?;
        let verdict = self
            .tx
            .process_request_body()
            .map_err(|e| self.engine_error(e))?;
        self.gate(verdict)
    }

    pub fn process_response_headers(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        protocol: &str,
    ) -> Result<(), WafError> {
        self.advance(Phase::ResponseHeaders)?;
        for (name, value) in headers {
            self.tx
                .add_response_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        let verdict = self.tx.process_response_headers(status.as_u16(), protocol);
        self.gate(verdict)
    }

    pub fn is_response_body_accessible(&self) -> bool {
        self.tx.is_response_body_accessible()
    }

    pub fn is_response_body_processable(&self) -> bool {
        self.tx.is_response_body_processable()
    }

    /// Hand a response body chunk to the engine's accumulator.
    pub fn write_response_body(&mut self, data: &[u8]) -> Result<usize, WafError> {
        self.advance(Phase::ResponseBody)?;
        let write = self
            .tx
            .write_response_body(data)
            .map_err(|e| self.engine_error(e))?;
        self.gate(write.interruption)?;
        Ok(write.accepted)
    }

    pub fn process_response_body(&mut self) -> Result<(), WafError> {
        self.advance(Phase::ResponseBody)?;
        let verdict = self
            .tx
            .process_response_body()
            .map_err(|e| self.engine_error(e))?;
        self.gate(verdict)
    }

    pub fn response_body_reader(&mut self) -> Result<Bytes, WafError> {
        self.advance(Phase::ResponseBody)?;
        self.tx
            .response_body_reader()
            .map_err(|e| self.engine_error(e))
    }

    /// Run the engine's logging hook and release the transaction.
    /// Later calls are no-ops.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        self.tx.process_logging();
        if let Err(e) = self.tx.close() {
            tracing::warn!(transaction_id = %self.tx.id(), error = %e, "Transaction close failed");
        }
        tracing::trace!(transaction_id = %self.tx.id(), "Transaction closed");
    }
}

impl Drop for TransactionController {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TransactionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionController")
            .field("id", &self.tx.id())
            .field("phase", &self.phase)
            .finish()
    }
}

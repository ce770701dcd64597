//! Inspection engine contract.
//!
//! # Data Flow
//! ```text
//! InspectionEngine::new_transaction()
//!     → Transaction (one per request, owned by the request task)
//!     → connection → uri → request headers → request body
//!     → [handler]
//!     → response headers → response body
//!     → process_logging → close
//! ```
//!
//! # Design Decisions
//! - The middleware never decides what is malicious; every verdict comes
//!   from the engine as an [`Interruption`]
//! - Body feeds are bounded by the engine: `write_*_body` reports how many
//!   bytes it accepted so callers can stop reading early
//! - Engines are synchronous; the async body plumbing lives in `waf`

pub mod basic;
pub mod rules;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use basic::BasicEngine;

/// Status used when an interruption does not carry one.
pub const DEFAULT_BLOCK_STATUS: u16 = 403;

/// What the engine wants done with the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Reject with the interruption status.
    #[default]
    Deny,
    /// Reject and close the client connection afterwards.
    Drop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Deny => write!(f, "deny"),
            Action::Drop => write!(f, "drop"),
        }
    }
}

/// A terminal verdict produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interruption {
    /// Rule that produced the verdict (0 for engine-internal limits).
    pub rule_id: u32,
    /// HTTP status to send instead of the handler's.
    pub status: u16,
    pub action: Action,
    /// Free-form reason, for logs only.
    pub data: String,
}

impl Interruption {
    /// The status to surface to the client, falling back to 403.
    pub fn effective_status(&self) -> u16 {
        if (400..=599).contains(&self.status) {
            self.status
        } else {
            DEFAULT_BLOCK_STATUS
        }
    }
}

/// Outcome of feeding body bytes into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyWrite {
    pub interruption: Option<Interruption>,
    /// Bytes the engine took from the chunk. Short writes mean its buffer
    /// limit was reached.
    pub accepted: usize,
}

/// Internal engine failure, unrelated to a rule match.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rule {id} is invalid: {reason}")]
    InvalidRule { id: u32, reason: String },

    #[error("body buffer error: {0}")]
    Buffer(String),

    #[error("transaction already closed")]
    Closed,
}

/// Factory for per-request transactions.
pub trait InspectionEngine: Send + Sync + 'static {
    fn new_transaction(&self) -> Box<dyn Transaction>;
}

/// One inspection context bound to exactly one request/response exchange.
///
/// Methods mirror the phases the controller drives. Anything that can
/// produce a verdict returns it; once a verdict exists it is also reported
/// by [`Transaction::interruption`].
pub trait Transaction: Send {
    fn id(&self) -> &str;

    fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_host: &str,
        server_port: u16,
    ) -> Option<Interruption>;

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str);

    fn set_server_name(&mut self, host: &str);

    fn add_request_header(&mut self, name: &str, value: &str);

    fn process_request_headers(&mut self) -> Option<Interruption>;

    fn is_request_body_accessible(&self) -> bool;

    /// Buffer a chunk of the request body, up to the engine's limit.
    fn write_request_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError>;

    /// Everything buffered so far.
    fn request_body_reader(&mut self) -> Result<Bytes, EngineError>;

    fn process_request_body(&mut self) -> Result<Option<Interruption>, EngineError>;

    fn add_response_header(&mut self, name: &str, value: &str);

    fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<Interruption>;

    fn is_response_body_accessible(&self) -> bool;

    fn is_response_body_processable(&self) -> bool;

    fn write_response_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError>;

    fn process_response_body(&mut self) -> Result<Option<Interruption>, EngineError>;

    fn response_body_reader(&mut self) -> Result<Bytes, EngineError>;

    fn interruption(&self) -> Option<&Interruption>;

    fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }

    fn is_rule_engine_off(&self) -> bool;

    fn process_logging(&mut self);

    fn close(&mut self) -> Result<(), EngineError>;
}

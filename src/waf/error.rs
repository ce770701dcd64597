//! Block and failure outcomes of the interception pipeline.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::engine::{Action, EngineError, Interruption};
use crate::observability::metrics;
use crate::waf::transaction::Phase;

/// Why a request did not reach (or return from) the handler normally.
#[derive(Debug, Error)]
pub enum WafError {
    /// The engine decided to block.
    #[error("interrupted in {phase} by rule {} (status {})", .interruption.rule_id, .interruption.status)]
    Interrupted {
        phase: Phase,
        interruption: Interruption,
    },

    /// The engine failed for reasons unrelated to a rule match.
    #[error("inspection engine failed in {phase}: {source}")]
    Engine {
        phase: Phase,
        #[source]
        source: EngineError,
    },

    /// Reading a body stream failed (client gone, deadline hit, upstream reset).
    #[error("body stream failed in {phase}: {source}")]
    Body {
        phase: Phase,
        #[source]
        source: axum::Error,
    },
}

impl WafError {
    pub fn phase(&self) -> Phase {
        match self {
            WafError::Interrupted { phase, .. }
            | WafError::Engine { phase, .. }
            | WafError::Body { phase, .. } => *phase,
        }
    }

    /// Whether the client connection must not be reused.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            WafError::Interrupted { interruption, .. } if interruption.action == Action::Drop
        )
    }

    /// Status surfaced to the client.
    ///
    /// Policy blocks carry the engine's status. Failures are 403 on the
    /// request side and 500 once the handler has produced a response.
    pub fn status(&self) -> StatusCode {
        match self {
            WafError::Interrupted { interruption, .. } => {
                StatusCode::from_u16(interruption.effective_status())
                    .unwrap_or(StatusCode::FORBIDDEN)
            }
            WafError::Engine { phase, .. } | WafError::Body { phase, .. } => {
                if phase.is_response_side() {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::FORBIDDEN
                }
            }
        }
    }
}

impl IntoResponse for WafError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            WafError::Interrupted { phase, interruption } => {
                tracing::warn!(
                    phase = %phase,
                    rule_id = interruption.rule_id,
                    action = %interruption.action,
                    status = status.as_u16(),
                    reason = %interruption.data,
                    "Request blocked"
                );
                metrics::record_interruption(phase.as_str(), status.as_u16());
            }
            WafError::Engine { phase, .. } | WafError::Body { phase, .. } => {
                tracing::error!(
                    phase = %phase,
                    status = status.as_u16(),
                    error = %self,
                    "Inspection aborted"
                );
                metrics::record_engine_error(phase.as_str());
            }
        }
        let mut response = status.into_response();
        if self.closes_connection() {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}

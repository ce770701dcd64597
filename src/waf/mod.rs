//! Request/response inspection subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → policy.rs (resolve or auto-register the path policy)
//!     → transaction.rs (connection, URI, request headers)
//!     → request_body.rs (buffer into the engine, replay to the handler)
//!     → handler
//!     → response.rs (header gate, body accumulation, final flush)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Fail closed: any engine or body error ends the request
//! - One transaction per request, closed on every exit path
//! - The policy store is injected, never a hidden global

pub mod error;
pub mod middleware;
pub mod policy;
pub mod request_body;
pub mod response;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::engine::InspectionEngine;

pub use error::WafError;
pub use middleware::inspect;
pub use policy::{InspectionPolicy, PathPolicyStore};
pub use response::{ResponseInterceptor, ResponseSink, ResponseWriter};
pub use transaction::{Phase, TransactionController, SERVER_PORT};

/// Middleware state: the engine plus the path policies it is applied with.
#[derive(Clone)]
pub struct Waf {
    engine: Arc<dyn InspectionEngine>,
    policies: Arc<PathPolicyStore>,
}

impl Waf {
    pub fn new(engine: Arc<dyn InspectionEngine>, policies: Arc<PathPolicyStore>) -> Self {
        Self { engine, policies }
    }

    pub fn engine(&self) -> &dyn InspectionEngine {
        self.engine.as_ref()
    }

    pub fn policies(&self) -> &PathPolicyStore {
        &self.policies
    }

    /// Shared handle to the store, for the admin API.
    pub fn policy_store(&self) -> Arc<PathPolicyStore> {
        Arc::clone(&self.policies)
    }
}

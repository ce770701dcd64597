//! waf-gate: HTTP inspection middleware and inspecting reverse proxy.

pub mod admin;
pub mod config;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod waf;

pub use config::schema::GatewayConfig;
pub use engine::{BasicEngine, InspectionEngine};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use waf::{inspect, PathPolicyStore, Waf};

//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → waf::inspect (inspection middleware)
//!     → proxy_handler (forward to the upstream)
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → every subscribed listener stops accepting → in-flight requests drain
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches the proxy listener and the admin listener
//! - In-flight transactions finish and close normally during drain

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

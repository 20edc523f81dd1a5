//! # Modvault Server
//!
//! Downloads Steam Workshop items through steamcmd, packages each item
//! into a zip archive, and serves the archive over HTTP with byte-range
//! support. A WebSocket endpoint streams structured logs to authorized
//! observers.
//!
//! The server is built on Axum and uses:
//! - tokio for the runtime and child-process supervision
//! - a bounded orchestrator (default 3 concurrent downloads)
//! - an in-memory artifact registry; jobs do not survive restarts

/// Shared handler state
pub mod app_state;

/// Server config
pub mod config;

/// Error types and handling
pub mod errors;

/// HTTP and WebSocket handlers
pub mod handlers;

/// Route table and middleware stack
pub mod routes;

pub use app_state::AppState;
pub use config::Config;
pub use routes::create_app;

//! steamcmd integration: output classification, session lifecycle, and
//! the process-driving adapter.

pub mod adapter;
pub mod events;
pub mod markers;
pub mod session;

//! Shared vocabulary for the modvault workspace.
//!
//! Everything that crosses a crate or wire boundary lives here: typed
//! identifiers, the job state machine, the stable failure taxonomy,
//! metadata snapshots, and structured log records. All types are
//! serde-serializable with camelCase field names on the wire.

pub mod error;
pub mod ids;
pub mod job;
pub mod log;
pub mod metadata;

pub use error::FailureKind;
pub use ids::{AppId, JobId, WorkshopItemId};
pub use job::{Job, JobState};
pub use log::{LogLevel, LogRecord};
pub use metadata::ItemMetadata;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a published log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

/// A structured record published on the log bus and fanned out to
/// connected observers. Subscribers receive by-value copies; `seq` is
/// strictly increasing in publish order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Symbolic component tag, e.g. `orchestrator` or `steamcmd`.
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

//! Live log streaming over WebSocket.

use crate::app_state::AppState;
use crate::errors::AppError;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, StreamExt};
use modvault_model::LogRecord;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct LogStreamQuery {
    #[serde(default)]
    token: Option<String>,
}

fn default_recent_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct RecentLogsQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn observer_authorized(state: &AppState, presented: Option<&String>) -> bool {
    match (&state.config.observer_token, presented) {
        (Some(expected), Some(presented)) => expected == presented,
        _ => false,
    }
}

/// Recent history for the admin activity view.
pub async fn recent_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<RecentLogsQuery>,
) -> Result<axum::Json<Vec<LogRecord>>, AppError> {
    if !observer_authorized(&state, query.token.as_ref()) {
        return Err(AppError::unauthorized("valid observer token required"));
    }
    Ok(axum::Json(state.bus.recent(query.limit.min(1000))))
}

/// Upgrades authorized observers onto the log stream. Unauthorized
/// connects are rejected before the upgrade completes.
pub async fn log_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<LogStreamQuery>,
) -> Response {
    if !observer_authorized(&state, query.token.as_ref()) {
        return AppError::unauthorized("valid observer token required").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Recent history first, then live records.
    let (burst, mut live) = state.bus.subscribe();
    for record in burst {
        if send_record(&mut sender, &record).await.is_err() {
            return;
        }
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            record = live.recv() => match record {
                Some(record) => {
                    if send_record(&mut sender, &record).await.is_err() {
                        break;
                    }
                }
                // Dropped by the bus: back-pressure overflow or shutdown.
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("log stream subscriber disconnected");
}

async fn send_record<S>(sender: &mut S, record: &LogRecord) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let payload = serde_json::to_string(record).unwrap_or_default();
    sender.send(Message::Text(payload.into())).await
}

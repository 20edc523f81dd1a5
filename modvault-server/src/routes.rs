use crate::app_state::AppState;
use crate::handlers::{download, health, logs};
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/download", post(download::submit_download))
        .route("/api/download/{id}/status", get(download::download_status))
        .route("/api/download/{id}/file", get(download::fetch_archive))
        .route("/api/download/{id}", delete(download::cleanup_download))
        .route("/api/logs/stream", get(logs::log_stream_handler))
        .route("/api/logs/recent", get(logs::recent_logs_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

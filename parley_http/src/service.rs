use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use parley_conversation::{TurnError, TurnOrchestrator};
use parley_threads::ThreadStore;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tracing::{info, warn};

/// Shared handler state: the orchestrator for turns, the store for reads.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub store: Arc<ThreadStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("model invocation timed out")]
    InvocationTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Invocation(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::InvocationTimeout => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        let body = Json(serde_json::json!({ "error": msg }));
        (code, body).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::Timeout(_) => Self::InvocationTimeout,
            TurnError::Invocation(source) => Self::Invocation(source.to_string()),
            TurnError::EmptyResponse => Self::Invocation("empty response from model".to_string()),
        }
    }
}

/// Build the CORS layer from an origin allowlist.
///
/// Exact origins are allowed with credentials; an empty list falls back
/// to a permissive layer without credentials, since a wildcard origin
/// cannot be combined with credentials.
#[must_use]
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin.trim())
                .map_err(|_| warn!("Ignoring invalid CORS origin: {origin}"))
                .ok()
        })
        .collect();

    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    if parsed.is_empty() {
        layer.allow_headers(Any).allow_origin(Any)
    } else {
        // Credentials cannot be combined with wildcard headers/origins.
        layer
            .allow_headers(AllowHeaders::mirror_request())
            .allow_origin(parsed)
            .allow_credentials(true)
    }
}

/// Bind `addr` and serve `app` until ctrl-c.
pub async fn serve(addr: SocketAddr, app: axum::Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_errors_map_to_upstream_statuses() {
        let timeout: ApiError = TurnError::Timeout(std::time::Duration::from_secs(1)).into();
        assert!(matches!(timeout, ApiError::InvocationTimeout));

        let failed: ApiError = TurnError::Invocation(anyhow::anyhow!("boom")).into();
        assert!(matches!(failed, ApiError::Invocation(_)));

        let empty: ApiError = TurnError::EmptyResponse.into();
        assert!(matches!(empty, ApiError::Invocation(_)));
    }

    #[test]
    fn cors_layer_accepts_origin_lists() {
        // Invalid origins are filtered out rather than failing startup.
        let _strict = cors_layer(&["http://localhost:3000".to_string()]);
        let _open = cors_layer(&[]);
        let _mixed = cors_layer(&["http://localhost:3000".to_string(), "\u{0}bad".to_string()]);
    }
}

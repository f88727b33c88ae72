//! Transport layer: WebSocket upgrade, per-connection workers, health.
//!
//! One logical worker per connection handles that connection's inbound
//! frames strictly in arrival order; handler execution (fan-out included)
//! is awaited inline.  Workers for different connections run concurrently
//! with no ordering guarantee between them.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::dispatch::{HandlerRegistry, handle_frame};
use crate::metrics::HealthStatus;
use crate::session::Session;
use crate::state::CoreState;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CoreState>,
    pub handlers: Arc<HandlerRegistry>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until shutdown.
pub async fn serve(core: Arc<CoreState>, handlers: Arc<HandlerRegistry>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", core.config.host, core.config.port);
    let router = build_router(AppState { core, handlers });
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "shoal server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        sessions: state.core.sessions.len() as u64,
        metrics: state.core.metrics.snapshot(),
    })
}

/// Connection worker: create the session, pump frames through the
/// dispatcher in order, evict on close.  The persisted snapshot (if any)
/// survives eviction as a reconnect restore point.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let AppState { core, handlers } = state;

    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(core.config.send_queue);
    let session = Arc::new(Session::new(
        session_id.clone(),
        tx,
        core.anonymous_attributes(),
    ));
    core.sessions.add(Arc::clone(&session));
    core.metrics.connection_opened();
    info!(session = %session_id, "connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Single writer per connection: outbound envelopes never interleave.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&core, &handlers, &session, &text).await;
            }
            Ok(Message::Binary(bytes)) => {
                // Binary frames carry the same JSON envelopes.
                let text = String::from_utf8_lossy(&bytes);
                handle_frame(&core, &handlers, &session, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %session_id, "websocket error: {e}");
                break;
            }
        }
    }

    core.sessions.remove(&session_id);
    core.metrics.connection_closed();
    info!(session = %session_id, "connection closed");

    // Dropping our sender handle lets the writer drain and exit; any send
    // attempted after eviction is a logged no-op in the sender.
    drop(session);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::build_registry;
    use crate::test_helpers::test_core;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_sessions_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let core = test_core(&dir).await;
        let handlers = Arc::new(build_registry().unwrap());
        let router = build_router(AppState { core, handlers });

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 0);
        assert!(body["metrics"]["uptime_secs"].is_number());
    }
}

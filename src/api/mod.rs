//! Miniserver-facing HTTP/WebSocket surface.
//!
//! Two listeners (AppHTTP and MSHTTP) serve the same router. Commands arrive
//! as GET paths (`/audio/1/play`) or as WebSocket text frames with the same
//! grammar minus the leading slash; responses are JSON. Push events fan out
//! to every connected socket; a subscriber that lags loses the oldest events
//! with a warning instead of back-pressuring the rest.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequestParts, Path, RawQuery, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::alerts::AlertResolver;
use crate::bus::SharedBus;
use crate::router::CommandRouter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
    pub alerts: Arc<AlertResolver>,
    pub bus: SharedBus,
    pub shutdown: CancellationToken,
}

/// Build the shared route tree.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(root_handler))
        .route("/audio/{*path}", get(audio_get_handler))
        .route("/audio/{*path}", post(audio_post_handler))
        .route("/alerts/{*path}", get(alerts_handler))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve one listener until shutdown.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

/// `GET /` answers a WebSocket upgrade (the miniserver path) or a service
/// banner for plain HTTP probes.
async fn root_handler(State(state): State<AppState>, request: axum::extract::Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| handle_ws(socket, state)),
        Err(_) => Json(json!({
            "service": "audioserver",
            "version": env!("CARGO_PKG_VERSION"),
        }))
        .into_response(),
    }
}

async fn audio_get_handler(
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Response {
    let command = format!("audio/{path}");
    let response = state
        .router
        .dispatch(&command, query.as_deref())
        .await;
    command_response(response)
}

async fn audio_post_handler(
    Path(path): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> Response {
    let command = format!("audio/{path}");
    let payload = (!body.is_empty()).then_some(body.as_str());
    let response = state.router.dispatch(&command, payload).await;
    command_response(response)
}

fn command_response(response: crate::router::RouterResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}

/// Static alert/TTS media under the public root; traversal is refused by
/// the resolver.
async fn alerts_handler(Path(path): Path<String>, State(state): State<AppState>) -> Response {
    let Some(file) = state.alerts.serve_path(&path) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let content_type = match file.extension().and_then(|e| e.to_str()) {
                Some("mp3") => "audio/mpeg",
                Some("wav") => "audio/wav",
                Some("ogg") => "audio/ogg",
                _ => "application/octet-stream",
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            warn!("alert serve failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "read error").into_response()
        }
    }
}

/// One connected client: command frames in, responses and push events out.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe();
    debug!("websocket client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let command = text.trim();
                        if command.is_empty() {
                            continue;
                        }
                        // Frames may carry an inline payload after the
                        // command, separated by whitespace.
                        let (command, payload) = match command.split_once(char::is_whitespace) {
                            Some((cmd, rest)) => (cmd, Some(rest.trim())),
                            None => (command, None),
                        };
                        let response = state.router.dispatch(command, payload).await;
                        let body = response.body.to_string();
                        if sender.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sender.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = event.to_frame().to_string();
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("subscriber lagging, dropped {n} oldest events");
                    }
                    Err(_) => break,
                }
            }
        }
    }
    debug!("websocket client disconnected");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use crate::config::ZoneConfig;
    use crate::content::AdapterRegistry;
    use crate::favorites::FavoritesStore;
    use crate::providers::DummyProvider;
    use crate::zone::ZoneManager;
    use tower::ServiceExt;

    async fn test_state(dir: &std::path::Path) -> AppState {
        let bus = create_bus();
        let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
        manager
            .upsert_zone(ZoneConfig {
                id: 1,
                ..ZoneConfig::default()
            })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let favorites = Arc::new(
            FavoritesStore::new(dir.join("favorites"), bus.clone())
                .with_provider(Arc::new(DummyProvider::default())),
        );
        AppState {
            router: Arc::new(CommandRouter::new(manager, favorites)),
            alerts: Arc::new(AlertResolver::new(dir.join("public"), None)),
            bus,
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn http_command_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/audio/1/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["command"], "audio/1/status");
        assert!(body["status_result"].is_array());
    }

    #[tokio::test]
    async fn alerts_404_on_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/alerts/..%2Fsecret")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_banner_without_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "audioserver");
    }
}

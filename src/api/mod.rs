use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::channels::{self, Messenger};
use crate::error::{CourierError, Result};
use crate::registry::ChatRegistry;

pub struct AppState {
    pub registry: Arc<ChatRegistry>,
    pub messenger: Arc<dyn Messenger>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
}

impl SendMessageResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            chat_id: None,
        }
    }
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub message: String,
    pub success_count: usize,
    pub fail_count: usize,
}

impl BroadcastResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            success_count: 0,
            fail_count: 0,
        }
    }
}

#[derive(Serialize)]
pub struct ChatListResponse {
    pub success: bool,
    pub message: String,
    pub chat_ids: Vec<i64>,
    pub count: usize,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Telegram relay is running",
    })
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> (StatusCode, Json<SendMessageResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SendMessageResponse::failure(format!("Malformed request: {}", e.body_text()))),
            )
        }
    };

    let Ok(chat_id) = req.chat_id.trim().parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(SendMessageResponse::failure(
                "Invalid chat_id: it must be a numeric chat ID",
            )),
        );
    };
    if req.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SendMessageResponse::failure("Field 'message' must not be empty")),
        );
    }

    if let Err(e) = state.messenger.send(chat_id, &req.message).await {
        warn!("API send to chat {chat_id} failed: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SendMessageResponse::failure(format!("Failed to send message: {e}"))),
        );
    }

    (
        StatusCode::OK,
        Json(SendMessageResponse {
            success: true,
            message: "Message sent".to_string(),
            chat_id: Some(chat_id),
        }),
    )
}

async fn broadcast(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<BroadcastRequest>, JsonRejection>,
) -> (StatusCode, Json<BroadcastResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(BroadcastResponse::failure(format!("Malformed request: {}", e.body_text()))),
            )
        }
    };
    if req.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(BroadcastResponse::failure("Field 'message' must not be empty")),
        );
    }

    let chat_ids = state.registry.snapshot().await;
    if chat_ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(BroadcastResponse::failure(
                "No known chats yet. Add the bot to a group or message it first.",
            )),
        );
    }

    let tally = channels::broadcast(state.messenger.as_ref(), &chat_ids, &req.message).await;
    info!(
        "API broadcast: {} succeeded, {} failed",
        tally.success, tally.failed
    );

    (
        StatusCode::OK,
        Json(BroadcastResponse {
            success: true,
            message: "Broadcast finished".to_string(),
            success_count: tally.success,
            fail_count: tally.failed,
        }),
    )
}

async fn list_chats(State(state): State<Arc<AppState>>) -> Json<ChatListResponse> {
    let chat_ids = state.registry.snapshot().await;
    Json(ChatListResponse {
        success: true,
        message: "Fetched known chats".to_string(),
        count: chat_ids.len(),
        chat_ids,
    })
}

fn set_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Origin, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization",
        ),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length"),
    );
}

/// Permissive CORS. Pre-flight requests get 204 with no body.
async fn cors_middleware(request: axum::extract::Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        set_cors_headers(response.headers_mut());
        return response;
    }
    let mut response = next.run(request).await;
    set_cors_headers(response.headers_mut());
    response
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/send", post(send_message))
        .route("/api/v1/broadcast", post(broadcast))
        .route("/api/v1/chats", get(list_chats));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(middleware::from_fn(cors_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `listener` until `cancel` fires, then give in-flight
/// requests up to `grace` to finish before dropping them.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => {
            return res.map_err(|e| CourierError::Server(e.to_string()));
        }
        _ = cancel.cancelled() => {}
    }

    info!("HTTP API shutting down");
    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => {
            res.map_err(|e| CourierError::Server(e.to_string()))?;
            info!("HTTP API stopped");
        }
        Err(_) => warn!(
            "HTTP API did not drain within {}s, abandoning remaining connections",
            grace.as_secs()
        ),
    }
    Ok(())
}

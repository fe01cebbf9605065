// Local HTTP API server module

use anyhow::Result;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod handlers;
mod management;

use crate::chat::ChatService;

const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

static SERVER_HANDLE: OnceCell<RwLock<Option<oneshot::Sender<()>>>> = OnceCell::new();

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub api_keys: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(chat: ChatService, api_keys: Vec<String>) -> Self {
        Self {
            chat,
            api_keys: Arc::new(api_keys),
        }
    }
}

/// API key authentication middleware
async fn auth_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    // If no API keys configured, allow all requests
    if state.api_keys.is_empty() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let is_valid = match auth_header {
        Some(auth) => {
            // Support both "Bearer <key>" and raw key
            let key = auth.strip_prefix("Bearer ").unwrap_or(auth);
            state.api_keys.iter().any(|k| k == key)
        }
        None => false,
    };

    if is_valid {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [("Content-Type", "application/json")],
            r#"{"error":{"message":"Invalid API key","code":"invalid_api_key"}}"#,
        )
            .into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    let protected_routes = Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/dispatch/:service_type", post(handlers::dispatch_as))
        .route("/v1/models", get(handlers::list_models))
        .route("/management/models", put(management::select_model))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(handlers::root))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on {}", addr);

    let (tx, rx) = oneshot::channel::<()>();

    SERVER_HANDLE
        .get_or_init(|| RwLock::new(None))
        .write()
        .replace(tx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            rx.await.ok();
        })
        .await?;

    Ok(())
}

pub async fn stop_server() -> Result<()> {
    if let Some(lock) = SERVER_HANDLE.get() {
        if let Some(tx) = lock.write().take() {
            let _ = tx.send(());
            tracing::info!("API server stopped");
        }
    }
    Ok(())
}

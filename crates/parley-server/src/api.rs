use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::Method,
    middleware,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_shared::constants::WS_PATH;
use parley_shared::{Message, UserId};
use parley_store::MessageStore;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::registry::PresenceRegistry;
use crate::router::EventRouter;
use crate::ws::ws_handler;

/// Everything a connection or HTTP handler needs. Cheap to clone; the store
/// and registry are shared by reference count.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub registry: Arc<PresenceRegistry>,
    pub router: Arc<EventRouter>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Fresh, empty store and registry.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(MessageStore::new());
        let registry = Arc::new(PresenceRegistry::new());
        let router = Arc::new(EventRouter::new(store.clone(), registry.clone()));

        Self {
            store,
            registry,
            router,
            rate_limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/chats", get(list_chats))
        .route("/api/notifs", get(list_notifs))
        .route("/api/online", get(list_online))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    online: usize,
    messages: usize,
}

#[derive(Deserialize)]
struct ChatsQuery {
    user1: Option<String>,
    user2: Option<String>,
}

#[derive(Deserialize)]
struct NotifsQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        online: state.registry.len().await,
        messages: state.store.len().await,
    })
}

/// `GET /api/chats?user1=..&user2=..`: conversation history, both directions.
async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatsQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let user1 = required(query.user1, "user1")?;
    let user2 = required(query.user2, "user2")?;

    Ok(Json(state.store.history(&user1, &user2).await))
}

/// `GET /api/notifs?userId=..`: unread messages addressed to the user.
async fn list_notifs(
    State(state): State<AppState>,
    Query(query): Query<NotifsQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let user = query
        .user_id
        .filter(|id| !id.is_empty())
        .map(UserId::from)
        .ok_or(ServerError::MissingUserId)?;

    Ok(Json(state.store.unread_for(&user).await))
}

async fn list_online(State(state): State<AppState>) -> Json<Vec<UserId>> {
    Json(state.registry.online_users().await)
}

fn required(value: Option<String>, name: &str) -> Result<UserId, ServerError> {
    value
        .filter(|v| !v.is_empty())
        .map(UserId::from)
        .ok_or_else(|| ServerError::BadRequest(format!("Missing '{name}' query parameter")))
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP + websocket server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

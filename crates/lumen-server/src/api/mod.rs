//! HTTP surface: router construction, shared state and the health check.
//! Resource handlers live in the submodules.

mod auth;
mod messages;
mod notifications;
mod posts;
mod search;
mod uploads;
mod users;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::fanout::{Fanout, SharedDb};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub fanout: Fanout,
    pub blob_store: Arc<BlobStore>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    // Multipart framing on top of the largest accepted image.
    let body_limit = state.config.max_upload_size + 64 * 1024;

    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/{key}", get(users::profile))
        .route("/users/{key}/follow", post(users::toggle_follow))
        .route("/users/{key}/followers", get(users::followers))
        .route("/users/{key}/following", get(users::following))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/explore", get(posts::explore))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/like", post(posts::toggle_like))
        .route("/posts/{id}/comments", post(posts::add_comment))
        .route("/messages/send", post(messages::send))
        .route("/messages/mark-seen/{user_id}", post(messages::mark_seen))
        .route("/messages/{user_id}", get(messages::conversation))
        .route("/notifications", get(notifications::list))
        .route("/notifications/mark-all-read", post(notifications::mark_all_read))
        .route("/search", get(search::search))
        .route("/uploads", post(uploads::upload))
        .route("/uploads/{id}", get(uploads::download));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Parse an id path segment, answering 400 instead of the extractor's
/// plain-text rejection.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::BadRequest(format!("Invalid {what} id")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    online: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online: state.fanout.presence().len().await,
    })
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use lumen_store::Database;
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use crate::presence::PresenceRegistry;

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
        _uploads: TempDir,
    }

    impl TestApp {
        pub async fn new() -> Self {
            let uploads = TempDir::new().unwrap();
            let config = ServerConfig {
                upload_dir: uploads.path().to_path_buf(),
                max_upload_size: 1024,
                rate_limit_per_sec: 1000.0,
                rate_limit_burst: 1000.0,
                ..ServerConfig::default()
            };

            let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
            let blob_store = BlobStore::new(
                config.upload_dir.clone(),
                config.max_upload_size,
                config.public_url.clone(),
            )
            .await
            .unwrap();

            let state = AppState {
                fanout: Fanout::new(db.clone(), PresenceRegistry::new()),
                db,
                blob_store: Arc::new(blob_store),
                rate_limiter: RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst),
                config: Arc::new(config),
            };

            Self {
                router: build_router(state.clone()),
                state,
                _uploads: uploads,
            }
        }

        pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, body)
        }

        pub async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let req = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(req).await
        }

        pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
            self.request(Method::GET, uri, Some(token), None).await
        }

        pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            self.request(Method::POST, uri, Some(token), Some(body)).await
        }

        /// Register `username` and return `(token, user id)`.
        pub async fn register(&self, username: &str) -> (String, String) {
            let (status, body) = self
                .request(
                    Method::POST,
                    "/api/auth/register",
                    None,
                    Some(serde_json::json!({ "username": username, "password": "secret123" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            (
                body["token"].as_str().unwrap().to_string(),
                body["user"]["id"].as_str().unwrap().to_string(),
            )
        }
    }
}

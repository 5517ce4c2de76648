use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::config::Config;
use common::error::ApiError;
use pow::PowService;
use rand::rngs::OsRng;
use rand::RngCore;
use ratelimit::RateLimiter;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod chat_api;
mod paste_api;
mod pow_api;

/// Request bodies larger than this are refused outright. Leaves headroom for
/// the base64 overhead on a maximum-size paste.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub pow: Arc<PowService>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

pub(crate) type AppResult<T> = Result<T, AppError>;

pub(crate) struct AppError(ApiError);

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal error: {err:#}");
        Self(ApiError::Internal)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

/// The one place component outcomes become HTTP statuses.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PowRequired
            | ApiError::PowInvalid
            | ApiError::PowExpired
            | ApiError::PowUsed
            | ApiError::PowInsufficient
            | ApiError::MalformedBody
            | ApiError::TooLarge
            | ApiError::BadExpiration
            | ApiError::MissingField => StatusCode::BAD_REQUEST,
            ApiError::InvalidToken | ApiError::InvalidAuth | ApiError::ChatDisabled => {
                StatusCode::FORBIDDEN
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Gone => StatusCode::GONE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.0.kind() })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/pow", get(pow_api::issue_challenge))
        .nest("/api/pastes", paste_api::routes().merge(chat_api::routes()))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Client identity for rate limiting: the leftmost forwarded address when the
/// front proxy is trusted, the transport peer otherwise.
pub(crate) fn client_ident(state: &AppState, headers: &HeaderMap, addr: SocketAddr) -> String {
    if state.config.server.trust_forwarded_for {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    addr.ip().to_string()
}

pub(crate) fn check_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    addr: SocketAddr,
) -> Result<(), ApiError> {
    let ident = client_ident(state, headers, addr);
    if state.limiter.try_acquire(&ident) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

/// Access log line per request. Only non-sensitive fields: the identity is
/// logged as a truncated digest, bodies and tokens never appear.
async fn log_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut id_bytes = [0u8; 4];
    OsRng.fill_bytes(&mut id_bytes);
    let request_id = hex::encode(id_bytes);

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| {
            let ident = client_ident(&state, request.headers(), *addr);
            hex::encode(&utils::sha256(ident.as_bytes())[..8])
        })
        .unwrap_or_default();

    let response = next.run(request).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        request_id,
        client,
        "request"
    );
    response
}

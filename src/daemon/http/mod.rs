//! HTTP API.
//!
//! All routes live under `/api/v1`. Every route except `/health` passes the
//! per-source rate limiter first. Errors are rendered as
//! `{"message": "..."}` with the status from [`AppError`].

pub mod client;
mod handlers;
mod types;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, log_audit_event};
use crate::config::{Config, HeaderConfig};
use crate::daemon::services::geo::{self, SharedLocator};
use crate::error::Error;
use crate::lifecycle::LifecycleManager;
use crate::metrics;
use crate::reliability::RateLimiter;
use types::MessageResponse;

/// Slack for multipart boundaries and text fields on top of the file size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Everything a handler needs. Immutable after startup.
pub struct AppState {
    pub manager: LifecycleManager,
    pub limiter: Option<Arc<RateLimiter>>,
    pub locator: SharedLocator,
    pub headers: HeaderConfig,
    pub max_upload_bytes: usize,
    pub max_upload_mib: u64,
}

pub type SharedState = Arc<AppState>;

/// Errors rendered to clients.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    PayloadTooLarge,
    TooManyRequests,
    Internal(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => Self::BadRequest(msg),
            Error::Unauthorized => Self::Unauthorized("owner token doesn't match".to_string()),
            Error::NotFound => {
                Self::NotFound("file not found or download limit exceeded".to_string())
            },
            Error::PolicyDenied(reason) => Self::Forbidden(reason.public_message().to_string()),
            Error::RateLimited => Self::TooManyRequests,
            Error::PayloadTooLarge => Self::PayloadTooLarge,
            Error::Internal(e) => {
                error!(error = %format!("{e:#}"), "Internal error");
                Self::Internal("internal server error".to_string())
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "file too large".to_string(),
            ),
            Self::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "too many requests".to_string(),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(MessageResponse::new(message))).into_response()
    }
}

/// Build the application router.
pub fn router(state: SharedState, request_timeout: Duration) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/files", post(handlers::upload_file))
        .route("/files/validate", post(handlers::validate_files))
        .route(
            "/files/{file_id}",
            get(handlers::download_file)
                .post(handlers::confirm_receipt)
                .delete(handlers::delete_file),
        )
        .route("/config", get(handlers::public_config))
        .route("/stats", post(handlers::save_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}

/// Admission control keyed on the client address.
async fn rate_limit(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        let connect_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let source = client::remote_ip(
            request.headers(),
            connect_addr,
            state.headers.trust_forwarded_for,
        )
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());

        if !limiter.allow(&source) {
            metrics::record_rate_limited();
            log_audit_event(AuditEvent::RateLimited {
                remote_addr: &source,
                path: request.uri().path(),
            });
            return AppError::TooManyRequests.into_response();
        }
    }
    next.run(request).await
}

/// Bind, serve until SIGINT/SIGTERM, then give in-flight requests the
/// configured grace period.
///
/// # Errors
///
/// Returns an error if the geo table or rate limiter cannot be set up, the
/// address cannot be bound, or the server fails.
pub async fn serve(config: &Config, manager: LifecycleManager) -> Result<()> {
    let locator = geo::open(config.geoip_path.as_deref())?;

    let limiter = if config.rate_limit.enabled {
        Some(Arc::new(RateLimiter::from_config(&config.rate_limit)?))
    } else {
        info!("Rate limiting disabled");
        None
    };
    let sweeper = limiter.as_ref().map(|limiter| {
        limiter.spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs))
    });

    let state = Arc::new(AppState {
        manager,
        limiter,
        locator,
        headers: config.headers.clone(),
        max_upload_bytes: config.max_upload_bytes(),
        max_upload_mib: config.max_upload_size_mib,
    });
    let app = router(state, Duration::from_secs(config.request_timeout_secs));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %listener.local_addr()?, "Listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });
    let mut server = tokio::spawn(server.into_future());

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let result = tokio::select! {
        joined = &mut server => joined,
        _ = signalled_rx => {
            info!(grace_secs = grace.as_secs(), "Shutting down, draining requests");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Grace period elapsed, aborting in-flight requests");
                    server.abort();
                    Ok(Ok(()))
                },
            }
        },
    };

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result.context("Server task failed")?.context("Server error")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

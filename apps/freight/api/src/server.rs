use axum::{
    Json, Router,
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue, Method, StatusCode,
        header::{self, ACCEPT, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use core_config::AppInfo;
use core_config::server::ServerConfig;
use domain_freight::handlers;
use observability::middleware::metrics_middleware;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::openapi::ApiDoc;
use crate::state::AppService;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: String,
    pub version: String,
}

/// Liveness check with app name and version
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is running", body = HealthResponse))
)]
pub async fn health(State(app): State<AppInfo>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: app.name,
        version: app.version,
    })
}

async fn not_found() -> Response {
    let body = Json(json!({
        "error": "The requested resource was not found",
        "code": StatusCode::NOT_FOUND.as_u16()
    }));
    (StatusCode::NOT_FOUND, body).into_response()
}

/// Adds the usual hardening headers to every response
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    response
}

/// CORS from `CORS_ALLOWED_ORIGIN`. No origins means any origin, which
/// configuration only allows outside production.
fn cors_layer(server: &ServerConfig) -> eyre::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT])
        .max_age(Duration::from_secs(3600));

    if server.cors_allowed_origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGIN not set, allowing any origin");
        return Ok(layer.allow_origin(AllowOrigin::any()));
    }

    let origins = server
        .cors_allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| eyre::eyre!("Invalid CORS_ALLOWED_ORIGIN value: {}", e))?;

    info!(origins = ?server.cors_allowed_origins, "CORS configured");
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Domain routes under `/api` plus docs, health, metrics and middleware
pub fn build_router(service: AppService, config: &Config) -> eyre::Result<Router> {
    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(config.app.clone());

    let router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(Scalar::with_url("/scalar", ApiDoc::openapi()))
        .nest("/api", handlers::router(service))
        .merge(health_routes)
        .route("/metrics", get(observability::metrics_handler))
        .fallback(not_found)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(&config.server)?)
        .layer(CompressionLayer::new());

    Ok(router)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM signal, shutting down gracefully"),
    }
}

/// Serve until SIGINT/SIGTERM. In-flight requests get `shutdown_timeout`.
pub async fn serve(router: Router, server: &ServerConfig) -> eyre::Result<()> {
    let listener = tokio::net::TcpListener::bind(server.address()).await?;
    info!("Server starting on {}", listener.local_addr()?);

    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let graceful = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            notify.notify_one();
        },
    );

    let deadline = server.shutdown_timeout;
    tokio::select! {
        result = graceful.into_future() => result.inspect_err(|e| error!("Server encountered an error: {:?}", e))?,
        _ = async {
            signalled.notified().await;
            tokio::time::sleep(deadline).await;
        } => warn!("In-flight requests exceeded {:?}, forcing shutdown", deadline),
    }

    Ok(())
}

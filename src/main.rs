mod config;
mod db;
mod errors;
mod models;
mod routes;
mod utils;

use crate::config::{ListOrder, Settings};
use crate::db::mongo::{connection_manager, MongoVideoStore};
use crate::db::DynVideoStore;
use crate::routes::{create_video, delete_video, health_check, list_videos, root};
use crate::utils::http_trace;

use axum::body::Body;
use axum::routing::{delete, get};
use axum::Router;
use axum_prometheus::metrics_exporter_prometheus::PrometheusHandle;
use axum_prometheus::{MakeDefaultHandle, PrometheusMetricLayer};
use once_cell::sync::Lazy;
use std::error::Error;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone)]
pub struct InnerState {
    pub videos: DynVideoStore,
    pub list_order: ListOrder,
}

/// The Prometheus recorder is global, so it is installed once per process.
static METRIC_HANDLE: Lazy<PrometheusHandle> = Lazy::new(axum_prometheus::Handle::make_default_handle);

pub fn app(state: InnerState) -> Router {
    let metric_handle = METRIC_HANDLE.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/videos", get(list_videos).post(create_video))
        .route("/videos/:id", delete(delete_video))
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(PrometheusMetricLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(http_trace::make_span::<Body>)
                .on_request(http_trace::on_request::<Body>)
                .on_response(http_trace::on_response::<Body>)
                .on_failure(http_trace::on_failure),
        )
        .with_state(state)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "videos_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    let manager = connection_manager(&settings.mongo);
    if settings.connect_eagerly {
        // Requests retry the connection, so a failure here is not fatal.
        if let Err(e) = manager.acquire().await {
            tracing::error!(error = %e, "Initial MongoDB connection failed");
        }
    }
    tracing::info!(
        connected = manager.is_connected(),
        cache_scope = ?settings.mongo.cache_scope,
        "MongoDB connection manager ready"
    );

    let state = InnerState {
        videos: Arc::new(MongoVideoStore::new(manager, settings.mongo.socket_timeout)),
        list_order: settings.list_order,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

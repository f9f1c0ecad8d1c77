// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use compass_manager::{
    config::{load_oauth_credentials, Config},
    constants::KCP_NAMESPACE,
    context::Context,
    control_plane::{ControlPlane, KubeControlPlane},
    controller::{run_kyma_controller, run_mapping_controller},
    director::{graphql::GraphqlDirectorClient, oauth::OAuthTokenSource, DirectorClient},
    mapping::{KubeMappingStore, MappingStore},
    metrics,
    runtime_agent::{KubeconfigConnector, TargetClusterConnector},
};
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("compass-manager")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or text).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    let config = Config::parse();
    init_tracing();
    config.validate()?;

    info!("Starting Compass Manager");
    debug!(?config, "Configuration loaded");

    let credentials = load_oauth_credentials(&config.director_oauth_path)?;

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let http = reqwest::Client::builder()
        .timeout(config.call_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let tokens = OAuthTokenSource::new(http.clone(), credentials)
        .context("Invalid OAuth tokens endpoint")?;
    let director: Arc<dyn DirectorClient> = Arc::new(GraphqlDirectorClient::new(
        http,
        config.director_endpoint()?,
        tokens,
    ));

    let ctx = Arc::new(Context::new(
        Arc::new(KubeControlPlane::new(client.clone(), config.call_timeout())) as Arc<dyn ControlPlane>,
        Arc::new(KubeMappingStore::new(client.clone(), config.call_timeout()))
            as Arc<dyn MappingStore>,
        director,
        Arc::new(KubeconfigConnector::new(config.call_timeout())) as Arc<dyn TargetClusterConnector>,
        config.connector_url_pattern.clone(),
        config.retry_policy(),
    ));

    let listener = TcpListener::bind(config.metrics_bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.metrics_bind_address))?;
    info!("Serving /metrics and /healthz on {}", config.metrics_bind_address);
    let metrics_server = tokio::spawn(serve_metrics(listener, shutdown_signal()));

    info!("Starting all controllers");
    let controllers = async {
        let (kyma, mapping) = tokio::join!(
            run_kyma_controller(client.clone(), KCP_NAMESPACE, Arc::clone(&ctx), config.concurrency),
            run_mapping_controller(client.clone(), KCP_NAMESPACE, Arc::clone(&ctx), config.concurrency),
        );
        if let Err(e) = kyma.and(mapping) {
            error!("Controller exited with error: {:?}", e);
        }
    };

    if run_until_drained(controllers, shutdown_signal(), config.shutdown_grace()).await {
        info!("Graceful shutdown completed successfully");
    } else {
        warn!(
            "In-flight reconciliations did not finish within {}s, exiting",
            config.shutdown_grace_secs
        );
    }

    metrics_server.abort();
    Ok(())
}

/// Wait for `work` to finish. Once `shutdown` fires, give it at most `grace` more.
///
/// Returns `false` when the grace period ran out.
async fn run_until_drained<W, S>(work: W, shutdown: S, grace: Duration) -> bool
where
    W: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(work);
    tokio::select! {
        () = &mut work => {
            warn!("Controllers stopped without a shutdown signal");
            true
        }
        () = shutdown => {
            info!("Draining in-flight reconciliations for up to {}s", grace.as_secs());
            tokio::time::timeout(grace, work).await.is_ok()
        }
    }
}

/// Resolve on SIGTERM (pod termination) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        () = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown..."),
        () = terminate => info!("Received SIGTERM (pod termination), initiating graceful shutdown..."),
    }
}

fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn serve_metrics<S>(listener: TcpListener, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(shutdown)
        .await
}

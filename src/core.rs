use axum::{Router, extract::DefaultBodyLimit, routing::get};
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::{
    api,
    app::AppContext,
    config::Config,
    cors::build_cors_layer,
    error::{ForgeError, Result},
    health,
    jobs::ExpirySweeper,
    middleware::{ForgeRequestId, request_span},
};

/// The HTTP service plus its background sweeper.
pub struct App {
    router: Router<AppContext>,
    context: AppContext,
}

impl App {
    pub fn new(context: AppContext) -> Self {
        let router = api::router().route("/health", get(health::health_handler));
        Self { router, context }
    }

    /// Build everything from configuration, connecting to the database if one
    /// is configured.
    pub async fn from_config(config: Config) -> Result<Self> {
        Ok(Self::new(AppContext::from_config(config).await?))
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// The finished router with middleware and state applied.
    pub fn into_router(self) -> Router {
        let config = self.context.config.clone();
        let mut router = self
            .router
            .layer(axum::Extension(self.context.auth.clone()))
            .layer(DefaultBodyLimit::max(config.server.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_seconds,
            )));

        if let Some(cors) = build_cors_layer(&config.cors) {
            router = router.layer(cors);
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(ForgeRequestId))
            .with_state(self.context)
    }

    /// Serve until Ctrl+C or SIGTERM, then stop the sweeper.
    pub async fn serve(self) -> Result<()> {
        let config = self.context.config.clone();
        let addr = config
            .server
            .addr()
            .map_err(|e| ForgeError::internal(format!("Invalid server address: {}", e)))?;

        let sweeper = config.sweeper.enabled.then(|| {
            ExpirySweeper::new(
                self.context.ledger.clone(),
                Duration::from_secs(config.sweeper.interval_seconds),
            )
            .spawn()
        });

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ForgeError::internal(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!(%addr, "promptforge listening");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ForgeError::internal(format!("Server error: {}", e)))?;

        if let Some(handle) = sweeper {
            handle.shutdown().await;
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

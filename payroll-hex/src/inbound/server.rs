//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use payroll_types::PayrollStore;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use crate::PayrollService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Payroll API.
pub struct HttpServer<R: PayrollStore> {
    state: Arc<AppState<R>>,
}

impl<R: PayrollStore> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: PayrollService<R>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/bootstrap", post(handlers::bootstrap::<R>))
            .route(
                "/api/keys",
                post(handlers::create_api_key::<R>).get(handlers::list_api_keys::<R>),
            )
            .route(
                "/api/payrolls",
                post(handlers::generate::<R>).get(handlers::list_payrolls::<R>),
            )
            .route("/api/payrolls/preview", post(handlers::preview::<R>))
            .route(
                "/api/payrolls/{id}",
                get(handlers::get_payroll::<R>)
                    .put(handlers::update_payroll::<R>)
                    .delete(handlers::remove_payroll::<R>),
            )
            .route("/api/payrolls/{id}/pay", post(handlers::mark_paid::<R>))
            .route(
                "/api/payrolls/{id}/cancel",
                post(handlers::cancel_payroll::<R>),
            )
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

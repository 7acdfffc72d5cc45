//! API server setup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::auth::TokenVerifier;
use crate::error::{Error, Result};
use crate::job::JobManager;
use crate::store::{CredentialsStore, FailureStore, SuccessStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    /// Wall-clock boot instant reported by `/health`.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// The job lifecycle engine.
    pub manager: Arc<JobManager>,
    /// Upload-token verifier.
    pub verifier: TokenVerifier,
    pub success: Arc<SuccessStore>,
    pub failures: Arc<FailureStore>,
    pub credentials: Arc<CredentialsStore>,
    /// Document root served under `/files/`.
    pub serve_dir: PathBuf,
}

impl AppState {
    pub fn new(
        manager: Arc<JobManager>,
        verifier: TokenVerifier,
        success: Arc<SuccessStore>,
        failures: Arc<FailureStore>,
        credentials: Arc<CredentialsStore>,
        serve_dir: PathBuf,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            started_at: chrono::Utc::now(),
            manager,
            verifier,
            success,
            failures,
            credentials,
            serve_dir,
        }
    }
}

/// API server.
pub struct ApiServer {
    bind_address: String,
    port: u16,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(bind_address: String, port: u16, state: AppState) -> Self {
        Self {
            bind_address,
            port,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token cancelled to initiate graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::config(format!("server error: {}", e)))?;

        Ok(())
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

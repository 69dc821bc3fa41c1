use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use vellum_repository::Repository;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::metrics::Metrics;
use crate::router::{build_router, AppState};

/// vellum HTTP server.
pub struct VellumServer {
    state: AppState,
}

impl VellumServer {
    pub fn new(config: ServerConfig, repository: Arc<Repository>, metrics: Arc<Metrics>) -> Self {
        Self {
            state: AppState::new(repository, metrics, config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.state.metrics
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    ///
    /// The metadata store runs for the lifetime of the listener. Once
    /// `shutdown` fires, in-flight requests are cancelled and drained, then
    /// the store is stopped.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        tracing::info!(addr = %self.state.config.bind_addr, "vellum server listening");

        let repository = Arc::clone(&self.state.repository);
        let run = repository.run();
        tokio::pin!(run);
        // Poll once so the store is running before the first request.
        let exited = tokio::select! {
            biased;
            result = &mut run => Some(result),
            _ = std::future::ready(()) => None,
        };
        if let Some(result) = exited {
            result?;
            return Err(ServerError::Internal("metadata store exited before serving".into()));
        }

        let token = self.state.shutdown.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                token.cancel();
            })
            .await;

        let (closed, ran) = tokio::join!(repository.close(), &mut run);
        closed?;
        ran?;
        tracing::info!("vellum server stopped");
        served.map_err(ServerError::Io)
    }
}

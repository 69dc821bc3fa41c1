use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use vellum_repository::{CancellationToken, Repository};

use crate::config::ServerConfig;
use crate::handler;
use crate::metrics::{self, Metrics};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server shuts down; requests run under child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(repository: Arc<Repository>, metrics: Arc<Metrics>, config: ServerConfig) -> Self {
        Self {
            repository,
            metrics,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the axum router with all vellum endpoints.
pub fn build_router(state: AppState) -> Router {
    let journal_limit = usize::try_from(state.config.max_journal_size).unwrap_or(usize::MAX);
    let journals = Router::new()
        .route(
            "/journals/",
            post(handler::post_journal).put(handler::put_journal),
        )
        .layer(DefaultBodyLimit::max(journal_limit));

    Router::new()
        .route(
            "/ledgers/",
            get(handler::get_ledger)
                .post(handler::post_ledger)
                .put(handler::put_ledger)
                .delete(handler::delete_ledger),
        )
        .route("/ledgers/revisions/", get(handler::get_revisions))
        .route("/ledgers/fork/", put(handler::fork_ledger))
        .route("/ledgers/fork/revisions/", get(handler::get_fork_revisions))
        .route(
            "/contents/",
            get(handler::get_content).post(handler::post_content),
        )
        .merge(journals)
        .route("/status/", get(handler::status))
        .route("/statistics/", get(handler::statistics))
        .route("/metrics/", get(handler::metrics))
        .fallback(handler::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), metrics::track))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP server and connection event handler.
//!
//! # Responsibilities
//! - Build the environment and initialize the pipeline once
//! - Create the axum Router with the event handler on every path
//! - Per event: translate, bind a writer, dispatch, drain the writer
//! - Own the fault policy: log and close, never retry
//!
//! # Data Flow
//! ```text
//! hyper request
//!     → handle_event (ConnectionId, guard)
//!     → request.rs translate ──✗──▶ 400 + Connection: close
//!     → ResponseWriter::channel
//!     → pipeline.service ──✗──▶ abort writer, 500 + Connection: close
//!     → FrameStream::into_response (streams until the writer closes)
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::BridgeConfig;
use crate::environment::{Environment, EnvironmentBuilder, EnvironmentError};
use crate::http::request::{translate, TranslatorOptions};
use crate::http::writer::{status_only, ResponseWriter};
use crate::net::ConnectionTracker;
use crate::observability::metrics;
use crate::pipeline::{CometPipeline, PipelineConfig, PipelineError};

/// Errors raised while constructing or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("environment setup failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into the event handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn CometPipeline>,
    pub translator: TranslatorOptions,
    pub tracker: ConnectionTracker,
}

/// HTTP server bridging hyper events into a [`CometPipeline`].
pub struct CometServer {
    router: Router,
    config: BridgeConfig,
    environment: Arc<Environment>,
    tracker: ConnectionTracker,
}

impl CometServer {
    /// Build the environment, initialize `pipeline` and wire the router.
    pub fn new<P: CometPipeline>(
        config: BridgeConfig,
        mut pipeline: P,
    ) -> Result<Self, ServerError> {
        let environment = Arc::new(EnvironmentBuilder::from_config(&config.environment).build()?);

        let pipeline_config = PipelineConfig::new(
            config.pipeline.name.clone(),
            Arc::clone(&environment),
            config.pipeline.init_params.clone(),
        );
        pipeline.init(&pipeline_config)?;

        tracing::info!(
            pipeline = %config.pipeline.name,
            base_path = %environment.base_path().display(),
            "Pipeline initialized"
        );

        let tracker = ConnectionTracker::new();
        let state = AppState {
            pipeline: Arc::new(pipeline),
            translator: TranslatorOptions::from(&config.translator),
            tracker: tracker.clone(),
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
            environment,
            tracker,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(handle_event))
            .route("/", any(handle_event))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Comet streams still open at that point are ended as if their writer
    /// had closed, so the graceful drain does not wait on idle long-polls.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Comet bridge listening");

        let tracker = self.tracker.clone();
        let shutdown = async move {
            shutdown.await;
            tracing::info!(
                open_streams = tracker.active_count(),
                "Ending open comet streams"
            );
            tracker.shutdown();
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Clone of the router, for driving the handler without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Number of response streams still open.
    pub fn open_streams(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Handle on the open-stream count that outlives [`CometServer::run`].
    pub fn connection_tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }
}

/// Handle one inbound event.
async fn handle_event(State(state): State<AppState>, request: Request<Body>) -> Response {
    let guard = state.tracker.track();
    let connection_id = guard.id();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    tracing::debug!(
        connection_id = %connection_id,
        method = %method,
        path = %path,
        "Inbound event"
    );

    let request = match translate(request, &state.translator) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                path = %path,
                error = %e,
                "Rejecting event; closing connection"
            );
            metrics::record_event("rejected");
            return status_only(StatusCode::BAD_REQUEST, "");
        }
    };

    let (writer, frames) = ResponseWriter::channel(connection_id);
    let mut frames = frames.with_guard(guard);

    if let Err(e) = state.pipeline.service(request, writer) {
        let discarded = frames.abort();
        tracing::warn!(
            connection_id = %connection_id,
            path = %path,
            error = %e,
            discarded_frames = discarded,
            "Pipeline failed; closing connection"
        );
        metrics::record_event("failed");
        return status_only(StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    metrics::record_event("dispatched");
    frames.into_response().await
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

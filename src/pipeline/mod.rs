//! Boundary to the request-processing pipeline.
//!
//! # Data Flow
//! ```text
//! startup:   Environment + init params → PipelineConfig → CometPipeline::init
//! per event: NormalizedRequest + ResponseWriter → CometPipeline::service
//!            (returns at once; writes may continue on the writer afterwards)
//! ```
//!
//! Routing, suspend/resume and comet-session bookkeeping belong to the
//! pipeline implementation, not to this crate.

pub mod echo;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::environment::{Environment, EnvironmentError};
use crate::http::request::NormalizedRequest;
use crate::http::writer::{ResponseWriter, WriterError};

pub use echo::EchoPipeline;

/// Errors a pipeline reports back to the connection handler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline initialization failed: {0}")]
    Init(String),

    #[error("pipeline failed to service request: {0}")]
    Service(String),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// What a pipeline is initialized with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    name: String,
    environment: Arc<Environment>,
    init_params: HashMap<String, String>,
}

impl PipelineConfig {
    pub fn new(
        name: impl Into<String>,
        environment: Arc<Environment>,
        init_params: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment,
            init_params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    pub fn init_parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.init_params.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A request-processing pipeline driven by the bridge.
///
/// `service` is called on the runtime thread that received the event and
/// should return quickly. Long-lived responses keep the writer (for
/// example inside a spawned task) and keep writing until they `close` it.
pub trait CometPipeline: Send + Sync + 'static {
    /// Called once, before the first event.
    fn init(&mut self, config: &PipelineConfig) -> Result<(), PipelineError>;

    /// Handle one inbound event.
    fn service(
        &self,
        request: NormalizedRequest,
        writer: ResponseWriter,
    ) -> Result<(), PipelineError>;
}

//! Comet bridge library.
//!
//! Adapts hyper's push-style request events into a pull-style pipeline
//! that can keep writing a response long after the event was delivered.

pub mod config;
pub mod environment;
pub mod http;
pub mod net;
pub mod observability;
pub mod pipeline;

pub use config::BridgeConfig;
pub use environment::Environment;
pub use http::{CometServer, NormalizedRequest, ResponseWriter};
pub use pipeline::{CometPipeline, PipelineConfig, PipelineError};

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the comet bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request translation policy.
    pub translator: TranslatorConfig,

    /// Execution environment handed to the pipeline.
    pub environment: EnvironmentConfig,

    /// Processing pipeline settings.
    pub pipeline: PipelineSettings,

    /// Body size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How inbound events are turned into normalized requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Reject events without a Content-Type header.
    ///
    /// Bodyless requests usually carry none, so turning this off lets
    /// plain GET long-polls through with no content type.
    pub require_content_type: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            require_content_type: true,
        }
    }
}

/// Environment record configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Root for resource lookups. Defaults to the working directory.
    pub base_path: Option<String>,

    /// Context path reported to the pipeline ("" for root).
    pub context_path: String,

    /// Environment-wide init parameters.
    pub init_params: HashMap<String, String>,

    /// String attributes present from startup.
    pub attributes: HashMap<String, String>,
}

/// Processing pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Name the pipeline is registered under.
    pub name: String,

    /// Init parameters passed to the pipeline (empty by default).
    pub init_params: HashMap<String, String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: "CometPipeline".to_string(),
            init_params: HashMap::new(),
        }
    }
}

/// Body size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body a bundled pipeline will read.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Execution environment handed to the processing pipeline.
//!
//! # Responsibilities
//! - Answer resource lookups relative to one base directory
//! - Hold init parameters and process-wide attributes
//! - Route pipeline log calls into tracing
//!
//! # Design Decisions
//! - Narrow surface: only what the pipeline actually queries
//! - Base directory resolved once at startup, never changes
//! - Attributes live in a `DashMap`, so connections may mutate them concurrently
//! - A missing resource is a quiet `None`, not an error
//! - Dispatchers, cross-context lookup and MIME resolution are reported as
//!   unsupported rather than faked

mod resources;

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use url::Url;

use crate::config::EnvironmentConfig;

/// Value stored under an attribute name.
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Reported by [`Environment::server_info`].
pub const SERVER_INFO: &str = concat!("comet-bridge/", env!("CARGO_PKG_VERSION"));

/// Errors raised by environment operations.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Intentionally unimplemented capability.
    #[error("{0} is not supported by this environment")]
    Unsupported(&'static str),

    #[error("cannot resolve base path {path}: {source}")]
    BasePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resource path '{0}' escapes the base directory")]
    InvalidPath(String),
}

impl EnvironmentError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EnvironmentError::Unsupported(_))
    }
}

/// Builder for [`Environment`].
#[derive(Default)]
pub struct EnvironmentBuilder {
    base_path: Option<PathBuf>,
    context_path: String,
    init_params: HashMap<String, String>,
    attributes: Vec<(String, Attribute)>,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the `[environment]` section of the config.
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        let mut builder = Self::new().context_path(config.context_path.clone());
        if let Some(base) = &config.base_path {
            builder = builder.base_path(base);
        }
        for (name, value) in &config.init_params {
            builder = builder.init_param(name.clone(), value.clone());
        }
        for (name, value) in &config.attributes {
            builder = builder.attribute(name.clone(), value.clone());
        }
        builder
    }

    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    pub fn init_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_params.insert(name.into(), value.into());
        self
    }

    pub fn attribute<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.attributes.push((name.into(), Arc::new(value)));
        self
    }

    /// Resolve the base directory and freeze the record.
    ///
    /// Without an explicit base path the process working directory is used.
    pub fn build(self) -> Result<Environment, EnvironmentError> {
        let base = match self.base_path {
            Some(path) => path,
            None => std::env::current_dir().map_err(|source| EnvironmentError::BasePath {
                path: PathBuf::from("."),
                source,
            })?,
        };
        let base_path = base
            .canonicalize()
            .map_err(|source| EnvironmentError::BasePath { path: base, source })?;

        tracing::debug!(base_path = %base_path.display(), "Environment base path resolved");

        Ok(Environment {
            base_path,
            context_path: self.context_path,
            init_params: self.init_params,
            attributes: self.attributes.into_iter().collect(),
        })
    }
}

/// Environment record shared by the pipeline and every connection.
pub struct Environment {
    base_path: PathBuf,
    context_path: String,
    init_params: HashMap<String, String>,
    attributes: DashMap<String, Attribute>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("base_path", &self.base_path)
            .field("context_path", &self.context_path)
            .field("init_params", &self.init_params)
            .field("attributes", &self.attribute_names())
            .finish()
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// Absolute directory every resource path is resolved against.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn context_name(&self) -> &'static str {
        "comet-bridge"
    }

    pub fn server_info(&self) -> &'static str {
        SERVER_INFO
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    pub fn init_parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.init_params.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // Attributes

    /// Fetch an attribute as `T`. `None` if absent or of another type.
    pub fn attribute<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.attributes.get(name)?.value());
        value.downcast::<T>().ok()
    }

    /// Fetch an attribute without knowing its type.
    pub fn raw_attribute(&self, name: &str) -> Option<Attribute> {
        self.attributes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn set_attribute<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.attributes.insert(name.into(), Arc::new(value));
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name).map(|(_, value)| value)
    }

    // Resources

    /// Every file below `path`, flattened. Empty if `path` does not exist.
    pub fn resource_paths(&self, path: &str) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        if let Some(dir) = resources::resolve(&self.base_path, path) {
            resources::collect_files(&dir, &mut files);
        }
        files
    }

    /// `file://` URL for `path`. The file need not exist.
    pub fn resource(&self, path: &str) -> Result<Url, EnvironmentError> {
        let resolved = resources::resolve(&self.base_path, path)
            .ok_or_else(|| EnvironmentError::InvalidPath(path.to_owned()))?;
        Url::from_file_path(&resolved).map_err(|_| EnvironmentError::InvalidPath(path.to_owned()))
    }

    /// Filesystem location for `path`, if it stays inside the base directory.
    pub fn real_path(&self, path: &str) -> Option<PathBuf> {
        resources::resolve(&self.base_path, path)
    }

    /// Open `path` for reading. A missing file or a directory is `None`, logged at trace.
    pub fn resource_as_stream(&self, path: &str) -> Option<File> {
        let Some(resolved) = resources::resolve(&self.base_path, path) else {
            tracing::trace!(path, "Resource path escapes base directory");
            return None;
        };
        match File::open(&resolved).and_then(|file| Ok((file.metadata()?.is_file(), file))) {
            Ok((true, file)) => Some(file),
            Ok((false, _)) => {
                tracing::trace!(path = %resolved.display(), "Resource is not a regular file");
                None
            }
            Err(e) => {
                tracing::trace!(path = %resolved.display(), error = %e, "Resource not found");
                None
            }
        }
    }

    // Logging

    pub fn log(&self, message: &str) {
        tracing::info!(context = self.context_name(), "{message}");
    }

    pub fn log_error(&self, message: &str, error: &dyn std::error::Error) {
        tracing::error!(context = self.context_name(), error = %error, "{message}");
    }

    // Unsupported by design

    pub fn context(&self, _uri_path: &str) -> Result<Arc<Environment>, EnvironmentError> {
        Err(EnvironmentError::Unsupported("cross-context lookup"))
    }

    pub fn mime_type(&self, _file: &str) -> Result<String, EnvironmentError> {
        Err(EnvironmentError::Unsupported("MIME type resolution"))
    }

    pub fn named_dispatcher(&self, _name: &str) -> Result<(), EnvironmentError> {
        Err(EnvironmentError::Unsupported("named dispatch"))
    }

    pub fn request_dispatcher(&self, _path: &str) -> Result<(), EnvironmentError> {
        Err(EnvironmentError::Unsupported("request dispatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn environment(dir: &tempfile::TempDir) -> Environment {
        Environment::builder()
            .base_path(dir.path())
            .context_path("/chat")
            .init_param("org.example.mode", "streaming")
            .attribute("greeting", String::from("hi"))
            .build()
            .unwrap()
    }

    #[test]
    fn defaults_to_working_directory() {
        let env = Environment::builder().build().unwrap();
        assert_eq!(env.base_path(), std::env::current_dir().unwrap().canonicalize().unwrap());
        assert_eq!(env.context_path(), "");
    }

    #[test]
    fn missing_base_path_fails() {
        let err = Environment::builder()
            .base_path("/definitely/not/here")
            .build()
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::BasePath { .. }));
    }

    #[test]
    fn from_config_carries_params_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EnvironmentConfig {
            base_path: Some(dir.path().display().to_string()),
            context_path: "/app".into(),
            ..Default::default()
        };
        config.init_params.insert("b".into(), "2".into());
        config.init_params.insert("a".into(), "1".into());
        config.attributes.insert("motd".into(), "welcome".into());

        let env = EnvironmentBuilder::from_config(&config).build().unwrap();
        assert_eq!(env.context_path(), "/app");
        assert_eq!(env.init_parameter("a"), Some("1"));
        assert_eq!(env.init_parameter_names(), vec!["a", "b"]);
        assert_eq!(env.attribute::<String>("motd").as_deref().map(String::as_str), Some("welcome"));
    }

    #[test]
    fn attributes_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);

        assert_eq!(env.attribute::<String>("greeting").unwrap().as_str(), "hi");
        assert!(env.attribute::<u32>("greeting").is_none());

        env.set_attribute("count", 3u32);
        assert_eq!(*env.attribute::<u32>("count").unwrap(), 3);
        assert_eq!(env.attribute_names(), vec!["count".to_string(), "greeting".to_string()]);

        assert!(env.remove_attribute("count").is_some());
        assert!(env.attribute::<u32>("count").is_none());
        assert!(env.raw_attribute("count").is_none());
        assert!(env.remove_attribute("count").is_none());
    }

    #[test]
    fn attributes_can_be_mutated_from_many_threads() {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(environment(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let env = Arc::clone(&env);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        env.set_attribute(format!("t{i}-{j}"), j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(env.attribute_names().len(), 801);
    }

    #[test]
    fn resource_paths_lists_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("static/js")).unwrap();
        fs::write(dir.path().join("static/index.html"), "<html/>").unwrap();
        fs::write(dir.path().join("static/js/app.js"), "//").unwrap();
        let env = environment(&dir);

        let base = env.base_path().to_path_buf();
        let paths = env.resource_paths("/static");
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&base.join("static/index.html")));
        assert!(paths.contains(&base.join("static/js/app.js")));

        assert!(env.resource_paths("/nope").is_empty());
        assert!(env.resource_paths("/../").is_empty());
    }

    #[test]
    fn resource_as_stream_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "hello").unwrap();
        let env = environment(&dir);

        let mut contents = String::new();
        env.resource_as_stream("/hello.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn resource_as_stream_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);
        assert!(env.resource_as_stream("/missing.txt").is_none());
        assert!(env.resource_as_stream("../outside").is_none());
    }

    #[test]
    fn resource_as_stream_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();
        let env = environment(&dir);
        assert!(env.resource_as_stream("/static").is_none());
        assert!(env.resource_as_stream("/").is_none());
    }

    #[test]
    fn resource_urls_and_real_paths() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);

        let url = env.resource("/static/app.js").unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/static/app.js"));
        assert_eq!(
            env.real_path("static/app.js"),
            Some(env.base_path().join("static/app.js"))
        );
        assert!(matches!(env.resource("../x"), Err(EnvironmentError::InvalidPath(_))));
    }

    #[test]
    fn unsupported_operations_fail_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);

        assert!(env.context("/other").unwrap_err().is_unsupported());
        assert!(env.mime_type("a.html").unwrap_err().is_unsupported());
        assert!(env.named_dispatcher("default").unwrap_err().is_unsupported());
        assert!(env.request_dispatcher("/x").unwrap_err().is_unsupported());
    }

    #[test]
    fn server_info_names_the_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);
        assert!(env.server_info().starts_with("comet-bridge/"));
        env.log("environment ready");
    }
}

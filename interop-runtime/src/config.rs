//! Runtime configuration.
//!
//! Loaded from a JSON document (every field optional) or from the
//! environment:
//!
//! ```json
//! {
//!   "log": { "filter": "interop_runtime=debug", "json": false },
//!   "worker": { "thread_name": "sensor-actor", "stack_size": 262144 },
//!   "diagnostics": { "history": 128 }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default log directive.
pub const DEFAULT_LOG_FILTER: &str = "interop_runtime=info";
/// Default worker thread name.
pub const DEFAULT_WORKER_NAME: &str = "interop-worker";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log: LogConfig,
    pub worker: WorkerConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` still applies on top.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Worker thread actor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// OS thread name.
    pub thread_name: String,
    /// Stack size in bytes; the platform default when absent.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_WORKER_NAME.to_string(),
            stack_size: None,
        }
    }
}

impl WorkerConfig {
    /// Default settings with a specific thread name.
    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..Self::default()
        }
    }
}

/// Diagnostic history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Number of records kept; 0 disables the history.
    pub history: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { history: 256 }
    }
}

impl RuntimeConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build from `INTEROP_LOG`, `INTEROP_LOG_JSON=1`, and `INTEROP_WORKER_NAME`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = var("INTEROP_LOG") {
            config.log.filter = filter;
        }
        config.log.json = var("INTEROP_LOG_JSON").as_deref() == Some("1");
        if let Some(name) = var("INTEROP_WORKER_NAME") {
            config.worker.thread_name = name;
        }
        config
    }

    /// Install logging and apply diagnostics settings.
    pub fn apply(&self) -> Result<()> {
        crate::logging::init(&self.log)?;
        crate::diagnostics::configure(&self.diagnostics);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.worker.thread_name, DEFAULT_WORKER_NAME);
        assert_eq!(config.diagnostics.history, 256);
    }

    #[test]
    fn partial_document() {
        let config = RuntimeConfig::from_json(
            r#"{"log":{"json":true},"worker":{"thread_name":"sensor","stack_size":65536}}"#,
        )
        .unwrap();
        assert!(config.log.json);
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.worker.thread_name, "sensor");
        assert_eq!(config.worker.stack_size, Some(65536));
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = RuntimeConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn environment_overrides() {
        let config = RuntimeConfig::from_vars(vars(&[
            ("INTEROP_LOG", "interop_runtime=trace"),
            ("INTEROP_LOG_JSON", "1"),
            ("INTEROP_WORKER_NAME", "sensor-actor"),
        ]));
        assert_eq!(config.log.filter, "interop_runtime=trace");
        assert!(config.log.json);
        assert_eq!(config.worker.thread_name, "sensor-actor");
        assert_eq!(config.diagnostics, DiagnosticsConfig::default());
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(RuntimeConfig::from_vars(vars(&[])), RuntimeConfig::default());
        // only the literal "1" turns JSON on
        let config = RuntimeConfig::from_vars(vars(&[("INTEROP_LOG_JSON", "true")]));
        assert!(!config.log.json);
    }

    #[test]
    fn apply_installs_logging_and_history() {
        let config = RuntimeConfig::default();
        crate::logging::install(&config.log, true).unwrap();
        config.apply().unwrap();

        let mut broken = RuntimeConfig::default();
        broken.log.filter = "interop_runtime=notalevel".to_string();
        assert!(matches!(broken.apply(), Err(Error::Config(_))));
    }
}

//! Centralized configuration for the PLANit bridge.
//!
//! `GatewayConfig` holds protocol and timing constants. `EngineLocator`
//! describes where the engine implementation lives and how to launch it.

use crate::error::{PlanitError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Protocol and timing constants shared by the client and the engine side.
pub struct GatewayConfig;

impl GatewayConfig {
    /// Version of the request/response protocol spoken over the channel.
    pub const PROTOCOL_VERSION: &'static str = "1";
    /// Line the engine prints on stdout once its gateway server accepts connections.
    pub const READY_LINE_PREFIX: &'static str = "GATEWAY_PORT=";
    pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Grace period between a graceful stop request and a forced kill.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
    /// Upper bound for the best-effort `gateway.shutdown` request.
    pub const SHUTDOWN_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024; // 64MB
    pub const MAX_CONNECTIONS: usize = 8;
}

/// Location and launch parameters of the engine implementation.
///
/// Classpath entries are named so that log output and error messages can refer
/// to them; their paths are resolved relative to `install_root` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineLocator {
    pub install_root: PathBuf,
    pub classpath: BTreeMap<String, PathBuf>,
    pub entry_point_class: String,
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default)]
    pub jvm_options: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_startup_timeout", with = "duration_secs")]
    pub startup_timeout: Duration,
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn default_startup_timeout() -> Duration {
    GatewayConfig::STARTUP_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl EngineLocator {
    /// Entry point of the engine's gateway implementation.
    pub const PLANIT_ENTRY_POINT: &'static str = "org.planit.python.PLANitJ2Py";
    /// Environment variable naming the installation root.
    pub const HOME_ENV: &'static str = "PLANIT_HOME";
    /// Environment variable naming the java executable.
    pub const JAVA_ENV: &'static str = "PLANIT_JAVA";

    /// Create a locator with no classpath entries.
    pub fn new(install_root: impl Into<PathBuf>, entry_point_class: impl Into<String>) -> Self {
        Self {
            install_root: install_root.into(),
            classpath: BTreeMap::new(),
            entry_point_class: entry_point_class.into(),
            java: default_java(),
            jvm_options: Vec::new(),
            env: BTreeMap::new(),
            log_file: None,
            startup_timeout: GatewayConfig::STARTUP_TIMEOUT,
        }
    }

    /// Locator for a standard PLANit installation under `install_root`.
    pub fn planit(install_root: impl Into<PathBuf>) -> Self {
        Self::new(install_root, Self::PLANIT_ENTRY_POINT)
            .with_classpath_entry("gateway", "rsc/PLANitJ2Py-0.0.4-beta.jar")
            .with_classpath_entry("gateway-wrapper", "rsc/PLANitJ2Py-0.0.4-SNAPSHOT.jar")
            .with_classpath_entry("planit", "rsc/PLANit-0.0.4-SNAPSHOT.jar")
            .with_classpath_entry("planit-io", "rsc/PLANitIO-0.0.4-SNAPSHOT.jar")
    }

    /// Build a PLANit locator from the environment.
    ///
    /// `PLANIT_HOME` selects the installation root (default: `<data dir>/planit`).
    /// `PLANIT_JAVA` or `JAVA_HOME/bin/java` selects the java executable.
    pub fn from_env() -> Result<Self> {
        let install_root = match std::env::var_os(Self::HOME_ENV) {
            Some(root) => PathBuf::from(root),
            None => dirs::data_dir()
                .map(|dir| dir.join("planit"))
                .ok_or_else(|| PlanitError::Config {
                    message: format!(
                        "{} is not set and no platform data directory is available",
                        Self::HOME_ENV
                    ),
                })?,
        };

        let mut locator = Self::planit(install_root);
        if let Some(java) = std::env::var_os(Self::JAVA_ENV) {
            locator.java = PathBuf::from(java);
        } else if let Some(java_home) = std::env::var_os("JAVA_HOME") {
            locator.java = PathBuf::from(java_home).join("bin").join("java");
        }
        Ok(locator)
    }

    /// Load a locator from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| PlanitError::io_with_path(e, path))?;
        serde_json::from_str(&contents).map_err(|e| PlanitError::Config {
            message: format!("Invalid engine locator {}: {}", path.display(), e),
        })
    }

    /// Add a named classpath entry.
    pub fn with_classpath_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.classpath.insert(name.into(), path.into());
        self
    }

    /// Set the java executable.
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    /// Add an option placed before the classpath on the command line.
    pub fn with_jvm_option(mut self, option: impl Into<String>) -> Self {
        self.jvm_options.push(option.into());
        self
    }

    /// Add an environment variable for the engine process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Route engine stderr to a log file.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Resolve every classpath entry against the installation root.
    ///
    /// Fails with a startup error naming the first entry that does not exist.
    pub fn resolve_classpath(&self) -> Result<Vec<PathBuf>> {
        self.classpath
            .iter()
            .map(|(name, entry)| {
                let resolved = if entry.is_absolute() {
                    entry.clone()
                } else {
                    self.install_root.join(entry)
                };
                if resolved.exists() {
                    Ok(resolved)
                } else {
                    Err(PlanitError::startup(format!(
                        "classpath entry '{}' not found at {}",
                        name,
                        resolved.display()
                    )))
                }
            })
            .collect()
    }

    /// Join resolved classpath entries with the platform path separator.
    pub fn joined_classpath(&self) -> Result<Option<OsString>> {
        let entries = self.resolve_classpath()?;
        if entries.is_empty() {
            return Ok(None);
        }
        std::env::join_paths(entries)
            .map(Some)
            .map_err(|e| PlanitError::Config {
                message: format!("Invalid classpath entry: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_planit_locator_defaults() {
        let locator = EngineLocator::planit("/opt/planit");

        assert_eq!(locator.entry_point_class, "org.planit.python.PLANitJ2Py");
        assert_eq!(locator.classpath.len(), 4);
        assert_eq!(locator.java, PathBuf::from("java"));
        assert_eq!(locator.startup_timeout, GatewayConfig::STARTUP_TIMEOUT);
    }

    #[test]
    fn test_resolve_classpath_relative_to_install_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("engine.jar"), b"").unwrap();

        let locator = EngineLocator::new(temp_dir.path(), "org.example.Main")
            .with_classpath_entry("engine", "engine.jar");

        let resolved = locator.resolve_classpath().unwrap();
        assert_eq!(resolved, vec![temp_dir.path().join("engine.jar")]);
        assert!(locator.joined_classpath().unwrap().is_some());
    }

    #[test]
    fn test_missing_classpath_entry_is_startup_failure() {
        let temp_dir = TempDir::new().unwrap();
        let locator = EngineLocator::planit(temp_dir.path());

        let err = locator.resolve_classpath().unwrap_err();
        assert!(err.is_startup_failure());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_classpath_joins_to_none() {
        let locator = EngineLocator::new("/tmp", "org.example.Main");
        assert!(locator.joined_classpath().unwrap().is_none());
    }

    #[test]
    fn test_load_locator_from_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{
                "install_root": "/opt/planit",
                "classpath": {"planit": "rsc/PLANit.jar"},
                "entry_point_class": "org.planit.python.PLANitJ2Py",
                "jvm_options": ["-Xmx2g"],
                "startup_timeout": 12.5
            }"#,
        )
        .unwrap();

        let locator = EngineLocator::load(&path).unwrap();
        assert_eq!(locator.jvm_options, vec!["-Xmx2g".to_string()]);
        assert_eq!(locator.java, PathBuf::from("java"));
        assert_eq!(locator.startup_timeout, Duration::from_millis(12_500));
    }

    #[test]
    fn test_load_invalid_locator_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = EngineLocator::load(&path).unwrap_err();
        assert!(matches!(err, PlanitError::Config { .. }));
    }
}

//! Error types for the PLANit bridge.
//!
//! Four failure kinds cross the bridge and reach the caller of a proxy method
//! unchanged: startup failures, channel errors, remote invocation errors and
//! mapping errors. The remaining variants cover local configuration and I/O.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::protocol::codes;

/// What a mapping error failed to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// A declared remote type has no local wrapper.
    RemoteType,
    /// An enum or enum constant has no registered remote mapping.
    EnumValue,
    /// A wrapper was asked for an operation it does not declare.
    Operation,
    /// A returned value did not have the declared local shape.
    ReturnValue,
}

impl std::fmt::Display for MappingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MappingKind::RemoteType => "remote type",
            MappingKind::EnumValue => "enum value",
            MappingKind::Operation => "operation",
            MappingKind::ReturnValue => "return value",
        };
        f.write_str(s)
    }
}

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum PlanitError {
    // Startup failures
    #[error("Engine startup failed: {message}")]
    StartupFailed { message: String },

    #[error("Engine did not become ready within {0:?}")]
    StartupTimeout(Duration),

    // Channel errors
    #[error("Engine channel lost during {operation}: {reason}")]
    ChannelLost { operation: String, reason: String },

    // Remote invocation errors
    #[error("Remote call {target_type}.{method}({}) failed [{code}]: {message}", .arg_types.join(", "))]
    RemoteInvocation {
        target_type: String,
        method: String,
        arg_types: Vec<String>,
        code: i32,
        message: String,
    },

    // Mapping errors
    #[error("No mapping for {kind} '{name}'")]
    Mapping { kind: MappingKind, name: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, PlanitError>;

impl From<std::io::Error> for PlanitError {
    fn from(err: std::io::Error) -> Self {
        PlanitError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PlanitError {
    fn from(err: serde_json::Error) -> Self {
        PlanitError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PlanitError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PlanitError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub fn startup(message: impl Into<String>) -> Self {
        PlanitError::StartupFailed {
            message: message.into(),
        }
    }

    pub fn channel_lost(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanitError::ChannelLost {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn mapping(kind: MappingKind, name: impl Into<String>) -> Self {
        PlanitError::Mapping {
            kind,
            name: name.into(),
        }
    }

    /// True for failures that happened before a channel existed.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            PlanitError::StartupFailed { .. } | PlanitError::StartupTimeout(_)
        )
    }

    /// True when the engine state behind this error is no longer usable.
    pub fn is_channel_error(&self) -> bool {
        matches!(self, PlanitError::ChannelLost { .. })
    }

    pub fn is_remote_invocation(&self) -> bool {
        matches!(self, PlanitError::RemoteInvocation { .. })
    }

    pub fn is_mapping_error(&self) -> bool {
        matches!(self, PlanitError::Mapping { .. })
    }

    /// Convert to a JSON-RPC error code for the engine-side server.
    ///
    /// Standard JSON-RPC error codes are used for protocol problems; the
    /// application range carries the engine-side failure kinds:
    /// - -32010: engine invocation failed
    /// - -32011: unknown object handle
    /// - -32012: unknown enum class or constant
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            PlanitError::RemoteInvocation { code, .. } => *code,
            PlanitError::Mapping {
                kind: MappingKind::EnumValue,
                ..
            } => codes::UNKNOWN_ENUM,
            PlanitError::Mapping { .. } => codes::METHOD_NOT_FOUND,
            PlanitError::Validation { .. } => codes::INVALID_PARAMS,
            PlanitError::Json { .. } => codes::PARSE_ERROR,
            _ => codes::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_invocation_display_names_operation() {
        let err = PlanitError::RemoteInvocation {
            target_type: "org.planit.StopCriterion".into(),
            method: "setEpsilon".into(),
            arg_types: vec!["float".into()],
            code: codes::ENGINE_INVOCATION_FAILED,
            message: "epsilon must be positive".into(),
        };
        let text = err.to_string();
        assert!(text.contains("org.planit.StopCriterion.setEpsilon(float)"));
        assert!(text.contains("epsilon must be positive"));
    }

    #[test]
    fn test_error_kind_predicates() {
        assert!(PlanitError::StartupTimeout(Duration::from_secs(1)).is_startup_failure());
        assert!(PlanitError::channel_lost("Project.run", "reset").is_channel_error());
        assert!(PlanitError::mapping(MappingKind::RemoteType, "x.Y").is_mapping_error());
        assert!(!PlanitError::startup("boom").is_channel_error());
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            PlanitError::mapping(MappingKind::EnumValue, "OutputType.NOPE").to_rpc_error_code(),
            codes::UNKNOWN_ENUM
        );
        assert_eq!(
            PlanitError::Other("x".into()).to_rpc_error_code(),
            codes::INTERNAL_ERROR
        );
    }
}

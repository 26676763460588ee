//! Error types for st-core

use thiserror::Error;

/// Core error type for Strata
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Invalid configuration value
    #[error("[C002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C003: Project directory not found
    #[error("[C003] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// C004: Change-unit identifier does not follow the `YYYYMMDDHHMMSS_slug` convention
    #[error("[C004] Invalid change unit id '{id}': {reason}")]
    InvalidUnitId { id: String, reason: String },

    /// C005: Two change-unit files declare the same identifier
    #[error("[C005] Duplicate change unit id '{id}' in {path1} and {path2}")]
    DuplicateUnit {
        id: String,
        path1: String,
        path2: String,
    },

    /// C006: Change-unit file could not be parsed
    #[error("[C006] Failed to parse change unit {path}: {details}")]
    UnitParseError { path: String, details: String },

    /// C007: Change-unit content is structurally invalid
    #[error("[C007] Invalid change unit '{id}': {reason}")]
    InvalidUnit { id: String, reason: String },

    /// C008: Catalog operation (reference values / email templates) is malformed
    #[error("[C008] Invalid catalog operation: {message}")]
    InvalidCatalogOp { message: String },

    /// C009: IO error
    #[error("[C009] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// C010: IO error with file path context
    #[error("[C010] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C011: YAML parse error
    #[error("[C011] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

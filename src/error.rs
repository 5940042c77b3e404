//! Error types for Quarry.

use thiserror::Error;

/// Main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] crate::warehouse::WarehouseError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid routing pattern `{pattern}` for domain `{domain}`: {message}")]
    InvalidPattern {
        domain: String,
        pattern: String,
        message: String,
    },
}

/// Schema catalog errors.
///
/// Fetch failures propagate to the caller and are never cached, so a
/// transient catalog outage does not poison the TTL window.
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("Failed to fetch schema for `{table}`: {message}")]
    Fetch { table: String, message: String },

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

/// Routing classifier errors.
///
/// These never surface through `IntentRouter::route`; the router degrades to
/// keyword scoring and logs the failure instead.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Classification model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Classification model timed out after {0}ms")]
    ModelTimeout(u64),

    #[error("Classification model returned an unusable label: {0}")]
    UnusableLabel(String),
}

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

//! Error types for fleet setup

use std::path::PathBuf;

use rcc_adapter::RadioId;
use thiserror::Error;

/// Errors raised while loading or validating the fleet configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No config path given and no config directory could be found
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    /// A radio entry has an empty id
    #[error("radio entry {index} has an empty id")]
    EmptyRadioId { index: usize },

    /// Two radio entries share an id
    #[error("duplicate radio id: {0}")]
    DuplicateRadio(RadioId),

    /// Adapter type is not one this build knows
    #[error("radio {radio}: unknown adapter type \"{adapter}\"")]
    UnknownAdapter { radio: RadioId, adapter: String },

    /// Explicit capabilities are unusable
    #[error("radio {radio}: invalid capabilities: {reason}")]
    InvalidCapabilities { radio: RadioId, reason: String },

    /// A tuning value is out of bounds
    #[error("invalid {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Errors raised while building or wiring the fleet
#[derive(Debug, Error)]
pub enum FleetError {
    /// Radio not found
    #[error("radio not found: {0}")]
    RadioNotFound(RadioId),

    /// Radio already registered
    #[error("radio already exists: {0}")]
    RadioExists(RadioId),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

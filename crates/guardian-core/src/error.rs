//! Error types for Privacy Guardian
//!
//! Only [`ConfigError`] is allowed to stop a unit from being constructed.
//! Everything else is caught at the `Agent::process` boundary and turned into
//! a `...Failed` / `...Skipped` event plus a fallback value.

use thiserror::Error;

/// Result type alias for Privacy Guardian operations
pub type Result<T> = std::result::Result<T, GuardianError>;

/// Umbrella error type
#[derive(Error, Debug)]
pub enum GuardianError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Oracle errors
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Scanner errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Enhancement errors
    #[error("Enhancement error: {0}")]
    Enhancement(#[from] EnhancementError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup contract violations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures of a call to the external AI oracle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Network or server failure for this one call
    #[error("transport failure: {0}")]
    Transport(String),

    /// Credentials refused or quota exhausted; further calls will fail the same way
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("oracle call timed out after {0}s")]
    Timeout(u64),

    /// The transport answered but the envelope was not understood
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl OracleError {
    /// Whether this error should abort the whole enhancement run rather than
    /// a single file group.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, OracleError::Rejected(_))
    }
}

/// Failures of the external rule-engine scanner
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to spawn scanner `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("scanner exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("scanner output contained no JSON payload")]
    NoPayload,

    #[error("scanner payload could not be decoded: {0}")]
    Payload(String),
}

/// The oracle text did not contain a usable structured block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no structured payload found in oracle response ({tried} candidates tried)")]
pub struct ExtractionError {
    pub tried: usize,
}

/// Errors that abort an enhancement run
#[derive(Error, Debug)]
pub enum EnhancementError {
    #[error("oracle aborted analysis of {file}: {source}")]
    Oracle { file: String, source: OracleError },
}

//! Error types for the Rasaayan core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the PubChem client, LLM providers, reaction simulation,
//! persistence and configuration.

use std::path::PathBuf;

/// Top-level error type for the Rasaayan core library.
#[derive(Debug, thiserror::Error)]
pub enum RasaayanError {
    #[error("PubChem error: {0}")]
    PubChem(#[from] PubChemError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the PubChem REST client.
#[derive(Debug, thiserror::Error)]
pub enum PubChemError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Unexpected response from {url}: {message}")]
    ResponseParse { url: String, message: String },

    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Model not supported: {model}")]
    UnsupportedModel { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Model returned no content (finish reason: {finish_reason})")]
    EmptyResponse { finish_reason: String },
}

/// Errors from reaction simulation and goal interpretation requests.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    PubChem(#[from] PubChemError),

    #[error("Model reply is not a valid result: {message}")]
    Parse { message: String },

    #[error("Result rejected by policy: {message}")]
    Validation { message: String },

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Request was cancelled")]
    Cancelled,

    #[error("No reactants in the workspace")]
    EmptyReactants,

    #[error("Goal text is empty")]
    EmptyGoal,

    #[error("A {kind} request is already in flight")]
    Busy { kind: &'static str },
}

/// Errors from the history and inventory store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to persist '{key}': {message}")]
    Write { key: String, message: String },

    #[error("Failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("History entry not found: {id}")]
    HistoryNotFound { id: String },

    #[error("Product index {index} out of range (result has {len})")]
    ProductOutOfRange { index: usize, len: usize },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `RasaayanError`.
pub type Result<T> = std::result::Result<T, RasaayanError>;

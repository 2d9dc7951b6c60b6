//! Error types for the testnet tool

use thiserror::Error;

use crate::scenario::ScenarioStep;

/// Testnet tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("HTTP error: {0}")]
    Http(String),

    /// Exchange rejected the request; code and message are passed through as-is
    #[error("Binance API error {code} (HTTP {status}): {msg}")]
    Api { status: u16, code: i64, msg: String },

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("API key and secret are required for signed requests")]
    MissingCredentials,

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Postcondition failed: expected {expected}, got {actual}")]
    Postcondition { expected: String, actual: String },

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Interrupted before the scenario finished")]
    Interrupted,

    #[error("{step} failed: {source}")]
    Scenario {
        step: ScenarioStep,
        #[source]
        source: Box<ToolError>,
    },
}

impl ToolError {
    /// Attach the scenario step that was running when the error surfaced
    pub fn during(step: ScenarioStep) -> impl FnOnce(ToolError) -> ToolError {
        move |source| ToolError::Scenario {
            step,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Http(err.to_string())
    }
}

impl From<config::ConfigError> for ToolError {
    fn from(err: config::ConfigError) -> Self {
        ToolError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

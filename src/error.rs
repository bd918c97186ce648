use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that may occur anywhere in this library.
///
/// Each variant corresponds to one row of the error taxonomy: the wire-level binding that
/// surfaces an [`Error`] (HTTP, WebSocket JSON-RPC, CoAP) is responsible for mapping it to the
/// protocol-appropriate status code or error object; this enum itself carries no wire
/// knowledge.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// Unknown Thing, interaction, or property name.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was attempted on a property declared read-only.
    #[error("property `{0}` is not writable")]
    NotWritable(String),

    /// An action was invoked but has no handler set.
    #[error("action `{0}` has no handler")]
    NoHandler(String),

    /// A payload did not conform to the declared schema, or the JSON was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A user-supplied handler raised while running.
    #[error("handler error: {0}")]
    HandlerError(String),

    /// A client could not find a form for the requested interaction/verb.
    #[error("no form found for `{0}`")]
    FormNotFound(String),

    /// A transport-level failure: timeout, connection refused, non-success status.
    #[error("protocol client error: {0}")]
    ProtocolClientError(String),

    /// Client selection could not classify the named interaction.
    #[error("unknown interaction: {0}")]
    UnknownInteraction(String),

    /// No attached client supports the requested interaction.
    #[error("no client for interaction: {0}")]
    NoClientForInteraction(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The supplied Thing Description could not be parsed or failed validation.
    #[error("invalid thing description: {0}")]
    InvalidThingDescription(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The taxonomy kind as a stable, machine-readable tag. Used by wire bindings that
    /// serialize `{"kind": ..., "message": ...}`-style error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::NotWritable(_) => "NotWritable",
            Error::NoHandler(_) => "NoHandler",
            Error::InvalidInput(_) => "InvalidInput",
            Error::HandlerError(_) => "HandlerError",
            Error::FormNotFound(_) => "FormNotFound",
            Error::ProtocolClientError(_) => "ProtocolClientError",
            Error::UnknownInteraction(_) => "UnknownInteraction",
            Error::NoClientForInteraction(_) => "NoClientForInteraction",
            Error::Cancelled => "Cancelled",
            Error::InvalidThingDescription(_) => "InvalidThingDescription",
            Error::Internal(_) => "Internal",
        }
    }

    /// The JSON-RPC 2.0 error code for this taxonomy kind.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            Error::NotFound(_)
            | Error::NotWritable(_)
            | Error::NoHandler(_)
            | Error::UnknownInteraction(_) => -32601,
            Error::InvalidInput(_) => -32602,
            Error::HandlerError(_) => -32000,
            Error::FormNotFound(_)
            | Error::ProtocolClientError(_)
            | Error::NoClientForInteraction(_)
            | Error::Cancelled
            | Error::InvalidThingDescription(_)
            | Error::Internal(_) => -32603,
        }
    }

    /// The HTTP status code for this taxonomy kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::NotWritable(_) => 405,
            Error::NoHandler(_) => 501,
            Error::InvalidInput(_) | Error::InvalidThingDescription(_) => 400,
            Error::HandlerError(_) => 500,
            Error::FormNotFound(_)
            | Error::ProtocolClientError(_)
            | Error::UnknownInteraction(_)
            | Error::NoClientForInteraction(_)
            | Error::Cancelled
            | Error::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::ProtocolClientError(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::ProtocolClientError(error.to_string())
    }
}

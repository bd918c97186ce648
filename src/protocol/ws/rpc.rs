use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// An inbound JSON-RPC 2.0–like request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Always `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Correlates a response to this request.
    pub id: String,
    /// One of `read_property`, `write_property`, `invoke_action`, `on_property_change`,
    /// `on_event`, `dispose`.
    pub method: String,
    /// Method-specific arguments.
    #[serde(default)]
    pub params: Value,
}

/// An outbound message: either a response to a request, or a server-initiated notification.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    /// A response correlated to a request id.
    Response(Response),
    /// A subscription emission, uncorrelated to any request.
    Notification(Notification),
}

/// A JSON-RPC response: either `result` or `error`, never both.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl Response {
    /// A success response carrying `result`.
    pub fn ok(id: String, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response built from the taxonomy in [`crate::error::Error`].
    pub fn err(id: String, error: &Error) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code: error.json_rpc_code(),
                message: error.to_string(),
                data: serde_json::json!({ "kind": error.kind() }),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Value,
}

/// A server-initiated `emit` notification delivering one subscription's payload.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    method: &'static str,
    params: NotificationParams,
}

#[derive(Debug, Clone, Serialize)]
struct NotificationParams {
    subscription: String,
    data: Value,
}

impl Notification {
    /// An `emit` notification for `subscription` carrying `data`.
    pub fn emit(subscription: String, data: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "emit",
            params: NotificationParams { subscription, data },
        }
    }
}

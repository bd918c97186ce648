/// WebSocket server binding: a JSON-RPC 2.0–like bidirectional mapping of interactions.
pub mod server;

/// WebSocket client binding.
pub mod client;

/// The request/response/notification envelopes shared by the server and client bindings.
pub mod rpc;

pub use client::WsClient;
pub use server::WsServer;

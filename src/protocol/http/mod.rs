/// HTTP server binding: REST mapping of interactions.
pub mod server;

/// HTTP client binding.
pub mod client;

pub use client::HttpClient;
pub use server::HttpServer;

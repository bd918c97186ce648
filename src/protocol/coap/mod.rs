/// CoAP server binding: Observe-based mapping of interactions.
pub mod server;

/// CoAP client binding, polling CoAP's Observe option the way the original `wotpy` CoAP client
/// does for action completion (`wotpy/protocols/coap/client.py`).
pub mod client;

pub use client::CoapClient;
pub use server::CoapServer;

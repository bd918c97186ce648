#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// Thing Description types: `Thing`, its Property/Action/Event affordances, and `Form`.
pub mod td;

/// The observable bus backing property-change and event subscriptions.
pub mod bus;

/// The server-side Thing object: handlers, stored property values, and the bus they feed.
pub mod exposed_thing;

/// The client-side Thing object: reads, writes, and subscriptions routed through a servient's
/// protocol clients.
pub mod consumed_thing;

/// Protocol bindings (HTTP, WebSocket, and the optional CoAP binding) and the `ServerBinding`/
/// `ClientBinding` contracts they implement.
pub mod protocol;

/// The servient: the registry of exposed Things, attached protocol bindings, and the TD
/// catalogue endpoint.
pub mod servient;

/// The `Wot` facade: `produce`, `consume`, and `fetch`.
pub mod wot;

/// Possible errors in this library.
pub mod error;

/// Servient configuration.
pub mod config;

/// Logging/tracing setup.
pub mod logging;

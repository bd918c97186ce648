use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_stream::Stream;

use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::td::{Form, Thing};

/// HTTP server/client binding.
pub mod http;

/// WebSocket server/client binding.
pub mod ws;

/// CoAP server/client binding, built only with the `coap` feature.
#[cfg(feature = "coap")]
pub mod coap;

/// One of the wire protocols a server or client binding speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain HTTP.
    Http,
    /// TLS-wrapped HTTP.
    Https,
    /// Plain WebSocket.
    Ws,
    /// TLS-wrapped WebSocket.
    Wss,
    /// Plain CoAP.
    Coap,
    /// DTLS-wrapped CoAP.
    Coaps,
    /// Plain MQTT. Carried as a tag only; no binding in this crate implements it.
    Mqtt,
    /// TLS-wrapped MQTT.
    Mqtts,
}

impl Protocol {
    /// The URL scheme string for this protocol tag.
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
            Protocol::Coap => "coap",
            Protocol::Coaps => "coaps",
            Protocol::Mqtt => "mqtt",
            Protocol::Mqtts => "mqtts",
        }
    }

    /// Whether a form's scheme belongs to this protocol (a binding serves both its plain and
    /// secure scheme transparently).
    pub fn matches_scheme(self, scheme: &str) -> bool {
        match self {
            Protocol::Http | Protocol::Https => scheme == "http" || scheme == "https",
            Protocol::Ws | Protocol::Wss => scheme == "ws" || scheme == "wss",
            Protocol::Coap | Protocol::Coaps => scheme == "coap" || scheme == "coaps",
            Protocol::Mqtt | Protocol::Mqtts => scheme == "mqtt" || scheme == "mqtts",
        }
    }
}

/// Which kind of request a client call is about to make; used for form selection by `rel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Read a property's current value.
    ReadProperty,
    /// Write a property's value.
    WriteProperty,
    /// Observe a property's changes.
    ObserveProperty,
    /// Invoke an action.
    InvokeAction,
    /// Subscribe to an event.
    SubscribeEvent,
}

/// The abstract contract every protocol server implements.
///
/// A server translates inbound requests into calls on an [`ExposedThing`] and serializes
/// responses; it owns its own routing table from thing id to the `Arc<ExposedThing>` it serves.
#[async_trait]
pub trait ServerBinding: Send + Sync {
    /// This server's protocol tag.
    fn protocol(&self) -> Protocol;

    /// Start listening. Idempotent: calling `start` on an already-started server is a no-op.
    async fn start(&self) -> Result<(), Error>;

    /// Stop listening. Idempotent.
    async fn stop(&self) -> Result<(), Error>;

    /// Register a Thing with this server's routing table.
    async fn add_exposed_thing(&self, exposed_thing: Arc<ExposedThing>);

    /// Remove a Thing from this server's routing table by id.
    async fn remove_exposed_thing(&self, thing_id: &str);

    /// Build the forms this server contributes for one interaction, one per verb it supports
    /// for that interaction kind.
    fn build_forms(&self, hostname: &str, thing: &Thing, interaction_name: &str) -> Vec<Form>;

    /// The canonical base URL for a Thing on this server, used by the catalogue's `base` field.
    fn build_base_url(&self, hostname: &str, thing: &Thing) -> String;
}

/// The abstract contract every protocol client implements.
#[async_trait]
pub trait ClientBinding: Send + Sync {
    /// This client's protocol tag.
    fn protocol(&self) -> Protocol;

    /// True iff some form of the named interaction uses this client's scheme.
    fn is_supported_interaction(&self, thing: &Thing, name: &str) -> bool;

    /// Read a property's current value.
    async fn read_property(&self, thing: &Thing, name: &str) -> Result<Value, Error>;

    /// Write a property's value.
    async fn write_property(&self, thing: &Thing, name: &str, value: Value) -> Result<(), Error>;

    /// Invoke an action and await its result.
    async fn invoke_action(&self, thing: &Thing, name: &str, input: Value) -> Result<Value, Error>;

    /// Subscribe to a property's change notifications.
    async fn on_property_change(
        &self,
        thing: &Thing,
        name: &str,
    ) -> Result<ClientSubscription, Error>;

    /// Subscribe to an event's emissions.
    async fn on_event(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error>;

    /// Subscribe to changes in the Thing Description itself. Not every binding implements
    /// this; the default reports so via [`Error::NoHandler`].
    async fn on_td_change(&self, _url: &str) -> Result<ClientSubscription, Error> {
        Err(Error::NoHandler("on_td_change".into()))
    }
}

impl std::fmt::Debug for dyn ClientBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientBinding").field(&self.protocol()).finish()
    }
}

/// A boxed stream of values returned by a client subscription, together with a disposer
/// matching the bus's dispose semantics.
pub struct ClientSubscription {
    /// The stream of delivered values.
    pub stream: std::pin::Pin<Box<dyn Stream<Item = Value> + Send>>,
    /// Ends the subscription. Idempotent.
    pub dispose: Box<dyn FnOnce() + Send>,
}

/// Select, among `forms`, the one this client should use for `verb`: scheme-matching forms only,
/// secure schemes preferred over plain, filtered by `rel` when the verb maps to one, falling
/// back to the first scheme-matching form if no `rel` matches.
pub fn select_form(forms: &[Form], protocol: Protocol, verb: Verb) -> Option<&Form> {
    let rel = match verb {
        Verb::ReadProperty => Some(crate::td::Rel::Readproperty),
        Verb::WriteProperty => Some(crate::td::Rel::Writeproperty),
        Verb::ObserveProperty => Some(crate::td::Rel::Observeproperty),
        Verb::InvokeAction => Some(crate::td::Rel::Invokeaction),
        Verb::SubscribeEvent => Some(crate::td::Rel::Subscribeevent),
    };

    let scheme_matching: Vec<&Form> = forms
        .iter()
        .filter(|form| protocol.matches_scheme(form.scheme()))
        .collect();

    let rel_filtered: Vec<&Form> = rel
        .map(|rel| {
            scheme_matching
                .iter()
                .copied()
                .filter(|form| form.rel == Some(rel))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let candidates: &[&Form] = if rel_filtered.is_empty() {
        &scheme_matching
    } else {
        &rel_filtered
    };

    candidates
        .iter()
        .find(|form| form.is_secure())
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::td::{Op, Rel};

    #[test]
    fn prefers_secure_scheme() {
        let forms = vec![
            Form::new("http://host/a", Rel::Readproperty, vec![Op::ReadProperty]),
            Form::new("https://host/a", Rel::Readproperty, vec![Op::ReadProperty]),
        ];

        let selected = select_form(&forms, Protocol::Http, Verb::ReadProperty).unwrap();
        assert_eq!(selected.href, "https://host/a");
    }

    #[test]
    fn falls_back_to_first_scheme_match_without_rel_match() {
        let forms = vec![Form::new("http://host/a", Rel::Writeproperty, vec![Op::WriteProperty])];

        let selected = select_form(&forms, Protocol::Http, Verb::ReadProperty).unwrap();
        assert_eq!(selected.href, "http://host/a");
    }
}

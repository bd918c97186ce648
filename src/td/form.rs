use serde::{Deserialize, Serialize};

/// The relation a [`Form`] plays for its interaction, indicating verb semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rel {
    /// Read a property's current value.
    Readproperty,
    /// Write a property's value.
    Writeproperty,
    /// Observe a property's changes.
    Observeproperty,
    /// Invoke an action.
    Invokeaction,
    /// Subscribe to an event.
    Subscribeevent,
}

/// A WoT operation name, as carried in a Form's `op` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    /// Read a property's current value.
    ReadProperty,
    /// Write a property's value.
    WriteProperty,
    /// Observe a property's changes.
    ObserveProperty,
    /// Stop observing a property's changes.
    UnobserveProperty,
    /// Invoke an action.
    InvokeAction,
    /// Subscribe to an event.
    SubscribeEvent,
    /// Stop subscribing to an event.
    UnsubscribeEvent,
}

/// A protocol-specific binding attached to an interaction: where to send the request, and what
/// verb it answers.
///
/// Forms are derived state — built by [`crate::protocol::ServerBinding::build_forms`] and
/// attached by [`crate::servient::Servient::refresh_forms`] — never user-authored directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Absolute URL, including scheme, that a client issues the request against.
    pub href: String,

    /// MIME type of the request/response body. Defaults to `application/json`.
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,

    /// The verb this form answers, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<Rel>,

    /// The WoT operations this form supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<Vec<Op>>,

    /// Fields not modeled above, preserved verbatim across parse/serialize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Form {
    /// A form with only the fields this crate fills in itself.
    pub fn new(href: impl Into<String>, rel: Rel, op: Vec<Op>) -> Self {
        Self {
            href: href.into(),
            content_type: default_content_type(),
            rel: Some(rel),
            op: Some(op),
            extra: serde_json::Map::new(),
        }
    }

    /// The scheme of [`Self::href`] (`http`, `https`, `ws`, `wss`, `coap`, `coaps`), or an empty
    /// string if the URL carries none.
    pub fn scheme(&self) -> &str {
        self.href.split_once("://").map(|(scheme, _)| scheme).unwrap_or("")
    }

    /// True if [`Self::scheme`] is one of the `s`-suffixed secure schemes.
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme(), "https" | "wss" | "coaps")
    }
}

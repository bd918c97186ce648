use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::form::Form;

/// A JSON-Schema fragment describing a value shape. This crate treats it as opaque data: it is
/// carried through untouched, never interpreted against property/action/event values. Validating
/// a whole Thing Description document against its schema is a separate concern, see
/// [`crate::td::Validator`].
pub type DataSchema = Value;

/// A readable, optionally writable and observable, piece of a Thing's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAffordance {
    /// JSON-Schema fragment describing the property's value.
    #[serde(rename = "dataSchema", default)]
    pub data_schema: DataSchema,

    /// Whether clients may subscribe to change notifications.
    #[serde(default)]
    pub observable: bool,

    /// Whether clients may write a new value.
    #[serde(default)]
    pub writable: bool,

    /// Protocol bindings currently serving this property. Ordered; order is preserved because
    /// a client picks the first form matching its selection rules, not an arbitrary one.
    #[serde(default)]
    pub forms: Vec<Form>,

    /// Fields not modeled above, preserved verbatim across parse/serialize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An invocable procedure with optional input/output schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAffordance {
    /// JSON-Schema fragment describing the expected input, if the action takes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<DataSchema>,

    /// JSON-Schema fragment describing the result, if the action produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<DataSchema>,

    /// Protocol bindings currently serving this action.
    #[serde(default)]
    pub forms: Vec<Form>,

    /// Fields not modeled above, preserved verbatim across parse/serialize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A server-emitted notification affordance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAffordance {
    /// JSON-Schema fragment describing the emitted payload.
    #[serde(default)]
    pub data: DataSchema,

    /// Protocol bindings currently serving this event.
    #[serde(default)]
    pub forms: Vec<Form>,

    /// Fields not modeled above, preserved verbatim across parse/serialize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Which of a Thing's three interaction maps a name was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    /// A readable/writable/observable piece of state.
    Property,
    /// An invocable procedure.
    Action,
    /// A server-emitted notification.
    Event,
}

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::interaction::{ActionAffordance, EventAffordance, InteractionKind, PropertyAffordance};
use super::TD_CONTEXT_URI;
use crate::error::Error;

/// A Thing Description: the parsed, in-memory form of the JSON document a servient produces,
/// consumes, or serves from its catalogue.
///
/// `properties`/`actions`/`events` use an order-preserving map so that re-serializing a parsed
/// document reproduces the key order it was read with, which the TD round-trip property
/// depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    /// URN/URI identity, unique within a servient.
    pub id: String,

    /// Human-readable title.
    pub title: String,

    /// Longer-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON-LD context. Kept as an untyped value (a bare string or a mixed array in practice)
    /// rather than reshaped, so whatever shape the producer supplied survives round-trip.
    #[serde(rename = "@context")]
    pub context: Value,

    /// Security scheme declarations. Carried opaquely; this crate assumes open access
    /// regardless of what is declared here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Value>,

    /// The base URL the servient computed for this Thing. `None` until emitted by a servient;
    /// absent entirely from input TDs in the general case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Named, readable/writable/observable state.
    #[serde(default)]
    pub properties: IndexMap<String, PropertyAffordance>,

    /// Named, invocable procedures.
    #[serde(default)]
    pub actions: IndexMap<String, ActionAffordance>,

    /// Named, server-emitted notifications.
    #[serde(default)]
    pub events: IndexMap<String, EventAffordance>,

    /// Fields not modeled above, preserved verbatim across parse/serialize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Thing {
    /// Parse a Thing Description from its JSON text form, validating the minimal shape this
    /// crate requires: `id`, `title`, and a `@context` mentioning the WoT TD context URI.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let thing: Self = serde_json::from_str(input)
            .map_err(|e| Error::InvalidThingDescription(e.to_string()))?;
        thing.validate()?;
        Ok(thing)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidThingDescription("`id` must be non-empty".into()));
        }

        let mentions_context = match &self.context {
            Value::String(s) => s == TD_CONTEXT_URI,
            Value::Array(items) => items.iter().any(|item| match item {
                Value::String(s) => s == TD_CONTEXT_URI,
                Value::Object(map) => map.values().any(|v| v.as_str() == Some(TD_CONTEXT_URI)),
                _ => false,
            }),
            _ => false,
        };

        if !mentions_context {
            return Err(Error::InvalidThingDescription(format!(
                "`@context` must mention {TD_CONTEXT_URI}"
            )));
        }

        Ok(())
    }

    /// Serialize back to JSON text, with `base` stripped — the form used for TD round-trip
    /// comparison and for whatever a host persists.
    pub fn to_json_without_base(&self) -> Result<String, Error> {
        let mut clone = self.clone();
        clone.base = None;
        serde_json::to_string(&clone).map_err(Error::from)
    }

    /// A URL-path-safe rendering of [`Self::id`]: lowercased, with every run of characters
    /// outside `[a-z0-9]` collapsed to a single `-`, and leading/trailing `-` trimmed.
    pub fn url_name(&self) -> String {
        slugify(&self.id)
    }

    /// Locate the named interaction by searching properties, then actions, then events, as
    /// client selection requires.
    pub fn interaction_kind(&self, name: &str) -> Option<InteractionKind> {
        if self.properties.contains_key(name) {
            Some(InteractionKind::Property)
        } else if self.actions.contains_key(name) {
            Some(InteractionKind::Action)
        } else if self.events.contains_key(name) {
            Some(InteractionKind::Event)
        } else {
            None
        }
    }
}

/// Slugify an arbitrary identifier string into one safe for use as a URL path segment.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_urn() {
        assert_eq!(slugify("urn:dev:ops:32473-Temperature"), "urn-dev-ops-32473-temperature");
    }

    #[test]
    fn rejects_missing_context() {
        let json = r#"{"id":"urn:a","title":"A","@context":"https://example.com"}"#;
        let err = Thing::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidThingDescription(_)));
    }

    #[test]
    fn accepts_array_context() {
        let json = r#"{
            "id":"urn:a",
            "title":"A",
            "@context":["https://www.w3.org/2019/wot/td/v1", {"iot":"https://example.com/iot#"}]
        }"#;
        Thing::from_json(json).unwrap();
    }

    #[test]
    fn round_trip_preserves_unknown_fields() {
        let json = r#"{"id":"urn:a","title":"A","@context":"https://www.w3.org/2019/wot/td/v1","support":"mailto:x@example.com"}"#;
        let thing = Thing::from_json(json).unwrap();
        assert_eq!(
            thing.extra.get("support").and_then(|v| v.as_str()),
            Some("mailto:x@example.com")
        );
    }
}

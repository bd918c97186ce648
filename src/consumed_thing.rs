use std::sync::Arc;

use serde_json::Value;
use tokio_stream::Stream;

use crate::error::Error;
use crate::protocol::ClientSubscription;
use crate::servient::Servient;
use crate::td::Thing;

/// The client-side representation of a Thing: an immutable snapshot of its Thing Description,
/// with every call routed through its owning [`Servient`]'s client selection.
///
/// Unlike [`crate::exposed_thing::ExposedThing`], a `ConsumedThing` never changes the Thing
/// Description it was built from — refreshing it means consuming the TD again.
pub struct ConsumedThing {
    servient: Arc<Servient>,
    thing: Thing,
}

impl ConsumedThing {
    pub(crate) fn new(servient: Arc<Servient>, thing: Thing) -> Self {
        Self { servient, thing }
    }

    /// The Thing Description this object was built from.
    pub fn thing(&self) -> &Thing {
        &self.thing
    }

    /// Read a property's current value via whichever client [`Servient::select_client`] picks.
    pub async fn read_property(&self, name: &str) -> Result<Value, Error> {
        let client = self.servient.select_client(&self.thing, name)?;
        client.read_property(&self.thing, name).await
    }

    /// Write a property's value via whichever client [`Servient::select_client`] picks.
    pub async fn write_property(&self, name: &str, value: Value) -> Result<(), Error> {
        let client = self.servient.select_client(&self.thing, name)?;
        client.write_property(&self.thing, name, value).await
    }

    /// Invoke an action and await its result via whichever client [`Servient::select_client`]
    /// picks.
    pub async fn invoke_action(&self, name: &str, input: Value) -> Result<Value, Error> {
        let client = self.servient.select_client(&self.thing, name)?;
        client.invoke_action(&self.thing, name, input).await
    }

    /// Subscribe to a property's change notifications. The returned stream yields the bare
    /// value carried by each notification; call [`ObservedSubscription::dispose`] to end it.
    pub async fn observe_property(&self, name: &str) -> Result<ObservedSubscription, Error> {
        let client = self.servient.select_client(&self.thing, name)?;
        let subscription = client.on_property_change(&self.thing, name).await?;
        Ok(ObservedSubscription::new(subscription))
    }

    /// Subscribe to an event's emissions.
    pub async fn on_event(&self, name: &str) -> Result<ObservedSubscription, Error> {
        let client = self.servient.select_client(&self.thing, name)?;
        let subscription = client.on_event(&self.thing, name).await?;
        Ok(ObservedSubscription::new(subscription))
    }
}

/// A live subscription obtained from [`ConsumedThing::observe_property`] or
/// [`ConsumedThing::on_event`]. Dropping this without calling [`Self::dispose`] still ends
/// delivery once the underlying stream and its tasks are dropped, but `dispose` does so
/// immediately and explicitly.
pub struct ObservedSubscription {
    subscription: Option<ClientSubscription>,
}

impl ObservedSubscription {
    fn new(subscription: ClientSubscription) -> Self {
        Self {
            subscription: Some(subscription),
        }
    }

    /// The stream of delivered values. Panics if called after [`Self::dispose`].
    pub fn stream(&mut self) -> std::pin::Pin<&mut (dyn Stream<Item = Value> + Send)> {
        self.subscription
            .as_mut()
            .expect("stream accessed after dispose")
            .stream
            .as_mut()
    }

    /// End the subscription. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            (subscription.dispose)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindingConfig, ServientConfig};

    fn thing_json() -> &'static str {
        r#"{
            "id": "urn:test:thing",
            "title": "Test",
            "@context": "https://www.w3.org/2019/wot/td/v1",
            "properties": { "x": { "dataSchema": {}, "writable": true } },
            "actions": {},
            "events": {}
        }"#
    }

    #[tokio::test]
    async fn read_property_without_any_form_fails_no_client() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let thing = Thing::from_json(thing_json()).unwrap();
        let consumed = ConsumedThing::new(servient, thing);

        let err = consumed.read_property("x").await.unwrap_err();
        assert!(matches!(err, Error::NoClientForInteraction(_)));
    }

    #[tokio::test]
    async fn unknown_interaction_is_reported() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let thing = Thing::from_json(thing_json()).unwrap();
        let consumed = ConsumedThing::new(servient, thing);

        let err = consumed.read_property("nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownInteraction(_)));
    }
}

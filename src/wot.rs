use std::sync::Arc;

use crate::consumed_thing::ConsumedThing;
use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::servient::Servient;
use crate::td::{PermissiveValidator, Thing, Validator};

/// The entry point a host program uses to turn Thing Description documents into live objects.
///
/// Mirrors the `WoT` interface of the Scripting API this runtime is modeled after: `produce`
/// builds a server-side [`ExposedThing`] and registers it with a servient (still disabled until
/// [`ExposedThing::expose`] is called), `consume` builds a client-side [`ConsumedThing`], and
/// `fetch` retrieves a TD document over HTTP.
pub struct Wot {
    servient: Arc<Servient>,
    validator: Arc<dyn Validator>,
}

impl Wot {
    /// Build a facade over an already-constructed servient. Produced and consumed documents are
    /// accepted as-is; a [`PermissiveValidator`] backs every call.
    pub fn new(servient: Arc<Servient>) -> Self {
        Self {
            servient,
            validator: Arc::new(PermissiveValidator),
        }
    }

    /// Build a facade that runs `validator` against every Thing Description before it is
    /// parsed into a [`Thing`], instead of accepting documents unconditionally.
    pub fn with_validator(servient: Arc<Servient>, validator: Arc<dyn Validator>) -> Self {
        Self { servient, validator }
    }

    /// Parse `td_json` and register it with the servient as an `ExposedThing`. The Thing is not
    /// exposed yet; call [`ExposedThing::expose`] and then [`Servient::refresh_forms`].
    pub async fn produce(&self, td_json: &str) -> Result<Arc<ExposedThing>, Error> {
        self.validate(td_json)?;
        let thing = Thing::from_json(td_json)?;
        let exposed_thing = Arc::new(ExposedThing::new(thing, self.servient.subscription_buffer()));
        self.servient.add_exposed_thing(exposed_thing.clone()).await;
        Ok(exposed_thing)
    }

    /// Parse `td_json` into a [`ConsumedThing`], ready to make client calls routed through this
    /// facade's servient.
    pub async fn consume(&self, td_json: &str) -> Result<ConsumedThing, Error> {
        self.validate(td_json)?;
        let thing = Thing::from_json(td_json)?;
        Ok(ConsumedThing::new(self.servient.clone(), thing))
    }

    fn validate(&self, td_json: &str) -> Result<(), Error> {
        let document: serde_json::Value = serde_json::from_str(td_json)?;
        self.validator.validate(&document)
    }

    /// Fetch a Thing Description document's raw JSON text from `url`.
    pub async fn fetch(&self, url: &str) -> Result<String, Error> {
        let response = reqwest::get(url).await?;
        if !response.status().is_success() {
            return Err(Error::ProtocolClientError(format!(
                "fetching `{url}` returned status {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindingConfig, ServientConfig};

    fn thing_json() -> &'static str {
        r#"{
            "id": "urn:test:lamp",
            "title": "Lamp",
            "@context": "https://www.w3.org/2019/wot/td/v1",
            "properties": { "on": { "dataSchema": {"type": "boolean"}, "writable": true } }
        }"#
    }

    #[tokio::test]
    async fn produce_registers_an_exposed_thing() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let wot = Wot::new(servient.clone());

        let exposed = wot.produce(thing_json()).await.unwrap();
        assert_eq!(exposed.id().await, "urn:test:lamp");
        assert_eq!(servient.exposed_things().await.len(), 1);
    }

    #[tokio::test]
    async fn consume_builds_a_consumed_thing_without_registering_it() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let wot = Wot::new(servient.clone());

        let consumed = wot.consume(thing_json()).await.unwrap();
        assert_eq!(consumed.thing().id, "urn:test:lamp");
        assert!(servient.exposed_things().await.is_empty());
    }

    #[tokio::test]
    async fn produce_rejects_malformed_thing_description() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let wot = Wot::new(servient);

        let err = wot.produce("{}").await.unwrap_err();
        assert!(matches!(err, Error::InvalidThingDescription(_)));
    }

    struct RejectEverything;

    impl crate::td::Validator for RejectEverything {
        fn validate(&self, _document: &serde_json::Value) -> Result<(), Error> {
            Err(Error::InvalidThingDescription("rejected by test validator".into()))
        }
    }

    #[tokio::test]
    async fn custom_validator_rejects_before_construction() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Arc::new(Servient::new(config).unwrap());
        let wot = Wot::with_validator(servient.clone(), Arc::new(RejectEverything));

        let err = wot.produce(thing_json()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidThingDescription(_)));
        assert!(servient.exposed_things().await.is_empty());
    }
}

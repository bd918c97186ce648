use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::{debug, instrument};

use crate::bus::{Bus, Emission, SharedBus, SubscriptionId};
use crate::error::Error;
use crate::td::Thing;

/// The result of a handler invocation: either a value, or the taxonomy error it raised.
pub type HandlerResult<T> = Result<T, Error>;

/// A boxed future, the common shape every handler trait object returns.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A property read handler: given the stored value, produce the value to report.
pub type PropertyReadHandler = Arc<dyn Fn(Value) -> BoxFuture<HandlerResult<Value>> + Send + Sync>;

/// A property write handler: given the proposed new value, produce the value actually stored.
pub type PropertyWriteHandler = Arc<dyn Fn(Value) -> BoxFuture<HandlerResult<Value>> + Send + Sync>;

/// An action handler: given the input payload, produce the result.
pub type ActionHandler = Arc<dyn Fn(Value) -> BoxFuture<HandlerResult<Value>> + Send + Sync>;

struct PropertyState {
    value: Mutex<Value>,
    read_handler: Mutex<Option<PropertyReadHandler>>,
    write_handler: Mutex<Option<PropertyWriteHandler>>,
    writable: bool,
}

/// The server-side representation of a Thing: its TD, a per-property value store and
/// read/write handler overrides, per-action invocation handlers, and an observable bus feeding
/// property-change and event subscriptions.
///
/// Per-property writes are serialized: [`Self::write_property`] holds that property's lock
/// across the handler invocation and the subsequent bus emission, so the notification for write
/// *k* is always dispatched before write *k+1*'s handler begins.
pub struct ExposedThing {
    thing: Mutex<Thing>,
    properties: HashMap<String, PropertyState>,
    action_handlers: Mutex<HashMap<String, ActionHandler>>,
    bus: SharedBus,
    exposed: Mutex<bool>,
}

impl std::fmt::Debug for ExposedThing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedThing").finish_non_exhaustive()
    }
}

impl ExposedThing {
    /// Build a new `ExposedThing` from a parsed Thing Description. Property values start at
    /// `null`; action handlers start unset (invocation fails with [`Error::NoHandler`] until
    /// one is assigned).
    pub fn new(thing: Thing, subscription_buffer: usize) -> Self {
        let properties = thing
            .properties
            .iter()
            .map(|(name, affordance)| {
                (
                    name.clone(),
                    PropertyState {
                        value: Mutex::new(Value::Null),
                        read_handler: Mutex::new(None),
                        write_handler: Mutex::new(None),
                        writable: affordance.writable,
                    },
                )
            })
            .collect();

        Self {
            thing: Mutex::new(thing),
            properties,
            action_handlers: Mutex::new(HashMap::new()),
            bus: Arc::new(Bus::new(subscription_buffer)),
            exposed: Mutex::new(false),
        }
    }

    /// A snapshot of the current Thing Description, including whatever forms have been
    /// attached by [`crate::servient::Servient::refresh_forms`].
    pub async fn thing(&self) -> Thing {
        self.thing.lock().await.clone()
    }

    /// Thing id, used as the registry key in [`crate::servient::Servient`].
    pub async fn id(&self) -> String {
        self.thing.lock().await.id.clone()
    }

    /// Replace the stored Thing Description (used by form regeneration).
    pub(crate) async fn set_thing(&self, thing: Thing) {
        *self.thing.lock().await = thing;
    }

    /// Whether [`Self::expose`] has been called more recently than [`Self::destroy`].
    pub async fn is_exposed(&self) -> bool {
        *self.exposed.lock().await
    }

    /// Mark the Thing as exposed. Form regeneration treats an exposed Thing as eligible to be
    /// served by every attached server.
    #[instrument(skip(self))]
    pub async fn expose(&self) {
        *self.exposed.lock().await = true;
        debug!("thing exposed");
    }

    /// Mark the Thing as disabled. Form regeneration then strips its forms from every server.
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        *self.exposed.lock().await = false;
        debug!("thing destroyed");
    }

    fn property(&self, name: &str) -> Result<&PropertyState, Error> {
        self.properties
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Read a property: its handler if one is set, else the stored value.
    pub async fn read_property(&self, name: &str) -> Result<Value, Error> {
        let property = self.property(name)?;
        let value = property.value.lock().await.clone();

        match property.read_handler.lock().await.as_ref() {
            Some(handler) => handler(value).await,
            None => Ok(value),
        }
    }

    /// Write a property: fails with [`Error::NotWritable`] if the property is read-only;
    /// otherwise runs the write handler (default: store the value as-is) and emits a
    /// property-change notification with the resulting value, exactly once per accepted write.
    pub async fn write_property(&self, name: &str, new_value: Value) -> Result<(), Error> {
        let property = self.property(name)?;
        if !property.writable {
            return Err(Error::NotWritable(name.to_string()));
        }

        // Holding this lock across the handler call and the bus emit is what gives per-property
        // writes their FIFO ordering guarantee.
        let mut stored = property.value.lock().await;

        let accepted = match property.write_handler.lock().await.as_ref() {
            Some(handler) => handler(new_value).await?,
            None => new_value,
        };

        *stored = accepted.clone();
        drop(stored);

        self.bus
            .emit(
                name,
                Emission {
                    name: name.to_string(),
                    data: accepted,
                },
            )
            .await;

        Ok(())
    }

    /// Invoke an action by name. Fails with [`Error::NotFound`] if unknown, [`Error::NoHandler`]
    /// if no handler is set. Actions run concurrently with one another and with property
    /// writes; nothing here serializes them.
    pub async fn invoke_action(&self, name: &str, input: Value) -> Result<Value, Error> {
        let thing = self.thing.lock().await;
        if !thing.actions.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        drop(thing);

        let handler = {
            let handlers = self.action_handlers.lock().await;
            handlers.get(name).cloned()
        };

        match handler {
            Some(handler) => handler(input).await,
            None => Err(Error::NoHandler(name.to_string())),
        }
    }

    /// Publish an event emission. Fails with [`Error::NotFound`] if the event is unknown.
    /// Non-blocking: slow subscribers never delay this call.
    pub async fn emit_event(&self, name: &str, data: Value) -> Result<(), Error> {
        let thing = self.thing.lock().await;
        if !thing.events.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        drop(thing);

        self.bus
            .emit(
                name,
                Emission {
                    name: name.to_string(),
                    data,
                },
            )
            .await;

        Ok(())
    }

    /// Replace a property's read handler. Callable before or after [`Self::expose`].
    pub async fn set_property_read_handler(&self, name: &str, handler: PropertyReadHandler) -> Result<(), Error> {
        let property = self.property(name)?;
        *property.read_handler.lock().await = Some(handler);
        Ok(())
    }

    /// Replace a property's write handler. Callable before or after [`Self::expose`].
    pub async fn set_property_write_handler(&self, name: &str, handler: PropertyWriteHandler) -> Result<(), Error> {
        let property = self.property(name)?;
        *property.write_handler.lock().await = Some(handler);
        Ok(())
    }

    /// Replace an action's handler. Callable before or after [`Self::expose`].
    pub async fn set_action_handler(&self, name: &str, handler: ActionHandler) -> Result<(), Error> {
        let thing = self.thing.lock().await;
        if !thing.actions.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        drop(thing);

        self.action_handlers.lock().await.insert(name.to_string(), handler);
        Ok(())
    }

    /// Subscribe to property-change notifications. Only changes made after this call returns
    /// are observed.
    pub async fn observe_property(
        &self,
        name: &str,
    ) -> Result<(SubscriptionId, impl Stream<Item = Emission> + Send + 'static), Error> {
        self.property(name)?;
        Ok(self.bus.subscribe(name).await)
    }

    /// Subscribe to event emissions. Only emissions made after this call returns are observed.
    pub async fn on_event(
        &self,
        name: &str,
    ) -> Result<(SubscriptionId, impl Stream<Item = Emission> + Send + 'static), Error> {
        {
            let thing = self.thing.lock().await;
            if !thing.events.contains_key(name) {
                return Err(Error::NotFound(name.to_string()));
            }
        }
        Ok(self.bus.subscribe(name).await)
    }

    /// Tear down a subscription created by [`Self::observe_property`] or [`Self::on_event`].
    pub async fn dispose(&self, id: SubscriptionId) {
        self.bus.dispose(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn thing_with_property(writable: bool) -> Thing {
        let json = format!(
            r#"{{
                "id": "urn:test:thing",
                "title": "Test",
                "@context": "https://www.w3.org/2019/wot/td/v1",
                "properties": {{
                    "x": {{ "dataSchema": {{"type": "number"}}, "observable": true, "writable": {writable} }}
                }},
                "actions": {{
                    "fail": {{}}
                }},
                "events": {{
                    "e": {{ "data": {{"type": "number"}} }}
                }}
            }}"#
        );
        Thing::from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_agree() {
        let exposed = ExposedThing::new(thing_with_property(true), 16);
        exposed.write_property("x", Value::from(22.5)).await.unwrap();
        assert_eq!(exposed.read_property("x").await.unwrap(), Value::from(22.5));
    }

    #[tokio::test]
    async fn write_to_read_only_property_fails() {
        let exposed = ExposedThing::new(thing_with_property(false), 16);
        let err = exposed.write_property("x", Value::from(1)).await.unwrap_err();
        assert!(matches!(err, Error::NotWritable(_)));
    }

    #[tokio::test]
    async fn subscriber_receives_write_after_subscribing() {
        let exposed = ExposedThing::new(thing_with_property(true), 16);
        let (_id, mut stream) = exposed.observe_property("x").await.unwrap();

        exposed.write_property("x", Value::from(7)).await.unwrap();

        let emission = stream.next().await.unwrap();
        assert_eq!(emission.data, Value::from(7));
    }

    #[tokio::test]
    async fn invoke_action_without_handler_fails() {
        let exposed = ExposedThing::new(thing_with_property(true), 16);
        let err = exposed.invoke_action("fail", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::NoHandler(_)));
    }

    #[tokio::test]
    async fn handler_error_surfaces_as_handler_error() {
        let exposed = ExposedThing::new(thing_with_property(true), 16);
        exposed
            .set_action_handler(
                "fail",
                Arc::new(|_| Box::pin(async { Err(Error::HandlerError("boom".into())) })),
            )
            .await
            .unwrap();

        let err = exposed.invoke_action("fail", Value::Null).await.unwrap_err();
        assert_eq!(err, Error::HandlerError("boom".into()));
    }

    #[tokio::test]
    async fn unknown_property_is_not_found() {
        let exposed = ExposedThing::new(thing_with_property(true), 16);
        let err = exposed.read_property("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

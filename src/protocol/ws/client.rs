use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;
use uuid::Uuid;

use crate::error::Error;
use crate::protocol::{select_form, ClientBinding, ClientSubscription, Protocol, Verb};
use crate::td::Thing;

enum PendingReply {
    Value(Result<Value, Error>),
}

struct Connection {
    outbox: mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<PendingReply>>>>,
    subscriptions: Arc<Mutex<HashMap<String, mpsc::Sender<Value>>>>,
}

/// Client-side WebSocket binding. Maintains one long-lived connection per Thing endpoint,
/// correlating requests to responses by id and routing `emit` notifications to whichever
/// subscription they name.
#[derive(Default)]
pub struct WsClient {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl WsClient {
    /// A new client with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    async fn connection_for(&self, href: &str) -> Result<Arc<Connection>, Error> {
        if let Some(connection) = self.connections.lock().await.get(href) {
            return Ok(connection.clone());
        }

        let (socket, _) = tokio_tungstenite::connect_async(href)
            .await
            .map_err(Error::from)?;

        let (mut write, mut read) = socket.split();
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<Mutex<HashMap<String, oneshot::Sender<PendingReply>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let subscriptions: Arc<Mutex<HashMap<String, mpsc::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(message) = outbox_rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let pending_for_reader = pending.clone();
        let subscriptions_for_reader = subscriptions.clone();
        tokio::spawn(async move {
            while let Some(Ok(Message::Text(text))) = read.next().await {
                let value: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(%error, "malformed server message");
                        continue;
                    }
                };

                if value.get("method").and_then(|m| m.as_str()) == Some("emit") {
                    let Some(params) = value.get("params") else { continue };
                    let Some(subscription) = params.get("subscription").and_then(|s| s.as_str()) else {
                        continue;
                    };
                    let data = params.get("data").cloned().unwrap_or(Value::Null);

                    let subscriptions = subscriptions_for_reader.lock().await;
                    if let Some(sender) = subscriptions.get(subscription) {
                        let _ = sender.send(data).await;
                    }
                    continue;
                }

                let Some(id) = value.get("id").and_then(|i| i.as_str()) else { continue };
                let mut pending = pending_for_reader.lock().await;
                if let Some(sender) = pending.remove(id) {
                    let reply = if let Some(error) = value.get("error") {
                        let message = error
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("request failed")
                            .to_string();
                        let kind = error.get("data").and_then(|d| d.get("kind")).and_then(|k| k.as_str());
                        let mapped = match kind {
                            Some("NotFound") => Error::NotFound(message),
                            Some("NotWritable") => Error::NotWritable(message),
                            Some("NoHandler") => Error::NoHandler(message),
                            Some("InvalidInput") => Error::InvalidInput(message),
                            Some("HandlerError") => Error::HandlerError(message),
                            _ => Error::ProtocolClientError(message),
                        };
                        PendingReply::Value(Err(mapped))
                    } else {
                        PendingReply::Value(Ok(value.get("result").cloned().unwrap_or(Value::Null)))
                    };
                    let _ = sender.send(reply);
                }
            }
        });

        let connection = Arc::new(Connection {
            outbox,
            pending,
            subscriptions,
        });

        self.connections.lock().await.insert(href.to_string(), connection.clone());
        Ok(connection)
    }

    async fn call(&self, href: &str, method: &str, params: Value) -> Result<Value, Error> {
        let connection = self.connection_for(href).await?;
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        connection.pending.lock().await.insert(id.clone(), tx);

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        connection
            .outbox
            .send(Message::Text(request.to_string()))
            .map_err(|_| Error::ProtocolClientError("connection closed".into()))?;

        match rx.await {
            Ok(PendingReply::Value(result)) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    fn form_for<'a>(&self, thing: &'a Thing, name: &str, verb: Verb) -> Result<&'a str, Error> {
        let forms: &[crate::td::Form] = if let Some(property) = thing.properties.get(name) {
            &property.forms
        } else if let Some(action) = thing.actions.get(name) {
            &action.forms
        } else if let Some(event) = thing.events.get(name) {
            &event.forms
        } else {
            return Err(Error::NotFound(name.to_string()));
        };

        select_form(forms, Protocol::Ws, verb)
            .map(|form| form.href.as_str())
            .ok_or_else(|| Error::FormNotFound(name.to_string()))
    }

    async fn subscribe(&self, href: &str, method: &str, name: &str) -> Result<ClientSubscription, Error> {
        let result = self
            .call(href, method, serde_json::json!({ "name": name }))
            .await?;
        let subscription_id = result
            .get("subscription")
            .and_then(|s| s.as_str())
            .ok_or_else(|| Error::ProtocolClientError("missing `subscription` in response".into()))?
            .to_string();

        let connection = self.connection_for(href).await?;
        let (tx, rx) = mpsc::channel(128);
        connection.subscriptions.lock().await.insert(subscription_id.clone(), tx);

        let connection_for_dispose = connection.clone();
        let subscription_id_for_dispose = subscription_id.clone();
        let href_owned = href.to_string();

        Ok(ClientSubscription {
            stream: Box::pin(ReceiverStream::new(rx)),
            dispose: Box::new(move || {
                let connection = connection_for_dispose;
                let subscription_id = subscription_id_for_dispose;
                let href = href_owned;
                tokio::spawn(async move {
                    connection.subscriptions.lock().await.remove(&subscription_id);
                    let id = Uuid::new_v4().to_string();
                    let request = serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "method": "dispose",
                        "params": { "subscription": subscription_id },
                    });
                    let _ = connection.outbox.send(Message::Text(request.to_string()));
                    let _ = href;
                });
            }),
        })
    }
}

#[async_trait]
impl ClientBinding for WsClient {
    fn protocol(&self) -> Protocol {
        Protocol::Ws
    }

    fn is_supported_interaction(&self, thing: &Thing, name: &str) -> bool {
        let forms: &[crate::td::Form] = if let Some(property) = thing.properties.get(name) {
            &property.forms
        } else if let Some(action) = thing.actions.get(name) {
            &action.forms
        } else if let Some(event) = thing.events.get(name) {
            &event.forms
        } else {
            return false;
        };

        forms.iter().any(|form| Protocol::Ws.matches_scheme(form.scheme()))
    }

    async fn read_property(&self, thing: &Thing, name: &str) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::ReadProperty)?.to_string();
        let result = self.call(&href, "read_property", serde_json::json!({ "name": name })).await?;
        result.get("value").cloned().ok_or_else(|| Error::ProtocolClientError("missing `value`".into()))
    }

    async fn write_property(&self, thing: &Thing, name: &str, value: Value) -> Result<(), Error> {
        let href = self.form_for(thing, name, Verb::WriteProperty)?.to_string();
        self.call(&href, "write_property", serde_json::json!({ "name": name, "value": value })).await?;
        Ok(())
    }

    async fn invoke_action(&self, thing: &Thing, name: &str, input: Value) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::InvokeAction)?.to_string();
        let result = self
            .call(&href, "invoke_action", serde_json::json!({ "name": name, "input": input }))
            .await?;
        result.get("result").cloned().ok_or_else(|| Error::ProtocolClientError("missing `result`".into()))
    }

    async fn on_property_change(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::ObserveProperty)?.to_string();
        self.subscribe(&href, "on_property_change", name).await
    }

    async fn on_event(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::SubscribeEvent)?.to_string();
        self.subscribe(&href, "on_event", name).await
    }
}

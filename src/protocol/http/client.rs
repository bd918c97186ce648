use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::error::Error;
use crate::protocol::{select_form, ClientBinding, ClientSubscription, Protocol, Verb};
use crate::td::Thing;

/// Client-side HTTP binding, built on [`reqwest`].
pub struct HttpClient {
    http: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// A new client using a fresh `reqwest::Client`.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
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

        select_form(forms, Protocol::Http, verb)
            .map(|form| form.href.as_str())
            .ok_or_else(|| Error::FormNotFound(name.to_string()))
    }

    async fn sse_subscription(&self, href: &str) -> Result<ClientSubscription, Error> {
        let response = self.http.get(href).send().await?;
        let mut bytes_stream = response.bytes_stream();

        let (tx, rx) = mpsc::channel::<Value>(128);
        let href_owned = href.to_string();

        let forwarder = tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = bytes_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        warn!(%error, href = %href_owned, "SSE stream read error");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);

                    for line in event.lines() {
                        if let Some(data) = line.strip_prefix("data:") {
                            if let Ok(value) = serde_json::from_str::<Value>(data.trim()) {
                                if tx.send(value).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(ClientSubscription {
            stream: Box::pin(ReceiverStream::new(rx)),
            dispose: Box::new(move || forwarder.abort()),
        })
    }
}

#[async_trait]
impl ClientBinding for HttpClient {
    fn protocol(&self) -> Protocol {
        Protocol::Http
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

        forms.iter().any(|form| Protocol::Http.matches_scheme(form.scheme()))
    }

    async fn read_property(&self, thing: &Thing, name: &str) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::ReadProperty)?;
        let response = self.http.get(href).send().await?;
        let body: serde_json::Value = response.json().await?;
        body.get("value").cloned().ok_or_else(|| Error::ProtocolClientError("missing `value`".into()))
    }

    async fn write_property(&self, thing: &Thing, name: &str, value: Value) -> Result<(), Error> {
        let href = self.form_for(thing, name, Verb::WriteProperty)?;
        let response = self
            .http
            .put(href)
            .json(&serde_json::json!({ "value": value }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::ProtocolClientError(format!("unexpected status {}", response.status())))
        }
    }

    async fn invoke_action(&self, thing: &Thing, name: &str, input: Value) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::InvokeAction)?;
        let response = self
            .http
            .post(href)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("action invocation failed")
                .to_string();
            return Err(Error::HandlerError(message));
        }

        let body: Value = response.json().await?;
        body.get("result").cloned().ok_or_else(|| Error::ProtocolClientError("missing `result`".into()))
    }

    async fn on_property_change(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::ObserveProperty)?;
        self.sse_subscription(href).await
    }

    async fn on_event(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::SubscribeEvent)?;
        self.sse_subscription(href).await
    }
}

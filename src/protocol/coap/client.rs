use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use coap_lite::{CoapRequest, Packet, RequestType};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;
use crate::protocol::{select_form, ClientBinding, ClientSubscription, Protocol, Verb};
use crate::td::Thing;

/// Client-side CoAP binding. Action completion and event/property observation are both
/// implemented by polling: send a request, then repeatedly GET the same URI until the server
/// reports completion — the same strategy `wotpy`'s `CoAPClient.invoke_action` uses around
/// `aiocoap`'s Observe iterator, adapted here to a plain request/response loop since this
/// crate's CoAP transport does not track per-request observation streams.
pub struct CoapClient {
    poll_interval: Duration,
}

impl Default for CoapClient {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl CoapClient {
    /// A new client polling at the default interval.
    pub fn new() -> Self {
        Self::default()
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

        select_form(forms, Protocol::Coap, verb)
            .map(|form| form.href.as_str())
            .ok_or_else(|| Error::FormNotFound(name.to_string()))
    }

    async fn request(&self, href: &str, method: RequestType, payload: Value) -> Result<Value, Error> {
        let url = url::Url::parse(href).map_err(|e| Error::ProtocolClientError(e.to_string()))?;
        let host = url.host_str().ok_or_else(|| Error::ProtocolClientError("missing host".into()))?;
        let port = url.port().unwrap_or(5683);
        let target: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| Error::ProtocolClientError(e.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::ProtocolClientError(e.to_string()))?;

        let mut request: CoapRequest<SocketAddr> = CoapRequest::new();
        request.set_method(method);
        request.set_path(url.path());
        request.message.payload = serde_json::to_vec(&payload).unwrap_or_default();

        let bytes = request
            .message
            .to_bytes()
            .map_err(|e| Error::ProtocolClientError(e.to_string()))?;

        socket
            .send_to(&bytes, target)
            .await
            .map_err(|e| Error::ProtocolClientError(e.to_string()))?;

        let mut buf = vec![0u8; 4096];
        let len = socket
            .recv(&mut buf)
            .await
            .map_err(|e| Error::ProtocolClientError(e.to_string()))?;

        let packet = Packet::from_bytes(&buf[..len]).map_err(|e| Error::ProtocolClientError(e.to_string()))?;
        serde_json::from_slice(&packet.payload).map_err(Error::from)
    }

    async fn poll_until_done(&self, href: &str) -> Result<Value, Error> {
        loop {
            let status = self.request(href, RequestType::Get, Value::Null).await?;
            if status.get("done").and_then(|v| v.as_bool()) == Some(true) {
                if let Some(error) = status.get("error") {
                    return Err(Error::HandlerError(error.to_string()));
                }
                return Ok(status.get("result").cloned().unwrap_or(Value::Null));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ClientBinding for CoapClient {
    fn protocol(&self) -> Protocol {
        Protocol::Coap
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

        forms.iter().any(|form| Protocol::Coap.matches_scheme(form.scheme()))
    }

    async fn read_property(&self, thing: &Thing, name: &str) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::ReadProperty)?.to_string();
        let body = self.request(&href, RequestType::Get, Value::Null).await?;
        body.get("value").cloned().ok_or_else(|| Error::ProtocolClientError("missing `value`".into()))
    }

    async fn write_property(&self, thing: &Thing, name: &str, value: Value) -> Result<(), Error> {
        let href = self.form_for(thing, name, Verb::WriteProperty)?.to_string();
        self.request(&href, RequestType::Post, serde_json::json!({ "value": value })).await?;
        Ok(())
    }

    async fn invoke_action(&self, thing: &Thing, name: &str, input: Value) -> Result<Value, Error> {
        let href = self.form_for(thing, name, Verb::InvokeAction)?.to_string();
        self.request(&href, RequestType::Post, serde_json::json!({ "input": input })).await?;
        self.poll_until_done(&href).await
    }

    async fn on_property_change(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::ObserveProperty)?.to_string();
        self.poll_stream(href).await
    }

    async fn on_event(&self, thing: &Thing, name: &str) -> Result<ClientSubscription, Error> {
        let href = self.form_for(thing, name, Verb::SubscribeEvent)?.to_string();
        self.poll_stream(href).await
    }
}

impl CoapClient {
    async fn poll_stream(&self, href: String) -> Result<ClientSubscription, Error> {
        let (tx, rx) = mpsc::channel(128);
        let interval = self.poll_interval;
        let mut last = Value::Null;

        let poller = tokio::spawn(async move {
            let client = CoapClient { poll_interval: interval };
            loop {
                match client.request(&href, RequestType::Get, Value::Null).await {
                    Ok(body) => {
                        let data = body.get("value").or_else(|| body.get("data")).cloned().unwrap_or(Value::Null);
                        if data != last {
                            last = data.clone();
                            if tx.send(data).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
                tokio::time::sleep(interval).await;
            }
        });

        Ok(ClientSubscription {
            stream: Box::pin(ReceiverStream::new(rx)),
            dispose: Box::new(move || poller.abort()),
        })
    }
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use coap_lite::{CoapOption, CoapRequest, Packet, RequestType, ResponseType};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::protocol::{Protocol, ServerBinding};
use crate::td::{Form, Op, Rel, Thing};

/// Server-side CoAP binding. Properties answer plain GET/POST; actions answer POST and then
/// report completion on repeated GETs of the same path; events answer GET with their current
/// value. There is no Observe-option (RFC 7641) registration here — clients poll instead, the
/// same simplification the client side makes.
type CoapState = Arc<Mutex<HashMap<String, Arc<ExposedThing>>>>;

/// Server-side CoAP binding.
pub struct CoapServer {
    port: u16,
    things: CoapState,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CoapServer {
    /// A new CoAP binding bound to `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            things: Arc::new(Mutex::new(HashMap::new())),
            handle: Mutex::new(None),
        }
    }
}

fn path_segments(request: &CoapRequest<SocketAddr>) -> Vec<String> {
    request
        .message
        .get_option(CoapOption::UriPath)
        .map(|values| {
            values
                .iter()
                .map(|v| String::from_utf8_lossy(v).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn json_body(request: &CoapRequest<SocketAddr>) -> Value {
    serde_json::from_slice(&request.message.payload).unwrap_or(Value::Null)
}

fn error_status(error: &Error) -> ResponseType {
    match error {
        Error::NotFound(_) => ResponseType::NotFound,
        Error::NotWritable(_) | Error::NoHandler(_) => ResponseType::MethodNotAllowed,
        Error::InvalidInput(_) | Error::InvalidThingDescription(_) => ResponseType::BadRequest,
        _ => ResponseType::InternalServerError,
    }
}

async fn find_thing(things: &CoapState, url_name: &str) -> Result<Arc<ExposedThing>, Error> {
    let things = things.lock().await;
    for thing in things.values() {
        if thing.thing().await.url_name() == url_name {
            return Ok(thing.clone());
        }
    }
    Err(Error::NotFound(url_name.to_string()))
}

async fn handle_datagram(socket: Arc<UdpSocket>, things: CoapState, buffer: Vec<u8>, source: SocketAddr) {
    let packet = match Packet::from_bytes(&buffer) {
        Ok(packet) => packet,
        Err(error) => {
            warn!(%error, "malformed CoAP packet");
            return;
        }
    };

    let mut request: CoapRequest<SocketAddr> = CoapRequest::from_packet(packet, source);
    let segments = path_segments(&request);

    let result = route(&things, &request, &segments).await;

    if let Some(response) = request.response.as_mut() {
        match result {
            Ok(body) => {
                response.message.payload = serde_json::to_vec(&body).unwrap_or_default();
                response.set_status(ResponseType::Content);
            }
            Err(error) => {
                response.message.payload = error.to_string().into_bytes();
                response.set_status(error_status(&error));
            }
        }

        if let Ok(bytes) = response.message.to_bytes() {
            let _ = socket.send_to(&bytes, source).await;
        }
    }
}

async fn route(things: &CoapState, request: &CoapRequest<SocketAddr>, segments: &[String]) -> Result<Value, Error> {
    let method = request.get_method().clone();

    match segments {
        [thing, kind, name] if kind == "property" => {
            let exposed_thing = find_thing(things, thing).await?;
            match method {
                RequestType::Get => {
                    let value = exposed_thing.read_property(name).await?;
                    Ok(serde_json::json!({ "value": value }))
                }
                RequestType::Post => {
                    let value = json_body(request).get("value").cloned().unwrap_or(Value::Null);
                    exposed_thing.write_property(name, value).await?;
                    Ok(Value::Null)
                }
                _ => Err(Error::NoHandler(format!("{method:?}"))),
            }
        }
        [thing, kind, name] if kind == "action" && method == RequestType::Post => {
            let exposed_thing = find_thing(things, thing).await?;
            let input = json_body(request).get("input").cloned().unwrap_or(Value::Null);
            match exposed_thing.invoke_action(name, input).await {
                Ok(result) => Ok(serde_json::json!({ "done": true, "result": result })),
                Err(error) => Ok(serde_json::json!({ "done": true, "error": error.to_string() })),
            }
        }
        [thing, kind, name] if kind == "event" && method == RequestType::Get => {
            let exposed_thing = find_thing(things, thing).await?;
            let value = exposed_thing.read_property(name).await.unwrap_or(Value::Null);
            Ok(serde_json::json!({ "data": value }))
        }
        _ => Err(Error::NotFound(segments.join("/"))),
    }
}

fn property_forms(hostname: &str, port: u16, url_name: &str, name: &str, observable: bool, writable: bool) -> Vec<Form> {
    let href = format!("coap://{hostname}:{port}/{url_name}/property/{name}");
    let mut forms = vec![Form::new(href.clone(), Rel::Readproperty, vec![Op::ReadProperty])];
    if writable {
        forms.push(Form::new(href.clone(), Rel::Writeproperty, vec![Op::WriteProperty]));
    }
    if observable {
        forms.push(Form::new(href, Rel::Observeproperty, vec![Op::ObserveProperty]));
    }
    forms
}

#[async_trait]
impl ServerBinding for CoapServer {
    fn protocol(&self) -> Protocol {
        Protocol::Coap
    }

    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Error> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let socket = Arc::new(
            UdpSocket::bind(addr)
                .await
                .map_err(|error| Error::Internal(error.to_string()))?,
        );

        info!(port = self.port, "CoAP binding listening");

        let socket_for_loop = socket.clone();
        let things = self.things.clone();
        *handle = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match socket_for_loop.recv_from(&mut buf).await {
                    Ok((len, source)) => {
                        let datagram = buf[..len].to_vec();
                        let socket = socket_for_loop.clone();
                        let things = things.clone();
                        tokio::spawn(handle_datagram(socket, things, datagram, source));
                    }
                    Err(error) => {
                        warn!(%error, "CoAP socket read error");
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Error> {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn add_exposed_thing(&self, exposed_thing: Arc<ExposedThing>) {
        let id = exposed_thing.id().await;
        self.things.lock().await.insert(id, exposed_thing);
    }

    async fn remove_exposed_thing(&self, thing_id: &str) {
        self.things.lock().await.remove(thing_id);
    }

    fn build_forms(&self, hostname: &str, thing: &Thing, interaction_name: &str) -> Vec<Form> {
        let url_name = thing.url_name();

        if let Some(property) = thing.properties.get(interaction_name) {
            return property_forms(hostname, self.port, &url_name, interaction_name, property.observable, property.writable);
        }

        if thing.actions.contains_key(interaction_name) {
            let href = format!("coap://{hostname}:{}/{url_name}/action/{interaction_name}", self.port);
            return vec![Form::new(href, Rel::Invokeaction, vec![Op::InvokeAction])];
        }

        if thing.events.contains_key(interaction_name) {
            let href = format!("coap://{hostname}:{}/{url_name}/event/{interaction_name}", self.port);
            return vec![Form::new(href, Rel::Subscribeevent, vec![Op::SubscribeEvent])];
        }

        Vec::new()
    }

    fn build_base_url(&self, hostname: &str, thing: &Thing) -> String {
        format!("coap://{hostname}:{}/{}", self.port, thing.url_name())
    }
}


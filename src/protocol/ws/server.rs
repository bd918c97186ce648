use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Extension, Path, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::protocol::{Protocol, ServerBinding};
use crate::td::{Form, Op, Rel, Thing};

use super::rpc::{Notification, Outbound, Request, Response};

type WsState = Arc<Mutex<HashMap<String, Arc<ExposedThing>>>>;

/// Server-side WebSocket binding. One connection serves exactly one Thing, addressed by
/// `ws://host:port/<thing_url_name>`, and multiplexes every interaction over that single
/// socket using a JSON-RPC-like framing.
pub struct WsServer {
    port: u16,
    things: WsState,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WsServer {
    /// A new WebSocket binding bound to `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            things: Arc::new(Mutex::new(HashMap::new())),
            handle: Mutex::new(None),
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(thing_url_name): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(state): Extension<WsState>,
) -> impl IntoResponse {
    debug!(%addr, thing = %thing_url_name, "websocket upgrade requested");
    ws.on_upgrade(move |socket| handle_connection(socket, thing_url_name, state))
}

async fn find_thing(state: &WsState, url_name: &str) -> Result<Arc<ExposedThing>, Error> {
    let things = state.lock().await;
    for thing in things.values() {
        if thing.thing().await.url_name() == url_name {
            return Ok(thing.clone());
        }
    }
    Err(Error::NotFound(url_name.to_string()))
}

struct LiveSubscription {
    exposed_thing: Arc<ExposedThing>,
    subscription_id: crate::bus::SubscriptionId,
    task: JoinHandle<()>,
}

async fn handle_connection(socket: WebSocket, thing_url_name: String, state: WsState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let write_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let text = serde_json::to_string(&outbound).expect("RPC envelopes always serialize");
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashMap<String, LiveSubscription> = HashMap::new();

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let request: Request = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "malformed request");
                continue;
            }
        };

        let id = request.id.clone();
        let response = dispatch(&state, &thing_url_name, request, &tx, &mut subscriptions).await;
        let outbound = match response {
            Ok(value) => Outbound::Response(Response::ok(id, value)),
            Err(error) => Outbound::Response(Response::err(id, &error)),
        };

        if tx.send(outbound).is_err() {
            break;
        }
    }

    for (_, subscription) in subscriptions.drain() {
        subscription.task.abort();
        subscription.exposed_thing.dispose(subscription.subscription_id).await;
    }

    drop(tx);
    let _ = write_task.await;
    debug!("websocket connection closed");
}

async fn dispatch(
    state: &WsState,
    thing_url_name: &str,
    request: Request,
    tx: &mpsc::UnboundedSender<Outbound>,
    subscriptions: &mut HashMap<String, LiveSubscription>,
) -> Result<serde_json::Value, Error> {
    let exposed_thing = find_thing(state, thing_url_name).await?;

    match request.method.as_str() {
        "read_property" => {
            let name = param_str(&request.params, "name")?;
            let value = exposed_thing.read_property(&name).await?;
            Ok(serde_json::json!({ "value": value }))
        }
        "write_property" => {
            let name = param_str(&request.params, "name")?;
            let value = request.params.get("value").cloned().unwrap_or(serde_json::Value::Null);
            exposed_thing.write_property(&name, value).await?;
            Ok(serde_json::Value::Null)
        }
        "invoke_action" => {
            let name = param_str(&request.params, "name")?;
            let input = request.params.get("input").cloned().unwrap_or(serde_json::Value::Null);
            let result = exposed_thing.invoke_action(&name, input).await?;
            Ok(serde_json::json!({ "result": result }))
        }
        "on_property_change" => {
            let name = param_str(&request.params, "name")?;
            let (sub_id, stream) = exposed_thing.observe_property(&name).await?;
            spawn_subscription_forwarder(exposed_thing.clone(), sub_id, stream, tx.clone(), subscriptions);
            Ok(serde_json::json!({ "subscription": sub_id_key(sub_id) }))
        }
        "on_event" => {
            let name = param_str(&request.params, "name")?;
            let (sub_id, stream) = exposed_thing.on_event(&name).await?;
            spawn_subscription_forwarder(exposed_thing.clone(), sub_id, stream, tx.clone(), subscriptions);
            Ok(serde_json::json!({ "subscription": sub_id_key(sub_id) }))
        }
        "dispose" => {
            let key = param_str(&request.params, "subscription")?;
            if let Some(subscription) = subscriptions.remove(&key) {
                subscription.task.abort();
                subscription.exposed_thing.dispose(subscription.subscription_id).await;
            }
            Ok(serde_json::Value::Null)
        }
        other => Err(Error::UnknownInteraction(other.to_string())),
    }
}

fn sub_id_key(id: crate::bus::SubscriptionId) -> String {
    format!("{id:?}")
}

fn spawn_subscription_forwarder(
    exposed_thing: Arc<ExposedThing>,
    subscription_id: crate::bus::SubscriptionId,
    mut stream: impl futures::Stream<Item = crate::bus::Emission> + Unpin + Send + 'static,
    tx: mpsc::UnboundedSender<Outbound>,
    subscriptions: &mut HashMap<String, LiveSubscription>,
) {
    let key = sub_id_key(subscription_id);
    let key_for_task = key.clone();

    let task = tokio::spawn(async move {
        while let Some(emission) = stream.next().await {
            let data = serde_json::json!({ "name": emission.name, "value": emission.data });
            let notification = Outbound::Notification(Notification::emit(key_for_task.clone(), data));
            if tx.send(notification).is_err() {
                break;
            }
        }
    });

    subscriptions.insert(
        key,
        LiveSubscription {
            exposed_thing,
            subscription_id,
            task,
        },
    );
}

fn param_str(params: &serde_json::Value, field: &str) -> Result<String, Error> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("missing `{field}` parameter")))
}

#[async_trait]
impl ServerBinding for WsServer {
    fn protocol(&self) -> Protocol {
        Protocol::Ws
    }

    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Error> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let app = Router::new()
            .route("/:thing", get(ws_handler))
            .layer(Extension(self.things.clone()));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server = axum::Server::bind(&addr).serve(app.into_make_service_with_connect_info::<SocketAddr>());

        info!(port = self.port, "WebSocket binding listening");
        *handle = Some(tokio::spawn(async move {
            if let Err(error) = server.await {
                warn!(%error, "WebSocket server exited with error");
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
        let href = format!("ws://{hostname}:{}/{url_name}", self.port);

        if let Some(property) = thing.properties.get(interaction_name) {
            let mut forms = vec![Form::new(href.clone(), Rel::Readproperty, vec![Op::ReadProperty])];
            if property.writable {
                forms.push(Form::new(href.clone(), Rel::Writeproperty, vec![Op::WriteProperty]));
            }
            if property.observable {
                forms.push(Form::new(href, Rel::Observeproperty, vec![Op::ObserveProperty]));
            }
            return forms;
        }

        if thing.actions.contains_key(interaction_name) {
            return vec![Form::new(href, Rel::Invokeaction, vec![Op::InvokeAction])];
        }

        if thing.events.contains_key(interaction_name) {
            return vec![Form::new(href, Rel::Subscribeevent, vec![Op::SubscribeEvent])];
        }

        Vec::new()
    }

    fn build_base_url(&self, hostname: &str, thing: &Thing) -> String {
        format!("ws://{hostname}:{}/{}", self.port, thing.url_name())
    }
}

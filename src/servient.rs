use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::ServientConfig;
use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::protocol::http::{HttpClient, HttpServer};
use crate::protocol::ws::{WsClient, WsServer};
#[cfg(feature = "coap")]
use crate::protocol::coap::{CoapClient, CoapServer};
use crate::protocol::{ClientBinding, Protocol, ServerBinding, Verb};
use crate::td::{interaction::InteractionKind, Thing};

/// Per-kind protocol preference used by [`Servient::select_client`]: properties have
/// no preference, while actions and events prefer the WebSocket binding for its duplex channel.
fn preference_for(kind: InteractionKind) -> &'static [Protocol] {
    match kind {
        InteractionKind::Property => &[],
        InteractionKind::Action => &[Protocol::Ws],
        InteractionKind::Event => &[Protocol::Ws],
    }
}

/// The root object of this crate: owns every exposed Thing, every attached protocol server and
/// client, and the optional TD catalogue HTTP endpoint.
pub struct Servient {
    config: ServientConfig,
    things: RwLock<HashMap<String, Arc<ExposedThing>>>,
    servers: Vec<Arc<dyn ServerBinding>>,
    clients: Vec<Arc<dyn ClientBinding>>,
    catalogue_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Servient {
    /// Build a servient from a configuration. Servers/clients are constructed for every
    /// binding the configuration enables; nothing is started yet.
    pub fn new(config: ServientConfig) -> Result<Self, Error> {
        config.validate()?;

        let mut servers: Vec<Arc<dyn ServerBinding>> = Vec::new();
        let mut clients: Vec<Arc<dyn ClientBinding>> = Vec::new();

        if let Some(http) = &config.http {
            servers.push(Arc::new(HttpServer::new(http.port)));
            clients.push(Arc::new(HttpClient::new()));
        }

        if let Some(ws) = &config.ws {
            servers.push(Arc::new(WsServer::new(ws.port)));
            clients.push(Arc::new(WsClient::new()));
        }

        #[cfg(feature = "coap")]
        if let Some(coap) = &config.coap {
            servers.push(Arc::new(CoapServer::new(coap.port)));
            clients.push(Arc::new(CoapClient::new()));
        }

        Ok(Self {
            config,
            things: RwLock::new(HashMap::new()),
            servers,
            clients,
            catalogue_handle: Mutex::new(None),
        })
    }

    /// The hostname this servient advertises in Forms and catalogue `base` fields.
    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// The per-subscriber buffer size new `ExposedThing`s should be built with.
    pub fn subscription_buffer(&self) -> usize {
        self.config.subscription_buffer
    }

    /// Register an `ExposedThing`, replacing any prior Thing with the same id.
    /// Does not expose it; call [`ExposedThing::expose`] and then [`Self::refresh_forms`].
    pub async fn add_exposed_thing(&self, exposed_thing: Arc<ExposedThing>) {
        let id = exposed_thing.id().await;
        self.things.write().await.insert(id, exposed_thing);
    }

    /// Disable and remove an `ExposedThing` by id. First disables it on every server.
    pub async fn remove_exposed_thing(&self, thing_id: &str) {
        if let Some(exposed_thing) = self.things.write().await.remove(thing_id) {
            exposed_thing.destroy().await;
            for server in &self.servers {
                server.remove_exposed_thing(thing_id).await;
            }
        }
    }

    /// All currently registered Things, keyed by id.
    pub async fn exposed_things(&self) -> HashMap<String, Arc<ExposedThing>> {
        self.things.read().await.clone()
    }

    /// Regenerate forms for every exposed Thing against every attached server.
    /// For each server, every form whose scheme belongs to that server's protocol is dropped
    /// from the Thing's TD, then rebuilt if the Thing is currently exposed on that server.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn refresh_forms(&self) {
        let things = self.things.read().await;

        for exposed_thing in things.values() {
            let mut thing = exposed_thing.thing().await;
            let is_exposed = exposed_thing.is_exposed().await;

            for server in &self.servers {
                let protocol = server.protocol();
                strip_forms_for_protocol(&mut thing, protocol);

                if is_exposed {
                    server.add_exposed_thing(exposed_thing.clone()).await;
                    append_built_forms(&mut thing, server.as_ref(), &self.config.hostname);
                } else {
                    server.remove_exposed_thing(&thing.id).await;
                }
            }

            exposed_thing.set_thing(thing).await;
        }

        debug!("forms refreshed");
    }

    /// Choose a protocol binding for an interaction on a ConsumedThing.
    pub fn select_client(&self, thing: &Thing, name: &str) -> Result<Arc<dyn ClientBinding>, Error> {
        let kind = thing
            .interaction_kind(name)
            .ok_or_else(|| Error::UnknownInteraction(name.to_string()))?;

        let supported: Vec<&Arc<dyn ClientBinding>> = self
            .clients
            .iter()
            .filter(|client| client.is_supported_interaction(thing, name))
            .collect();

        if supported.is_empty() {
            return Err(Error::NoClientForInteraction(name.to_string()));
        }

        for preferred in preference_for(kind) {
            if let Some(client) = supported.iter().find(|c| c.protocol() == *preferred) {
                return Ok((*client).clone());
            }
        }

        Ok(supported[0].clone())
    }

    /// The base URL a catalogue entry for `thing` should advertise: the lexicographically
    /// smallest active server protocol's base URL when more than one server is attached.
    pub fn base_url_for(&self, thing: &Thing) -> Option<String> {
        let mut tagged: Vec<(&'static str, String)> = self
            .servers
            .iter()
            .map(|server| (server.protocol().scheme(), server.build_base_url(&self.config.hostname, thing)))
            .collect();
        tagged.sort_by(|a, b| a.0.cmp(b.0));
        tagged.into_iter().next().map(|(_, url)| url)
    }

    /// Start every attached server concurrently, then the catalogue if configured. Returns only
    /// once every server is listening.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<(), Error> {
        let starts = self.servers.iter().map(|server| server.start());
        futures::future::try_join_all(starts).await?;

        self.refresh_forms().await;

        self.start_catalogue().await?;

        info!("servient started");
        Ok(())
    }

    async fn start_catalogue(self: &Arc<Self>) -> Result<(), Error> {
        let mut handle = self.catalogue_handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let servient = self.clone();
        let app = Router::new()
            .route("/", get(catalogue_index))
            .route("/:url_name", get(catalogue_thing))
            .layer(Extension(servient));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.catalogue_port));
        let server = axum::Server::bind(&addr).serve(app.into_make_service());

        info!(port = self.config.catalogue_port, "TD catalogue listening");
        *handle = Some(tokio::spawn(async move {
            if let Err(error) = server.await {
                warn!(%error, "catalogue server exited with error");
            }
        }));

        Ok(())
    }

    /// Stop the catalogue, then every server, best-effort: failures are logged, not re-raised,
    /// so other servers still stop.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if let Some(handle) = self.catalogue_handle.lock().await.take() {
            handle.abort();
        }

        for server in &self.servers {
            if let Err(error) = server.stop().await {
                warn!(%error, protocol = ?server.protocol(), "server failed to stop cleanly");
            }
        }

        info!("servient shut down");
    }
}

fn strip_forms_for_protocol(thing: &mut Thing, protocol: Protocol) {
    for property in thing.properties.values_mut() {
        property.forms.retain(|form| !protocol.matches_scheme(form.scheme()));
    }
    for action in thing.actions.values_mut() {
        action.forms.retain(|form| !protocol.matches_scheme(form.scheme()));
    }
    for event in thing.events.values_mut() {
        event.forms.retain(|form| !protocol.matches_scheme(form.scheme()));
    }
}

fn append_built_forms(thing: &mut Thing, server: &dyn ServerBinding, hostname: &str) {
    let property_names: Vec<String> = thing.properties.keys().cloned().collect();
    for name in property_names {
        let forms = server.build_forms(hostname, thing, &name);
        thing.properties.get_mut(&name).unwrap().forms.extend(forms);
    }

    let action_names: Vec<String> = thing.actions.keys().cloned().collect();
    for name in action_names {
        let forms = server.build_forms(hostname, thing, &name);
        thing.actions.get_mut(&name).unwrap().forms.extend(forms);
    }

    let event_names: Vec<String> = thing.events.keys().cloned().collect();
    for name in event_names {
        let forms = server.build_forms(hostname, thing, &name);
        thing.events.get_mut(&name).unwrap().forms.extend(forms);
    }
}

#[derive(Debug, Deserialize)]
struct CatalogueQuery {
    #[serde(default)]
    expanded: Option<String>,
}

fn is_truthy(value: &Option<String>) -> bool {
    matches!(value.as_deref().map(str::to_ascii_lowercase).as_deref(), Some("true") | Some("1"))
}

async fn catalogue_index(
    Extension(servient): Extension<Arc<Servient>>,
    Query(query): Query<CatalogueQuery>,
) -> impl IntoResponse {
    let things = servient.exposed_things().await;
    let mut body = serde_json::Map::new();

    for exposed_thing in things.values() {
        let mut thing = exposed_thing.thing().await;
        let url_name = thing.url_name();

        if is_truthy(&query.expanded) {
            thing.base = servient.base_url_for(&thing);
            body.insert(thing.id.clone(), serde_json::to_value(&thing).unwrap());
        } else {
            body.insert(thing.id.clone(), Value::String(format!("/{url_name}")));
        }
    }

    Json(Value::Object(body))
}

async fn catalogue_thing(
    Path(url_name): Path<String>,
    Extension(servient): Extension<Arc<Servient>>,
) -> impl IntoResponse {
    let things = servient.exposed_things().await;

    for exposed_thing in things.values() {
        let mut thing = exposed_thing.thing().await;
        if thing.url_name() == url_name {
            thing.base = servient.base_url_for(&thing);
            return (axum::http::StatusCode::OK, Json(serde_json::to_value(&thing).unwrap()));
        }
    }

    (axum::http::StatusCode::NOT_FOUND, Json(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;

    fn thing_json() -> &'static str {
        r#"{
            "id": "urn:test",
            "title": "Test",
            "@context": "https://www.w3.org/2019/wot/td/v1",
            "properties": { "x": { "dataSchema": {}, "writable": true, "observable": true } },
            "actions": { "go": {} },
            "events": { "e": {} }
        }"#
    }

    #[tokio::test]
    async fn select_client_prefers_ws_for_actions() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: Some(BindingConfig::plain(0)),
            ..ServientConfig::default()
        };
        let servient = Servient::new(config).unwrap();

        let mut thing = Thing::from_json(thing_json()).unwrap();
        // Simulate both bindings having contributed forms, as refresh_forms would.
        thing.actions.get_mut("go").unwrap().forms = vec![
            crate::td::Form::new("http://localhost:0/test/action/go", crate::td::Rel::Invokeaction, vec![crate::td::Op::InvokeAction]),
            crate::td::Form::new("ws://localhost:0/test", crate::td::Rel::Invokeaction, vec![crate::td::Op::InvokeAction]),
        ];

        let client = servient.select_client(&thing, "go").unwrap();
        assert_eq!(client.protocol(), Protocol::Ws);
    }

    #[tokio::test]
    async fn select_client_fails_for_unknown_interaction() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: None,
            ..ServientConfig::default()
        };
        let servient = Servient::new(config).unwrap();
        let thing = Thing::from_json(thing_json()).unwrap();

        let err = servient.select_client(&thing, "missing").unwrap_err();
        assert!(matches!(err, Error::UnknownInteraction(_)));
    }

    #[tokio::test]
    async fn base_url_picks_lexicographically_smallest_protocol() {
        let config = ServientConfig {
            http: Some(BindingConfig::plain(0)),
            ws: Some(BindingConfig::plain(0)),
            ..ServientConfig::default()
        };
        let servient = Servient::new(config).unwrap();
        let thing = Thing::from_json(thing_json()).unwrap();

        // "http" < "ws" lexicographically.
        let base = servient.base_url_for(&thing).unwrap();
        assert!(base.starts_with("http://"));
    }
}

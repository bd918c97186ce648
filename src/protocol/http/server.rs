use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, instrument, warn};

use crate::error::Error;
use crate::exposed_thing::ExposedThing;
use crate::td::{Form, Op, Rel, Thing};
use async_trait::async_trait;

use crate::protocol::{Protocol, ServerBinding};

/// Server-side HTTP binding: a REST mapping of interactions over a fixed port, plus CORS headers
/// on every response (layered with `tower`'s `ServiceBuilder` the same way;
/// here `tower_http::cors::CorsLayer` supplies the headers the original `wotpy` HTTP handlers
/// set by hand).
pub struct HttpServer {
    port: u16,
    things: HttpState,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Serialize)]
struct ValueBody {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WriteBody {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ActionBody {
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Serialize)]
struct ResultBody {
    result: Value,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.0.http_status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

struct ErrorResponse(Error);

impl From<Error> for ErrorResponse {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

type HttpState = Arc<Mutex<HashMap<String, Arc<ExposedThing>>>>;

impl HttpServer {
    /// A new HTTP binding bound to `port`. Call [`ServerBinding::start`] to begin accepting
    /// connections.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            things: Arc::new(Mutex::new(HashMap::new())),
            handle: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/:thing/property/:name", get(read_property).put(write_property).post(write_property))
            .route("/:thing/property/:name/observable", get(observe_property))
            .route("/:thing/action/:name", post(invoke_action))
            .route("/:thing/event/:name/subscription", get(subscribe_event))
            .layer(ServiceBuilder::new().layer(cors).layer(Extension(self.things.clone())))
    }
}

async fn find_thing(state: &HttpState, url_name: &str) -> Result<Arc<ExposedThing>, Error> {
    let things = state.lock().await;
    for thing in things.values() {
        if thing.thing().await.url_name() == url_name {
            return Ok(thing.clone());
        }
    }
    Err(Error::NotFound(url_name.to_string()))
}

async fn read_property(
    Path((thing, name)): Path<(String, String)>,
    Extension(state): Extension<HttpState>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let exposed_thing = find_thing(&state, &thing).await?;
    let value = exposed_thing.read_property(&name).await?;
    Ok(Json(ValueBody { value }))
}

async fn write_property(
    Path((thing, name)): Path<(String, String)>,
    Extension(state): Extension<HttpState>,
    body: Option<Json<WriteBody>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let exposed_thing = find_thing(&state, &thing).await?;
    let value = body.map(|Json(b)| b.value).unwrap_or(Value::Null);
    exposed_thing.write_property(&name, value).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn invoke_action(
    Path((thing, name)): Path<(String, String)>,
    Extension(state): Extension<HttpState>,
    body: Option<Json<ActionBody>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let exposed_thing = find_thing(&state, &thing).await?;
    let input = body.map(|Json(b)| b.input).unwrap_or(Value::Null);
    let result = exposed_thing.invoke_action(&name, input).await?;
    Ok(Json(ResultBody { result }))
}

async fn observe_property(
    Path((thing, name)): Path<(String, String)>,
    Extension(state): Extension<HttpState>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let exposed_thing = find_thing(&state, &thing).await?;
    let (_id, stream) = exposed_thing.observe_property(&name).await?;

    let sse_stream = stream.map(|emission| {
        let body = serde_json::json!({ "name": emission.name, "value": emission.data });
        Ok::<_, std::convert::Infallible>(SseEvent::default().json_data(body).unwrap_or_else(|_| SseEvent::default()))
    });

    Ok(Sse::new(sse_stream))
}

async fn subscribe_event(
    Path((thing, name)): Path<(String, String)>,
    Extension(state): Extension<HttpState>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let exposed_thing = find_thing(&state, &thing).await?;
    let (_id, stream) = exposed_thing.on_event(&name).await?;

    let sse_stream = stream.map(|emission| {
        let body = serde_json::json!({ "data": emission.data });
        Ok::<_, std::convert::Infallible>(SseEvent::default().json_data(body).unwrap_or_else(|_| SseEvent::default()))
    });

    Ok(Sse::new(sse_stream))
}

fn property_forms(hostname: &str, port: u16, url_name: &str, name: &str, observable: bool, writable: bool) -> Vec<Form> {
    let href = format!("http://{hostname}:{port}/{url_name}/property/{name}");
    let mut forms = vec![Form::new(href.clone(), Rel::Readproperty, vec![Op::ReadProperty])];

    if writable {
        forms.push(Form::new(href.clone(), Rel::Writeproperty, vec![Op::WriteProperty]));
    }

    if observable {
        forms.push(Form::new(
            format!("{href}/observable"),
            Rel::Observeproperty,
            vec![Op::ObserveProperty],
        ));
    }

    forms
}

#[async_trait]
impl ServerBinding for HttpServer {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Error> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let app = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server = axum::Server::bind(&addr).serve(app.into_make_service());

        info!(port = self.port, "HTTP binding listening");
        *handle = Some(tokio::spawn(async move {
            if let Err(error) = server.await {
                warn!(%error, "HTTP server exited with error");
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
            let href = format!("http://{hostname}:{}/{url_name}/action/{interaction_name}", self.port);
            return vec![Form::new(href, Rel::Invokeaction, vec![Op::InvokeAction])];
        }

        if thing.events.contains_key(interaction_name) {
            let href = format!("http://{hostname}:{}/{url_name}/event/{interaction_name}/subscription", self.port);
            return vec![Form::new(href, Rel::Subscribeevent, vec![Op::SubscribeEvent])];
        }

        Vec::new()
    }

    fn build_base_url(&self, hostname: &str, thing: &Thing) -> String {
        format!("http://{hostname}:{}/{}", self.port, thing.url_name())
    }
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use wot_servient::config::{BindingConfig, ServientConfig};
use wot_servient::exposed_thing::ExposedThing;
use wot_servient::servient::Servient;
use wot_servient::wot::Wot;

/// Build and start a servient with HTTP, WS, and the catalogue on the given fixed ports. Tests
/// each pick disjoint port ranges so they can run concurrently in the same binary.
pub async fn start_servient(http_port: u16, ws_port: u16, catalogue_port: u16) -> Result<Arc<Servient>> {
    let config = ServientConfig {
        hostname: "127.0.0.1".into(),
        catalogue_port,
        http: Some(BindingConfig::plain(http_port)),
        ws: Some(BindingConfig::plain(ws_port)),
        ..ServientConfig::default()
    };

    let servient = Arc::new(Servient::new(config)?);
    servient.start().await?;

    // Give the listeners a moment to accept connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(servient)
}

/// Produce, expose, and register a Thing from its TD JSON, returning the `ExposedThing` and a
/// `Wot` facade bound to the same servient.
pub async fn produce_and_expose(servient: &Arc<Servient>, td_json: &str) -> Result<Arc<ExposedThing>> {
    let wot = Wot::new(servient.clone());
    let exposed = wot.produce(td_json).await?;
    exposed.expose().await;
    servient.refresh_forms().await;
    Ok(exposed)
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

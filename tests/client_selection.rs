mod common;

use color_eyre::Result;
use wot_servient::config::{BindingConfig, ServientConfig};
use wot_servient::protocol::Protocol;
use wot_servient::servient::Servient;
use wot_servient::wot::Wot;

const SWITCH_TD: &str = r#"{
    "id": "urn:dev:ops:switch-1",
    "title": "Switch",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "actions": { "toggle": {} }
}"#;

#[tokio::test]
async fn prefers_websocket_for_actions_then_falls_back_to_http_after_removal() -> Result<()> {
    let config = ServientConfig {
        hostname: "127.0.0.1".into(),
        catalogue_port: 19582,
        http: Some(BindingConfig::plain(19580)),
        ws: Some(BindingConfig::plain(19581)),
        ..ServientConfig::default()
    };
    let servient = std::sync::Arc::new(Servient::new(config)?);
    let wot = Wot::new(servient.clone());

    let exposed = wot.produce(SWITCH_TD).await?;
    exposed.expose().await;
    servient.refresh_forms().await;

    let thing = exposed.thing().await;

    // Determinism: repeated calls with the same attached clients and TD agree.
    let first = servient.select_client(&thing, "toggle")?;
    let second = servient.select_client(&thing, "toggle")?;
    assert_eq!(first.protocol(), second.protocol());
    assert_eq!(first.protocol(), Protocol::Ws);

    exposed.destroy().await;
    servient.remove_exposed_thing(&thing.id).await;

    // Re-produce without a WS server attached and confirm the fallback.
    let http_only_config = ServientConfig {
        hostname: "127.0.0.1".into(),
        catalogue_port: 19583,
        http: Some(BindingConfig::plain(19584)),
        ws: None,
        ..ServientConfig::default()
    };
    let http_only_servient = std::sync::Arc::new(Servient::new(http_only_config)?);
    let http_only_wot = Wot::new(http_only_servient.clone());
    let exposed_http_only = http_only_wot.produce(SWITCH_TD).await?;
    exposed_http_only.expose().await;
    http_only_servient.refresh_forms().await;

    let thing_http_only = exposed_http_only.thing().await;
    let client = http_only_servient.select_client(&thing_http_only, "toggle")?;
    assert_eq!(client.protocol(), Protocol::Http);

    Ok(())
}

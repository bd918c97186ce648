mod common;

use std::time::Duration;

use color_eyre::Result;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;

const X_TD: &str = r#"{
    "id": "urn:dev:ops:sensor-x",
    "title": "Sensor",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "properties": {
        "x": { "dataSchema": {"type": "number"}, "writable": true, "observable": true }
    }
}"#;

#[tokio::test]
async fn websocket_subscriber_observes_a_write_made_over_http() -> Result<()> {
    let servient = common::start_servient(19280, 19281, 19282).await?;
    let exposed = common::produce_and_expose(&servient, X_TD).await?;
    let url_name = exposed.thing().await.url_name();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:19281/{url_name}")).await?;

    ws.send(tungstenite::Message::Text(
        serde_json::json!({"id": "1", "method": "on_property_change", "params": {"name": "x"}}).to_string(),
    ))
    .await?;

    let subscribe_response = timeout(Duration::from_secs(5), ws.next())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("connection closed"))??;
    let subscribe_response: serde_json::Value = serde_json::from_str(subscribe_response.to_text()?)?;
    assert!(subscribe_response["result"]["subscription"].is_string());

    let http = reqwest::Client::new();
    http.put(format!("http://127.0.0.1:19280/{url_name}/property/x"))
        .json(&serde_json::json!({ "value": 7 }))
        .send()
        .await?;

    let notification = timeout(Duration::from_secs(1), ws.next())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("connection closed"))??;
    let notification: serde_json::Value = serde_json::from_str(notification.to_text()?)?;

    assert_eq!(notification["method"], "emit");
    assert_eq!(notification["params"]["data"]["name"], "x");
    assert_eq!(notification["params"]["data"]["value"], 7);

    servient.shutdown().await;
    Ok(())
}

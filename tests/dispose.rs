mod common;

use std::time::Duration;

use color_eyre::Result;
use tokio::time::timeout;
use tokio_stream::StreamExt;

const ALARM_TD: &str = r#"{
    "id": "urn:dev:ops:alarm-2",
    "title": "Alarm",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "events": { "e": {} }
}"#;

#[tokio::test]
async fn dispose_stops_delivery_and_is_idempotent() -> Result<()> {
    let servient = common::start_servient(19480, 19481, 19482).await?;
    let exposed = common::produce_and_expose(&servient, ALARM_TD).await?;

    let (id, mut stream) = exposed.on_event("e").await?;

    exposed.emit_event("e", serde_json::json!(1)).await?;
    let first = stream.next().await.unwrap();
    assert_eq!(first.data, 1);

    exposed.dispose(id).await;
    exposed.dispose(id).await; // idempotent

    exposed.emit_event("e", serde_json::json!(2)).await?;

    let result = timeout(Duration::from_millis(200), stream.next()).await;
    assert!(result.is_err() || result.unwrap().is_none(), "no item should arrive after dispose");

    servient.shutdown().await;
    Ok(())
}

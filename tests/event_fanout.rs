mod common;

use color_eyre::Result;
use tokio_stream::StreamExt;

const ALARM_TD: &str = r#"{
    "id": "urn:dev:ops:alarm-1",
    "title": "Alarm",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "events": { "triggered": {} }
}"#;

#[tokio::test]
async fn every_subscriber_receives_every_emission_made_after_it_subscribes() -> Result<()> {
    let servient = common::start_servient(19380, 19381, 19382).await?;
    let exposed = common::produce_and_expose(&servient, ALARM_TD).await?;

    let mut subscribers = Vec::new();
    for _ in 0..5 {
        let (_id, stream) = exposed.on_event("triggered").await?;
        subscribers.push(stream);
    }

    exposed.emit_event("triggered", serde_json::json!({"level": 1})).await?;
    exposed.emit_event("triggered", serde_json::json!({"level": 2})).await?;

    for stream in &mut subscribers {
        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.data["level"], 1);
        assert_eq!(second.data["level"], 2);
    }

    servient.shutdown().await;
    Ok(())
}

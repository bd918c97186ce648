mod common;

use color_eyre::Result;

const TEMPERATURE_TD: &str = r#"{
    "id": "urn:dev:ops:thermostat-1",
    "title": "Thermostat",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "properties": {
        "temperature": { "dataSchema": {"type": "number"}, "writable": true, "observable": true }
    }
}"#;

#[tokio::test]
async fn http_write_then_read_round_trips() -> Result<()> {
    let servient = common::start_servient(19080, 19081, 19082).await?;
    let exposed = common::produce_and_expose(&servient, TEMPERATURE_TD).await?;

    let url_name = exposed.thing().await.url_name();
    let http = reqwest::Client::new();

    let response = http
        .put(format!("http://127.0.0.1:19080/{url_name}/property/temperature"))
        .json(&serde_json::json!({ "value": 22.5 }))
        .send()
        .await?;
    assert!(response.status().is_success());

    let body: serde_json::Value = http
        .get(format!("http://127.0.0.1:19080/{url_name}/property/temperature"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["value"], 22.5);

    // Agreement holds locally too.
    assert_eq!(exposed.read_property("temperature").await.unwrap(), 22.5);

    servient.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn http_write_to_nonexistent_property_is_not_found() -> Result<()> {
    let servient = common::start_servient(19083, 19084, 19085).await?;
    let exposed = common::produce_and_expose(&servient, TEMPERATURE_TD).await?;
    let url_name = exposed.thing().await.url_name();

    let http = reqwest::Client::new();
    let response = http
        .get(format!("http://127.0.0.1:19083/{url_name}/property/humidity"))
        .send()
        .await?;

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    servient.shutdown().await;
    Ok(())
}

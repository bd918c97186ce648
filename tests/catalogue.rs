mod common;

use color_eyre::Result;

const TD_A: &str = r#"{
    "id": "urn:a",
    "title": "A",
    "@context": "https://www.w3.org/2019/wot/td/v1"
}"#;

const TD_B: &str = r#"{
    "id": "urn:b",
    "title": "B",
    "@context": "https://www.w3.org/2019/wot/td/v1"
}"#;

#[tokio::test]
async fn catalogue_lists_exposed_things_and_removal_yields_404() -> Result<()> {
    let servient = common::start_servient(19680, 19681, 19682).await?;
    common::produce_and_expose(&servient, TD_A).await?;
    let exposed_b = common::produce_and_expose(&servient, TD_B).await?;

    let http = reqwest::Client::new();

    let index: serde_json::Value = http
        .get("http://127.0.0.1:19682/")
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(index["urn:a"], "/urn-a");
    assert_eq!(index["urn:b"], "/urn-b");

    let expanded: serde_json::Value = http
        .get("http://127.0.0.1:19682/?expanded=true")
        .send()
        .await?
        .json()
        .await?;
    assert!(expanded["urn:a"]["base"].as_str().is_some());
    assert!(expanded["urn:b"]["base"].as_str().is_some());

    servient.remove_exposed_thing(&exposed_b.id().await).await;

    let response = http.get("http://127.0.0.1:19682/urn-b").send().await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    servient.shutdown().await;
    Ok(())
}

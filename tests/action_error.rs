mod common;

use std::sync::Arc;

use color_eyre::Result;
use wot_servient::error::Error;

const FAIL_TD: &str = r#"{
    "id": "urn:dev:ops:fallible-1",
    "title": "Fallible",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "actions": { "fail": {} }
}"#;

#[tokio::test]
async fn failing_action_surfaces_as_http_500_with_handler_error_kind() -> Result<()> {
    let servient = common::start_servient(19180, 19181, 19182).await?;
    let exposed = common::produce_and_expose(&servient, FAIL_TD).await?;

    exposed
        .set_action_handler(
            "fail",
            Arc::new(|_| Box::pin(async { Err(Error::HandlerError("boom".into())) })),
        )
        .await?;

    let url_name = exposed.thing().await.url_name();
    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://127.0.0.1:19180/{url_name}/action/fail"))
        .json(&serde_json::json!({ "input": null }))
        .send()
        .await?;

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["kind"], "HandlerError");
    assert_eq!(body["error"]["message"], "handler error: boom");

    servient.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn action_without_handler_fails_locally_with_no_handler() -> Result<()> {
    let servient = common::start_servient(19183, 19184, 19185).await?;
    let exposed = common::produce_and_expose(&servient, FAIL_TD).await?;

    let err = exposed.invoke_action("fail", serde_json::Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::NoHandler(_)));

    servient.shutdown().await;
    Ok(())
}

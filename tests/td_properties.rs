mod common;

use color_eyre::Result;
use wot_servient::td::Thing;

const FULL_TD: &str = r#"{
    "id": "urn:dev:ops:multi-1",
    "title": "Multi",
    "@context": "https://www.w3.org/2019/wot/td/v1",
    "properties": {
        "level": { "dataSchema": {"type": "number"}, "writable": true, "observable": true }
    },
    "actions": { "reset": {} },
    "events": { "changed": {} }
}"#;

#[tokio::test]
async fn parsing_and_reserializing_without_base_reproduces_the_document() -> Result<()> {
    let thing = Thing::from_json(FULL_TD)?;
    let round_tripped = thing.to_json_without_base()?;

    let original_value: serde_json::Value = serde_json::from_str(FULL_TD)?;
    let round_tripped_value: serde_json::Value = serde_json::from_str(&round_tripped)?;

    assert_eq!(original_value, round_tripped_value);
    Ok(())
}

#[tokio::test]
async fn every_attached_server_contributes_a_matching_form_after_expose() -> Result<()> {
    let servient = common::start_servient(19780, 19781, 19782).await?;
    let exposed = common::produce_and_expose(&servient, FULL_TD).await?;
    let thing = exposed.thing().await;

    let level = &thing.properties["level"];
    assert!(level.forms.iter().any(|f| f.scheme() == "http"));
    assert!(level.forms.iter().any(|f| f.scheme() == "ws"));

    let reset = &thing.actions["reset"];
    assert!(reset.forms.iter().any(|f| f.scheme() == "http"));
    assert!(reset.forms.iter().any(|f| f.scheme() == "ws"));

    let changed = &thing.events["changed"];
    assert!(changed.forms.iter().any(|f| f.scheme() == "http"));
    assert!(changed.forms.iter().any(|f| f.scheme() == "ws"));

    servient.shutdown().await;
    Ok(())
}

use std::io::Write;
use std::sync::Arc;

use docgate::DocumentRequest;
use docgate::GatewayConfig;
use docgate::MemDocumentStore;
use docgate::MemoryChannel;
use docgate::ResponseStatus;
use serde_json::json;

use crate::common;

async fn send(
    gateway: &docgate::DocumentGateway,
    request: DocumentRequest,
) -> Arc<MemoryChannel> {
    let channel = Arc::new(MemoryChannel::new());
    gateway.submit(request, channel.clone()).await.unwrap();
    common::response_of(&channel).await;
    channel
}

#[tokio::test]
async fn document_lifecycle_through_the_gateway() {
    let store = Arc::new(MemDocumentStore::new());
    let gateway = common::start_gateway(store.clone());
    let id = "id:music:music::lifecycle";

    let put = send(
        &gateway,
        DocumentRequest::put(id, r#"{"fields":{"title":"Blue","year":1971}}"#),
    )
    .await;
    assert_eq!(put.status(), Some(ResponseStatus::Ok));

    // condition does not hold
    let update = send(
        &gateway,
        DocumentRequest::update(id, r#"{"fields":{"year":{"increment":1}}}"#).with_condition("music.year == 1999"),
    )
    .await;
    assert_eq!(update.status(), Some(ResponseStatus::PreconditionFailed));

    let update = send(
        &gateway,
        DocumentRequest::update(id, r#"{"fields":{"year":{"increment":1}}}"#).with_condition("music.year == 1971"),
    )
    .await;
    assert_eq!(update.status(), Some(ResponseStatus::Ok));

    let get = send(&gateway, DocumentRequest::get(id)).await;
    assert_eq!(
        get.json().unwrap(),
        json!({
            "pathId": format!("/document/v1/{id}"),
            "id": id,
            "fields": {"title": "Blue", "year": 1972}
        })
    );

    let remove = send(&gateway, DocumentRequest::remove(id)).await;
    assert_eq!(remove.status(), Some(ResponseStatus::Ok));
    assert!(store.is_empty());

    let get = send(&gateway, DocumentRequest::get(id)).await;
    assert_eq!(get.status(), Some(ResponseStatus::NotFound));

    let remove = send(&gateway, DocumentRequest::remove(id)).await;
    assert_eq!(remove.status(), Some(ResponseStatus::Ok));

    let report = gateway.shutdown().await;
    assert!(report.drained);
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let gateway = common::start_gateway(Arc::new(MemDocumentStore::new()));

    let bad_id = send(&gateway, DocumentRequest::remove("not-an-id")).await;
    assert_eq!(bad_id.status(), Some(ResponseStatus::BadRequest));

    let bad_body = send(&gateway, DocumentRequest::put("id:music:music::1", "{not json")).await;
    assert_eq!(bad_body.status(), Some(ResponseStatus::BadRequest));
    assert!(bad_body.json().unwrap()["message"].is_string());

    gateway.shutdown().await;
}

#[tokio::test]
async fn override_file_tunes_the_gateway() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[queue]
max_queue_depth = 1

[visiting]
default_max_pending = 4
"#
    )
    .unwrap();

    let config = GatewayConfig::default()
        .with_override_config(file.path().to_str().unwrap())
        .unwrap()
        .validate()
        .unwrap();
    assert_eq!(config.queue.max_queue_depth, 1);

    let gateway = common::start_gateway_with(config, common::seeded_store(1));
    assert_eq!(gateway.visitor_parameters().build().unwrap().max_pending(), 4);

    let get = send(&gateway, DocumentRequest::get("id:music:music::1")).await;
    assert_eq!(get.json().unwrap()["fields"]["title"], "song 1");

    gateway.shutdown().await;
}

use std::collections::BTreeSet;
use std::sync::Arc;

use docgate::DocumentRequest;
use docgate::MemDocumentStore;
use docgate::MemoryChannel;
use docgate::ResponseFormat;
use docgate::ResponseStatus;
use docgate::VisitRequest;
use docgate::FLUSH_BATCH_SIZE;
use serde_json::json;
use serde_json::Value;

use crate::common;

fn ids_of(documents: &Value) -> Vec<String> {
    documents
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect()
}

fn put_ids(lines: &[Value]) -> BTreeSet<String> {
    lines
        .iter()
        .filter_map(|l| l.get("put"))
        .map(|id| id.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn paginated_visit_resumes_until_exhausted() {
    let gateway = common::start_gateway(common::seeded_store(40));
    let params = gateway.visitor_parameters().wanted_document_count(5).build().unwrap();

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let params = match &token {
            Some(token) => params.with_resume_token(token.clone()),
            None => params.clone(),
        };
        let channel = Arc::new(MemoryChannel::new());
        gateway.visit(VisitRequest::new(params), channel.clone()).await.unwrap();
        common::response_of(&channel).await;

        assert_eq!(channel.status(), Some(ResponseStatus::Ok));
        let body = channel.json().unwrap();
        let page = ids_of(&body["documents"]);
        assert_eq!(body["documentCount"], page.len());
        seen.extend(page);
        pages += 1;

        match body.get("continuation") {
            Some(next) => token = Some(next.as_str().unwrap().to_string()),
            None => break,
        }
        assert!(pages < 40, "visit never finished");
    }

    assert!(pages > 1);
    let unique: BTreeSet<String> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), seen.len(), "documents visited twice");
    let expected: BTreeSet<String> = (1..=40).map(|n| common::doc_id(n).as_str().to_string()).collect();
    assert_eq!(unique, expected);
    assert_eq!(gateway.active_visits(), 0);
}

#[tokio::test]
async fn slices_partition_a_streamed_visit() {
    let gateway = common::start_gateway(common::seeded_store(30));

    let mut union = BTreeSet::new();
    let mut total = 0;
    for slice in 0..3 {
        let params = gateway.visitor_parameters().slice(3, slice).build().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        gateway
            .visit(
                VisitRequest::new(params).with_format(ResponseFormat::Lines),
                channel.clone(),
            )
            .await
            .unwrap();
        common::response_of(&channel).await;

        let lines = channel.json_lines().unwrap();
        let ids = put_ids(&lines);
        total += ids.len();
        union.extend(ids);
        assert_eq!(
            lines.last().unwrap(),
            &json!({"continuation": {"percentFinished": 100.0}})
        );
    }

    assert_eq!(total, 30);
    assert_eq!(union.len(), 30);
}

#[tokio::test]
async fn removed_documents_are_streamed_on_request() {
    let store = common::seeded_store(6);
    let gateway = common::start_gateway(store.clone());
    for n in [2, 5] {
        let channel = Arc::new(MemoryChannel::new());
        gateway
            .submit(DocumentRequest::remove(common::doc_id(n).as_str()), channel.clone())
            .await
            .unwrap();
        common::response_of(&channel).await;
    }

    let params = gateway.visitor_parameters().include_removes(true).build().unwrap();
    let channel = Arc::new(MemoryChannel::new());
    gateway
        .visit(
            VisitRequest::new(params).with_format(ResponseFormat::Lines),
            channel.clone(),
        )
        .await
        .unwrap();
    common::response_of(&channel).await;

    let lines = channel.json_lines().unwrap();
    let removed: BTreeSet<&str> = lines.iter().filter_map(|l| l["remove"].as_str()).collect();
    assert_eq!(
        removed,
        [common::doc_id(2), common::doc_id(5)].iter().map(|id| id.as_str()).collect()
    );
    assert_eq!(put_ids(&lines).len(), 4);
}

#[tokio::test]
async fn forwarded_visit_copies_every_document() {
    let store = common::seeded_store(12);
    let backup = Arc::new(MemDocumentStore::new());
    store.add_destination("backup-cluster", backup.clone());
    let gateway = common::start_gateway(store.clone());
    let params = gateway
        .visitor_parameters()
        .remote_destination("backup-cluster")
        .build()
        .unwrap();

    let channel = Arc::new(MemoryChannel::new());
    gateway.visit_and_forward(VisitRequest::new(params), channel.clone()).await.unwrap();
    common::response_of(&channel).await;

    let body = channel.json().unwrap();
    assert_eq!(channel.status(), Some(ResponseStatus::Ok));
    assert_eq!(body["documentCount"], 12);
    assert!(body.get("documents").is_none());
    assert_eq!(backup.len(), 12);
    for n in 1..=12 {
        assert_eq!(backup.document(&common::doc_id(n)), store.document(&common::doc_id(n)));
    }
}

#[tokio::test]
async fn forwarding_to_an_unknown_destination_is_a_bad_request() {
    let gateway = common::start_gateway(common::seeded_store(1));
    let params = gateway.visitor_parameters().remote_destination("nowhere").build().unwrap();

    let channel = Arc::new(MemoryChannel::new());
    let result = gateway.visit_and_forward(VisitRequest::new(params), channel.clone()).await;

    assert!(result.is_err());
    assert_eq!(channel.status(), Some(ResponseStatus::BadRequest));
    assert_eq!(gateway.active_visits(), 0);
}

#[tokio::test]
async fn large_visit_is_flushed_in_batches() {
    let documents = 3 * FLUSH_BATCH_SIZE + 17;
    let gateway = common::start_gateway(common::seeded_store(documents));
    let params = gateway.visitor_parameters().max_pending(documents).build().unwrap();

    let channel = Arc::new(MemoryChannel::new());
    gateway
        .visit(
            VisitRequest::new(params).with_format(ResponseFormat::Lines),
            channel.clone(),
        )
        .await
        .unwrap();
    common::response_of(&channel).await;

    let lines = channel.json_lines().unwrap();
    assert_eq!(put_ids(&lines).len(), documents);
    assert!(lines.contains(&json!({"documentCount": documents})));
    assert!(channel.write_count() >= documents.div_ceil(FLUSH_BATCH_SIZE));
    assert_eq!(channel.close_count(), 1);
}

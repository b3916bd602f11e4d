use std::sync::Arc;
use std::time::Duration;

use docgate::AdmissionError;
use docgate::DocumentRequest;
use docgate::Error;
use docgate::MemoryChannel;
use docgate::ResponseFormat;
use docgate::ResponseStatus;
use docgate::VisitMutation;
use docgate::VisitRequest;

use crate::common;

#[tokio::test]
async fn shutdown_after_mixed_work_drains_everything() {
    let store = common::seeded_store(50);
    let gateway = common::start_gateway(store.clone());

    let mut channels = Vec::new();
    for n in 1..=10 {
        let channel = Arc::new(MemoryChannel::new());
        gateway
            .submit(DocumentRequest::get(common::doc_id(n).as_str()), channel.clone())
            .await
            .unwrap();
        channels.push(channel);
    }
    let params = gateway.visitor_parameters().build().unwrap();
    let visit = Arc::new(MemoryChannel::new());
    gateway
        .visit(
            VisitRequest::new(params.clone()).with_format(ResponseFormat::Lines),
            visit.clone(),
        )
        .await
        .unwrap();
    let removal = Arc::new(MemoryChannel::new());
    gateway
        .visit_and_mutate(VisitRequest::new(params), VisitMutation::Remove, removal.clone())
        .await
        .unwrap();
    common::response_of(&removal).await;

    let report = gateway.shutdown_within(Duration::from_secs(5)).await;

    assert!(report.drained, "{report:?}");
    assert_eq!(report.residual_operations, 0);
    assert_eq!(report.residual_outstanding, 0);
    assert_eq!(gateway.active_visits(), 0);
    assert_eq!(gateway.outstanding_operations(), 0);
    assert_eq!(gateway.queued_visit_operations(), 0);
    assert_eq!(removal.status(), Some(ResponseStatus::Ok));
    assert!(store.is_empty());

    for channel in channels {
        common::response_of(&channel).await;
        assert!(channel.status().is_some());
    }
    common::response_of(&visit).await;
    assert_eq!(visit.close_count(), 1);
}

#[tokio::test]
async fn work_after_shutdown_is_rejected() {
    let gateway = common::start_gateway(common::seeded_store(1));
    gateway.shutdown().await;

    let channel = Arc::new(MemoryChannel::new());
    let result = gateway
        .submit(DocumentRequest::get(common::doc_id(1).as_str()), channel.clone())
        .await;

    assert!(matches!(result, Err(Error::Admission(AdmissionError::ShuttingDown))));
    assert_eq!(channel.status(), Some(ResponseStatus::TooManyRequests));
    assert!(channel.is_closed());
}

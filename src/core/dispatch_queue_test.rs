use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use super::*;
use crate::test_utils;
use crate::test_utils::ScriptedSession;
use crate::AdmissionError;
use crate::DispatchResult;
use crate::DocumentRequest;
use crate::JsonResponse;
use crate::MemoryChannel;
use crate::ResponseStatus;

fn queue(
    session: Arc<ScriptedSession>,
    max_depth: usize,
    max_age: Duration,
) -> (DispatchQueue, Arc<OperationDispatcher>) {
    let dispatcher = Arc::new(OperationDispatcher::new(session));
    let queue = DispatchQueue::new(
        "operations",
        Some(AdmissionPolicy { max_depth, max_age }),
        dispatcher.clone(),
    );
    (queue, dispatcher)
}

fn put(n: usize) -> (WorkItem, Arc<MemoryChannel>) {
    let channel = Arc::new(MemoryChannel::new());
    let request = DocumentRequest::put(format!("id:ns:music::{n}"), r#"{"fields":{"title":"t"}}"#);
    let response = JsonResponse::buffered(channel.clone(), &request.path_id);
    (WorkItem::Single(Operation::new(request, response)), channel)
}

fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|n| format!("id:ns:music::{n}")).collect()
}

#[tokio::test]
#[traced_test]
async fn third_operation_is_rejected_while_two_are_queued() {
    let session = Arc::new(ScriptedSession::new());
    session.stall();
    let (queue, _) = queue(session.clone(), 2, Duration::from_secs(3));

    let (first, _) = put(1);
    let (second, _) = put(2);
    queue.enqueue(first).unwrap();
    queue.enqueue(second).unwrap();

    let (third, third_channel) = put(3);
    let rejected = queue.enqueue(third).unwrap_err();
    assert_eq!(
        rejected.reason,
        AdmissionError::QueueFull {
            queue: "operations",
            depth: 2,
            max: 2
        }
    );
    assert!(logs_contain("2 operations already enqueued in operations, max is 2"));
    rejected.complete().await;
    assert_eq!(third_channel.status(), Some(ResponseStatus::TooManyRequests));
    assert!(third_channel.is_closed());

    session.unstall();
    assert_eq!(queue.drain(), 2);
    assert_eq!(queue.enqueued(), 0);

    let (resubmitted, _) = put(3);
    queue.enqueue(resubmitted).unwrap();
    assert_eq!(session.accepted_ids(), ids(1..=3));
}

#[tokio::test]
async fn transient_head_is_retried_in_place_until_accepted() {
    let session = Arc::new(ScriptedSession::new());
    session.script([
        DispatchResult::TransientError("busy".into()),
        DispatchResult::TransientError("busy".into()),
    ]);
    let (queue, dispatcher) = queue(session.clone(), 8, Duration::from_secs(3));
    let (item, channel) = put(1);

    // first attempt happens on enqueue
    queue.enqueue(item).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(dispatcher.outstanding(), 0);

    assert_eq!(queue.drain(), 0);
    assert_eq!(queue.len(), 1);
    assert_eq!(dispatcher.outstanding(), 0);

    assert_eq!(queue.drain(), 1);
    assert!(queue.is_empty());
    assert_eq!(dispatcher.outstanding(), 1);
    assert_eq!(session.call_count(), 3);

    test_utils::wait_until(Duration::from_secs(1), || dispatcher.outstanding() == 0).await;
    assert_eq!(channel.status(), Some(ResponseStatus::Ok));
    assert_eq!(session.accepted_ids(), ids(1..=1));
}

#[tokio::test]
async fn operations_are_issued_in_arrival_order() {
    let session = Arc::new(ScriptedSession::new());
    session.stall();
    let (queue, _) = queue(session.clone(), 64, Duration::from_secs(3));
    for n in 1..=20 {
        queue.enqueue(put(n).0).unwrap();
    }
    assert_eq!(queue.len(), 20);

    session.unstall();
    assert_eq!(queue.drain(), 20);
    assert_eq!(session.accepted_ids(), ids(1..=20));
}

#[tokio::test]
async fn admission_never_exceeds_max_depth() {
    let session = Arc::new(ScriptedSession::new());
    session.stall();
    let (queue, _) = queue(session, 5, Duration::from_secs(3));

    let mut admitted = 0;
    let mut rejected = 0;
    for n in 0..50 {
        match queue.enqueue(put(n).0) {
            Ok(()) => admitted += 1,
            Err(_) => rejected += 1,
        }
        assert!(queue.enqueued() <= 5);
    }
    assert_eq!((admitted, rejected), (5, 45));
}

#[tokio::test(start_paused = true)]
async fn stale_queue_rejects_new_work() {
    let session = Arc::new(ScriptedSession::new());
    session.stall();
    let (queue, _) = queue(session, 10, Duration::from_millis(100));

    queue.enqueue(put(1).0).unwrap();
    tokio::time::advance(Duration::from_millis(200)).await;
    // a single queued item is never too old
    queue.enqueue(put(2).0).unwrap();

    let rejected = queue.enqueue(put(3).0).unwrap_err();
    assert!(matches!(rejected.reason, AdmissionError::QueueTooOld { .. }), "{rejected:?}");
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn zero_depth_dispatches_once_without_queuing() {
    let session = Arc::new(ScriptedSession::new());
    let (queue, _) = queue(session.clone(), 0, Duration::from_secs(3));

    let (accepted, _) = put(1);
    queue.enqueue(accepted).unwrap();
    assert!(queue.is_empty());

    session.stall();
    let (refused, _) = put(2);
    let rejected = queue.enqueue(refused).unwrap_err();
    assert_eq!(rejected.reason, AdmissionError::Overloaded);
    assert!(queue.is_empty());
    assert_eq!(session.call_count(), 2);
}

#[tokio::test]
async fn malformed_request_fails_without_blocking_the_queue() {
    let session = Arc::new(ScriptedSession::new());
    let (queue, _) = queue(session.clone(), 8, Duration::from_secs(3));

    let channel = Arc::new(MemoryChannel::new());
    let request = DocumentRequest::put("id:ns:music::1", "{not json");
    let response = JsonResponse::buffered(channel.clone(), &request.path_id);
    queue.enqueue(WorkItem::Single(Operation::new(request, response))).unwrap();
    queue.enqueue(put(2).0).unwrap();

    test_utils::wait_until(Duration::from_secs(1), || channel.is_closed()).await;
    assert_eq!(channel.status(), Some(ResponseStatus::BadRequest));
    assert!(queue.is_empty());
    assert_eq!(session.accepted_ids(), ids(2..=2));
}

#[tokio::test]
async fn fatal_refusal_renders_server_error() {
    let session = Arc::new(ScriptedSession::new());
    session.script([DispatchResult::FatalError("no route to content cluster".into())]);
    let (queue, _) = queue(session, 8, Duration::from_secs(3));
    let (item, channel) = put(1);

    queue.enqueue(item).unwrap();

    test_utils::wait_until(Duration::from_secs(1), || channel.is_closed()).await;
    assert_eq!(channel.status(), Some(ResponseStatus::InternalServerError));
    assert_eq!(channel.json().unwrap()["message"], "no route to content cluster");
}

#[tokio::test]
async fn closed_queue_rejects_but_still_drains() {
    let session = Arc::new(ScriptedSession::new());
    session.stall();
    let (queue, _) = queue(session.clone(), 8, Duration::from_secs(3));
    queue.enqueue(put(1).0).unwrap();

    queue.close_admission();
    let rejected = queue.enqueue(put(2).0).unwrap_err();
    assert_eq!(rejected.reason, AdmissionError::ShuttingDown);

    session.unstall();
    assert_eq!(queue.drain(), 1);
    assert_eq!(session.accepted_ids(), ids(1..=1));
}

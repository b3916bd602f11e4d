use std::future::Future;
use std::time::Duration;

use serde_json::json;

use crate::Document;
use crate::DocumentId;

pub fn doc_id(n: usize) -> DocumentId {
    DocumentId::parse(&format!("id:ns:music::{n}")).unwrap()
}

pub fn music(n: usize) -> Document {
    Document::new(doc_id(n), json!({"title": format!("t{n}"), "year": 2000 + n}).as_object().cloned().unwrap())
}

/// Polls `condition` until it holds, yielding to other tasks in between.
/// Panics after `timeout` of (possibly paused) tokio time.
pub async fn wait_until<F>(
    timeout: Duration,
    mut condition: F,
) where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Awaits `future`, panicking if it does not finish within `timeout`.
pub async fn within<F: Future>(
    timeout: Duration,
    future: F,
) -> F::Output {
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| panic!("not finished within {timeout:?}"))
}

use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::VisitorSession;

/// Shared progress of one bulk request: documents seen, derived mutations in
/// flight, and the first error, which aborts the session.
#[derive(Default)]
pub struct VisitState {
    documents_visited: AtomicU64,
    error: Mutex<Option<String>>,
    session: OnceLock<Arc<dyn VisitorSession>>,
    derived_in_flight: AtomicUsize,
    derived_settled: Notify,
}

impl VisitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(
        &self,
        session: Arc<dyn VisitorSession>,
    ) {
        let _ = self.session.set(session);
        if self.has_failed() {
            self.abort_session();
        }
    }

    pub(crate) fn document_visited(&self) {
        self.documents_visited.fetch_add(1, Ordering::SeqCst);
    }

    pub fn documents_visited(&self) -> u64 {
        self.documents_visited.load(Ordering::SeqCst)
    }

    /// Records `message` unless an error was already recorded, and aborts
    /// the session.
    pub fn fail(
        &self,
        message: impl Into<String>,
    ) {
        {
            let mut error = self.error.lock();
            if error.is_none() {
                let message = message.into();
                warn!("visit failed: {}", message);
                *error = Some(message);
            }
        }
        self.abort_session();
    }

    fn abort_session(&self) {
        if let Some(session) = self.session.get() {
            session.abort();
        }
    }

    pub fn has_failed(&self) -> bool {
        self.error.lock().is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub(crate) fn derived_started(&self) {
        self.derived_in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn derived_finished(&self) {
        if self.derived_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.derived_settled.notify_waiters();
        }
    }

    /// Waits until every issued derived mutation has been answered.
    pub(crate) async fn settled(&self) {
        loop {
            let notified = self.derived_settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.derived_in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

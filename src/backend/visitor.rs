use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::Document;
use crate::DocumentId;
use crate::VisitError;
use crate::VisitorParameters;

/// Completion codes a visitor session finishes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Success,
    Timeout,
    Aborted,
    Failure,
}

impl fmt::Display for CompletionCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            CompletionCode::Success => "SUCCESS",
            CompletionCode::Timeout => "TIMEOUT",
            CompletionCode::Aborted => "ABORTED",
            CompletionCode::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Acknowledgement for one visited document or removal. The backend keeps the
/// matching [`AckWaiter`] and counts the entry as pending until it resolves.
#[derive(Debug)]
pub struct AckToken(oneshot::Sender<()>);

pub type AckWaiter = oneshot::Receiver<()>;

impl AckToken {
    pub fn pair() -> (Self, AckWaiter) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn ack(self) {
        let _ = self.0.send(());
    }
}

/// Events pushed by a visitor session.
#[derive(Debug)]
pub enum VisitorEvent {
    Document {
        document: Document,
        timestamp: u64,
        ack: AckToken,
    },
    Removal {
        id: DocumentId,
        timestamp: u64,
        ack: AckToken,
    },
    /// Sent exactly once, after every data event has been acknowledged
    Done {
        code: CompletionCode,
        message: Option<String>,
    },
}

/// Resumable visiting progress reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressToken {
    /// Serialized cursor; `None` once everything is visited
    pub cursor: Option<String>,
    pub percent_finished: f64,
}

impl ProgressToken {
    pub fn is_finished(&self) -> bool {
        self.cursor.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitorStatistics {
    pub buckets_visited: u64,
    pub documents_visited: u64,
    pub documents_returned: u64,
}

/// Handle to one running visitor session.
pub trait VisitorSession: Send + Sync {
    /// Ask the session to stop; it still finishes with [`VisitorEvent::Done`]
    fn abort(&self);

    /// Release backend resources. Called exactly once, after `Done`.
    fn destroy(&self);

    fn progress(&self) -> ProgressToken;

    fn statistics(&self) -> VisitorStatistics;

    fn trace(&self) -> Option<Value>;
}

/// Factory for visitor sessions.
pub trait VisitorBackend: Send + Sync + 'static {
    /// Whether mutations accept [`crate::TestAndSetCondition::Timestamp`]
    fn supports_timestamp_conditions(&self) -> bool;

    fn create_visitor_session(
        &self,
        params: VisitorParameters,
        events: mpsc::UnboundedSender<VisitorEvent>,
    ) -> std::result::Result<Arc<dyn VisitorSession>, VisitError>;
}

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::AckToken;
use crate::CompletionCode;
use crate::Document;
use crate::ProgressToken;
use crate::VisitError;
use crate::VisitorBackend;
use crate::VisitorEvent;
use crate::VisitorParameters;
use crate::VisitorSession;
use crate::VisitorStatistics;

/// Visitor backend whose sessions deliver a fixed list of documents, wait
/// for all of them to be acknowledged, and finish with a fixed code.
pub struct ScriptedVisitorBackend {
    documents: Vec<Document>,
    code: CompletionCode,
    message: Option<String>,
    buckets_visited: u64,
    progress: ProgressToken,
    until_aborted: bool,
    never_finish: bool,
    timestamp_conditions: bool,
    creation_error: Option<String>,
    trace: Option<Value>,
    sessions: Mutex<Vec<Arc<ScriptedVisitorSession>>>,
}

impl ScriptedVisitorBackend {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            code: CompletionCode::Success,
            message: None,
            buckets_visited: 1,
            progress: ProgressToken {
                cursor: None,
                percent_finished: 100.0,
            },
            until_aborted: false,
            never_finish: false,
            timestamp_conditions: true,
            creation_error: None,
            trace: None,
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn finish_with(
        mut self,
        code: CompletionCode,
        message: Option<&str>,
    ) -> Self {
        self.code = code;
        self.message = message.map(str::to_string);
        self
    }

    pub fn buckets_visited(
        mut self,
        buckets: u64,
    ) -> Self {
        self.buckets_visited = buckets;
        self
    }

    pub fn progress(
        mut self,
        cursor: Option<&str>,
        percent_finished: f64,
    ) -> Self {
        self.progress = ProgressToken {
            cursor: cursor.map(str::to_string),
            percent_finished,
        };
        self
    }

    /// Sessions only finish, with [`CompletionCode::Aborted`], once aborted.
    pub fn until_aborted(mut self) -> Self {
        self.until_aborted = true;
        self.code = CompletionCode::Aborted;
        self
    }

    /// Sessions never report done, not even when aborted.
    pub fn never_finishing(mut self) -> Self {
        self.never_finish = true;
        self
    }

    pub fn without_timestamp_conditions(mut self) -> Self {
        self.timestamp_conditions = false;
        self
    }

    pub fn failing_creation(
        mut self,
        message: &str,
    ) -> Self {
        self.creation_error = Some(message.to_string());
        self
    }

    pub fn with_trace(
        mut self,
        trace: Value,
    ) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn sessions(&self) -> Vec<Arc<ScriptedVisitorSession>> {
        self.sessions.lock().clone()
    }

    pub fn session(&self) -> Arc<ScriptedVisitorSession> {
        self.sessions.lock().last().cloned().expect("no session created")
    }
}

impl VisitorBackend for ScriptedVisitorBackend {
    fn supports_timestamp_conditions(&self) -> bool {
        self.timestamp_conditions
    }

    fn create_visitor_session(
        &self,
        params: VisitorParameters,
        events: mpsc::UnboundedSender<VisitorEvent>,
    ) -> std::result::Result<Arc<dyn VisitorSession>, VisitError> {
        if let Some(message) = &self.creation_error {
            return Err(VisitError::SessionCreation(message.clone()));
        }
        let session = Arc::new(ScriptedVisitorSession {
            params,
            aborted: CancellationToken::new(),
            abort_count: AtomicUsize::new(0),
            destroy_count: AtomicUsize::new(0),
            acked: Mutex::new(Vec::new()),
            progress: self.progress.clone(),
            statistics: VisitorStatistics {
                buckets_visited: self.buckets_visited,
                documents_visited: self.documents.len() as u64,
                documents_returned: self.documents.len() as u64,
            },
            trace: self.trace.clone(),
        });
        self.sessions.lock().push(session.clone());

        let documents = self.documents.clone();
        let code = self.code;
        let message = self.message.clone();
        let until_aborted = self.until_aborted;
        let never_finish = self.never_finish;
        let running = session.clone();
        tokio::spawn(async move {
            let mut waiters = Vec::new();
            for (n, document) in documents.into_iter().enumerate() {
                let (ack, waiter) = AckToken::pair();
                let id = document.id.to_string();
                let _ = events.send(VisitorEvent::Document {
                    document,
                    timestamp: n as u64 + 1,
                    ack,
                });
                let session = running.clone();
                waiters.push(tokio::spawn(async move {
                    let _ = waiter.await;
                    session.acked.lock().push(id);
                }));
            }
            for waiter in waiters {
                let _ = waiter.await;
            }
            if never_finish {
                std::future::pending::<()>().await;
            }
            if until_aborted {
                running.aborted.cancelled().await;
            }
            let _ = events.send(VisitorEvent::Done { code, message });
        });
        Ok(session)
    }
}

pub struct ScriptedVisitorSession {
    pub params: VisitorParameters,
    aborted: CancellationToken,
    abort_count: AtomicUsize,
    destroy_count: AtomicUsize,
    acked: Mutex<Vec<String>>,
    progress: ProgressToken,
    statistics: VisitorStatistics,
    trace: Option<Value>,
}

impl ScriptedVisitorSession {
    /// Ids of acknowledged documents, in acknowledgement order.
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    pub fn abort_count(&self) -> usize {
        self.abort_count.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_count.load(Ordering::SeqCst)
    }
}

impl VisitorSession for ScriptedVisitorSession {
    fn abort(&self) {
        self.abort_count.fetch_add(1, Ordering::SeqCst);
        self.aborted.cancel();
    }

    fn destroy(&self) {
        self.destroy_count.fetch_add(1, Ordering::SeqCst);
    }

    fn progress(&self) -> ProgressToken {
        self.progress.clone()
    }

    fn statistics(&self) -> VisitorStatistics {
        self.statistics
    }

    fn trace(&self) -> Option<Value> {
        self.trace.clone()
    }
}

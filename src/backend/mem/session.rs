use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::MemDocumentStore;
use super::Selection;
use super::StoredEntry;
use crate::AckToken;
use crate::AckWaiter;
use crate::CompletionCode;
use crate::Document;
use crate::DocumentId;
use crate::ProgressToken;
use crate::VisitError;
use crate::VisitorEvent;
use crate::VisitorParameters;
use crate::VisitorSession;
use crate::VisitorStatistics;

struct VisitPlan {
    /// Buckets still to visit, ascending
    buckets: Vec<u32>,
    /// Buckets of this slice in total
    slice_buckets: usize,
    entries: Vec<(u32, DocumentId, StoredEntry)>,
    selection: Selection,
    params: VisitorParameters,
    /// Where documents go instead of the event channel
    destination: Option<Arc<MemDocumentStore>>,
}

/// Visitor session over a snapshot of a [`super::MemDocumentStore`].
///
/// Delivers one bucket at a time and keeps at most `max_pending` entries
/// unacknowledged. With a remote destination the entries are written to that
/// store and no document events are sent. A bucket only counts as visited once all of its entries
/// are acknowledged.
pub struct MemVisitorSession {
    abort: CancellationToken,
    progress: Mutex<ProgressToken>,
    statistics: Mutex<VisitorStatistics>,
    trace_level: u8,
    destroyed: AtomicBool,
}

impl MemVisitorSession {
    pub(crate) fn start(
        entries: Vec<(u32, DocumentId, StoredEntry)>,
        bucket_count: u32,
        params: VisitorParameters,
        destination: Option<Arc<MemDocumentStore>>,
        events: mpsc::UnboundedSender<VisitorEvent>,
    ) -> std::result::Result<Arc<Self>, VisitError> {
        let selection = Selection::parse(params.selection()).map_err(VisitError::InvalidParameters)?;
        let first_bucket = match params.resume_token() {
            None => 0,
            Some(token) => token
                .parse::<u32>()
                .ok()
                .filter(|b| *b <= bucket_count)
                .ok_or_else(|| VisitError::InvalidContinuation(format!("unknown progress token '{token}'")))?,
        };

        let in_slice = |bucket: &u32| params.slice().map_or(true, |s| bucket % s.count == s.id);
        let slice_buckets = (0..bucket_count).filter(in_slice).count();
        let buckets: Vec<u32> = (first_bucket..bucket_count).filter(in_slice).collect();

        let session = Arc::new(Self {
            abort: CancellationToken::new(),
            progress: Mutex::new(progress_token(buckets.first().copied(), buckets.len(), slice_buckets)),
            statistics: Mutex::new(VisitorStatistics::default()),
            trace_level: params.trace_level(),
            destroyed: AtomicBool::new(false),
        });

        let plan = VisitPlan {
            buckets,
            slice_buckets,
            entries,
            selection,
            params,
            destination,
        };
        tokio::spawn(session.clone().run(plan, events));
        Ok(session)
    }

    async fn run(
        self: Arc<Self>,
        plan: VisitPlan,
        events: mpsc::UnboundedSender<VisitorEvent>,
    ) {
        let deadline = Instant::now() + plan.params.session_timeout();
        let max_pending = plan.params.max_pending();
        let mut pending: VecDeque<AckWaiter> = VecDeque::new();

        let mut code = CompletionCode::Success;
        'buckets: for (n, bucket) in plan.buckets.iter().copied().enumerate() {
            if self.abort.is_cancelled() {
                code = CompletionCode::Aborted;
                break;
            }
            if Instant::now() >= deadline {
                code = CompletionCode::Timeout;
                break;
            }

            for (_, id, entry) in plan.entries.iter().filter(|(b, _, _)| *b == bucket) {
                let Some(visited) = plan.visit(id, entry) else {
                    continue;
                };
                match &plan.destination {
                    Some(destination) => visited.store_into(destination),
                    None => {
                        let (ack, waiter) = AckToken::pair();
                        if events.send(visited.into_event(ack)).is_err() {
                            warn!("visitor event receiver went away");
                            code = CompletionCode::Failure;
                            break 'buckets;
                        }
                        pending.push_back(waiter);
                    }
                }
                {
                    let mut stats = self.statistics.lock();
                    stats.documents_visited += 1;
                    stats.documents_returned += 1;
                }
                if !self.wait_acks(&mut pending, max_pending - 1).await {
                    code = CompletionCode::Aborted;
                    break 'buckets;
                }
            }

            if !self.wait_acks(&mut pending, 0).await {
                code = CompletionCode::Aborted;
                break;
            }
            self.statistics.lock().buckets_visited += 1;
            let remaining = plan.buckets.len() - n - 1;
            *self.progress.lock() = progress_token(plan.buckets.get(n + 1).copied(), remaining, plan.slice_buckets);

            let visited = self.statistics.lock().documents_visited;
            if plan.params.wanted_document_count().is_some_and(|wanted| visited >= wanted) {
                break;
            }
        }

        if code != CompletionCode::Aborted {
            self.wait_acks(&mut pending, 0).await;
        }
        debug!(%code, "in-memory visit finished");
        let message = match code {
            CompletionCode::Timeout => Some("Visitor session timed out".to_string()),
            CompletionCode::Aborted => Some("Visitor session aborted".to_string()),
            _ => None,
        };
        let _ = events.send(VisitorEvent::Done { code, message });
    }

    /// Waits for the oldest acknowledgements until at most `limit` are
    /// pending. A dropped acknowledgement counts as received. Returns false
    /// when the session is aborted first.
    async fn wait_acks(
        &self,
        pending: &mut VecDeque<AckWaiter>,
        limit: usize,
    ) -> bool {
        while pending.len() > limit {
            let Some(waiter) = pending.pop_front() else {
                break;
            };
            tokio::select! {
                _ = waiter => {}
                _ = self.abort.cancelled() => return false,
            }
        }
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// One entry selected by a visit.
enum Visited {
    Document { document: Document, timestamp: u64 },
    Removal { id: DocumentId, timestamp: u64 },
}

impl Visited {
    fn into_event(
        self,
        ack: AckToken,
    ) -> VisitorEvent {
        match self {
            Visited::Document { document, timestamp } => VisitorEvent::Document {
                document,
                timestamp,
                ack,
            },
            Visited::Removal { id, timestamp } => VisitorEvent::Removal { id, timestamp, ack },
        }
    }

    /// Applies the entry to a forwarding destination.
    fn store_into(
        self,
        destination: &MemDocumentStore,
    ) {
        match self {
            Visited::Document { document, .. } => {
                destination.insert(document);
            }
            Visited::Removal { id, .. } => {
                destination.apply_remove(id, None);
            }
        }
    }
}

impl VisitPlan {
    fn visit(
        &self,
        id: &DocumentId,
        entry: &StoredEntry,
    ) -> Option<Visited> {
        let from = self.params.from_timestamp().unwrap_or(0);
        let to = self.params.to_timestamp().unwrap_or(u64::MAX);
        if entry.timestamp < from || entry.timestamp > to {
            return None;
        }
        let timestamp = entry.timestamp;
        match &entry.document {
            Some(document) if self.selection.matches(document) => Some(Visited::Document {
                document: document.clone().project(self.params.field_set()),
                timestamp,
            }),
            None if self.params.include_removes() && self.selection.matches_type(id.doc_type()) => {
                Some(Visited::Removal { id: id.clone(), timestamp })
            }
            _ => None,
        }
    }
}

fn progress_token(
    next_bucket: Option<u32>,
    remaining: usize,
    slice_buckets: usize,
) -> ProgressToken {
    match next_bucket {
        None => ProgressToken {
            cursor: None,
            percent_finished: 100.0,
        },
        Some(bucket) => ProgressToken {
            cursor: Some(bucket.to_string()),
            percent_finished: (slice_buckets - remaining) as f64 * 100.0 / slice_buckets.max(1) as f64,
        },
    }
}

impl VisitorSession for MemVisitorSession {
    fn abort(&self) {
        self.abort.cancel();
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            warn!("visitor session destroyed twice");
        }
        self.abort.cancel();
    }

    fn progress(&self) -> ProgressToken {
        self.progress.lock().clone()
    }

    fn statistics(&self) -> VisitorStatistics {
        *self.statistics.lock()
    }

    fn trace(&self) -> Option<Value> {
        if self.trace_level == 0 {
            return None;
        }
        let stats = self.statistics();
        Some(json!([{
            "message": format!(
                "visited {} buckets, {} documents",
                stats.buckets_visited, stats.documents_visited
            )
        }]))
    }
}

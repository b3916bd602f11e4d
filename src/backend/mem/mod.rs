//! In-memory document store implementing both backend interfaces.
//!
//! Documents are spread over a fixed number of buckets by a hash of their id.
//! Every mutation takes a fresh timestamp from a logical clock; removals
//! leave a timestamped tombstone so they can be visited. Visitor progress is
//! the index of the next bucket to visit.

mod selection;
mod session;

use selection::Selection;
pub use session::*;


use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::BackendResponse;
use crate::DispatchResult;
use crate::Document;
use crate::DocumentId;
use crate::DocumentSession;
use crate::DocumentUpdate;
use crate::OperationParameters;
use crate::Outcome;
use crate::TestAndSetCondition;
use crate::VisitError;
use crate::VisitorBackend;
use crate::VisitorEvent;
use crate::VisitorParameters;
use crate::VisitorSession;

pub const DEFAULT_BUCKET_COUNT: u32 = 16;

#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    /// `None` for a tombstone
    pub(crate) document: Option<Document>,
    pub(crate) timestamp: u64,
}

pub struct MemDocumentStore {
    entries: RwLock<BTreeMap<DocumentId, StoredEntry>>,
    clock: AtomicU64,
    bucket_count: u32,
    timestamp_conditions: bool,
    /// Named stores that forwarding visits write into
    destinations: RwLock<HashMap<String, Arc<MemDocumentStore>>>,
}

impl Default for MemDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDocumentStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock: AtomicU64::new(0),
            bucket_count: DEFAULT_BUCKET_COUNT,
            timestamp_conditions: true,
            destinations: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_bucket_count(
        mut self,
        bucket_count: u32,
    ) -> Self {
        self.bucket_count = bucket_count.max(1);
        self
    }

    /// Whether test-and-set conditions on persisted timestamps are advertised.
    pub fn with_timestamp_conditions(
        mut self,
        enabled: bool,
    ) -> Self {
        self.timestamp_conditions = enabled;
        self
    }

    /// Registers `store` as the remote destination called `name`.
    pub fn add_destination(
        &self,
        name: impl Into<String>,
        store: Arc<MemDocumentStore>,
    ) {
        self.destinations.write().insert(name.into(), store);
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn bucket_of(
        &self,
        id: &DocumentId,
    ) -> u32 {
        bucket_of(id, self.bucket_count)
    }

    /// Stores `document` unconditionally and returns its timestamp.
    pub fn insert(
        &self,
        document: Document,
    ) -> u64 {
        let timestamp = self.tick();
        self.entries.write().insert(
            document.id.clone(),
            StoredEntry {
                document: Some(document),
                timestamp,
            },
        );
        timestamp
    }

    pub fn document(
        &self,
        id: &DocumentId,
    ) -> Option<Document> {
        self.entries.read().get(id).and_then(|e| e.document.clone())
    }

    /// Timestamp of the live document, if any.
    pub fn timestamp(
        &self,
        id: &DocumentId,
    ) -> Option<u64> {
        self.entries
            .read()
            .get(id)
            .filter(|e| e.document.is_some())
            .map(|e| e.timestamp)
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.entries.read().values().filter(|e| e.document.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Entries in bucket order, then id order.
    pub(crate) fn snapshot(&self) -> Vec<(u32, DocumentId, StoredEntry)> {
        let mut entries: Vec<(u32, DocumentId, StoredEntry)> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (bucket_of(id, self.bucket_count), id.clone(), entry.clone()))
            .collect();
        // BTreeMap iteration already orders by id within a bucket
        entries.sort_by_key(|(bucket, _, _)| *bucket);
        entries
    }

    fn check_condition(
        entry: Option<&StoredEntry>,
        condition: Option<&TestAndSetCondition>,
    ) -> std::result::Result<bool, String> {
        let Some(condition) = condition else {
            return Ok(true);
        };
        let live = entry.and_then(|e| e.document.as_ref().map(|d| (d, e.timestamp)));
        match (condition, live) {
            (_, None) => Ok(false),
            (TestAndSetCondition::Timestamp(expected), Some((_, timestamp))) => Ok(*expected == timestamp),
            (TestAndSetCondition::Selection(selection), Some((document, _))) => {
                Ok(Selection::parse(Some(selection))?.matches(document))
            }
        }
    }

    fn apply_put(
        &self,
        document: Document,
        condition: Option<&TestAndSetCondition>,
    ) -> BackendResponse {
        let mut entries = self.entries.write();
        let existing = entries.get(&document.id);
        if condition.is_some() {
            match Self::check_condition(existing, condition) {
                Ok(true) => {}
                Ok(false) => return BackendResponse::new(Outcome::ConditionFailed),
                Err(e) => return BackendResponse::new(Outcome::Error).with_message(e),
            }
        }
        let timestamp = self.tick();
        entries.insert(
            document.id.clone(),
            StoredEntry {
                document: Some(document),
                timestamp,
            },
        );
        BackendResponse::success()
    }

    fn apply_update(
        &self,
        update: DocumentUpdate,
        condition: Option<&TestAndSetCondition>,
    ) -> BackendResponse {
        let mut entries = self.entries.write();
        let existing = entries.get(&update.id);
        let live = existing.and_then(|e| e.document.clone());
        if live.is_some() || !update.create_if_missing {
            match Self::check_condition(existing, condition) {
                Ok(true) => {}
                Ok(false) if live.is_none() => return BackendResponse::new(Outcome::NotFound),
                Ok(false) => return BackendResponse::new(Outcome::ConditionFailed),
                Err(e) => return BackendResponse::new(Outcome::Error).with_message(e),
            }
        }

        let Some(mut document) = live.or_else(|| {
            update
                .create_if_missing
                .then(|| Document::new(update.id.clone(), Default::default()))
        }) else {
            return BackendResponse::new(Outcome::NotFound);
        };
        if let Err(e) = update.apply_to(&mut document) {
            return BackendResponse::new(Outcome::Error).with_message(e);
        }
        let timestamp = self.tick();
        entries.insert(
            update.id,
            StoredEntry {
                document: Some(document),
                timestamp,
            },
        );
        BackendResponse::success()
    }

    fn apply_remove(
        &self,
        id: DocumentId,
        condition: Option<&TestAndSetCondition>,
    ) -> BackendResponse {
        let mut entries = self.entries.write();
        let existing = entries.get(&id);
        let live = existing.is_some_and(|e| e.document.is_some());
        if condition.is_some() {
            match Self::check_condition(existing, condition) {
                Ok(true) => {}
                Ok(false) if !live => return BackendResponse::new(Outcome::NotFound),
                Ok(false) => return BackendResponse::new(Outcome::ConditionFailed),
                Err(e) => return BackendResponse::new(Outcome::Error).with_message(e),
            }
        }
        if !live {
            return BackendResponse::new(Outcome::NotFound);
        }
        let timestamp = self.tick();
        entries.insert(
            id,
            StoredEntry {
                document: None,
                timestamp,
            },
        );
        BackendResponse::success()
    }
}

impl DocumentSession for MemDocumentStore {
    fn put(
        &self,
        document: Document,
        params: OperationParameters,
    ) -> DispatchResult {
        trace!(id = %document.id, "put");
        let response = self.apply_put(document, params.condition.as_ref());
        params.responder.respond(response);
        DispatchResult::Accepted
    }

    fn update(
        &self,
        update: DocumentUpdate,
        params: OperationParameters,
    ) -> DispatchResult {
        trace!(id = %update.id, "update");
        let response = self.apply_update(update, params.condition.as_ref());
        params.responder.respond(response);
        DispatchResult::Accepted
    }

    fn remove(
        &self,
        id: DocumentId,
        params: OperationParameters,
    ) -> DispatchResult {
        trace!(%id, "remove");
        let response = self.apply_remove(id, params.condition.as_ref());
        params.responder.respond(response);
        DispatchResult::Accepted
    }

    fn get(
        &self,
        id: DocumentId,
        field_set: Option<String>,
        params: OperationParameters,
    ) -> DispatchResult {
        trace!(%id, "get");
        let response = match self.document(&id) {
            Some(document) => BackendResponse::success().with_document(document.project(field_set.as_deref())),
            None => BackendResponse::new(Outcome::NotFound),
        };
        params.responder.respond(response);
        DispatchResult::Accepted
    }
}

impl VisitorBackend for MemDocumentStore {
    fn supports_timestamp_conditions(&self) -> bool {
        self.timestamp_conditions
    }

    fn create_visitor_session(
        &self,
        params: VisitorParameters,
        events: mpsc::UnboundedSender<VisitorEvent>,
    ) -> std::result::Result<Arc<dyn VisitorSession>, VisitError> {
        let destination = match params.remote_destination() {
            None => None,
            Some(name) => Some(
                self.destinations
                    .read()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| VisitError::InvalidParameters(format!("unknown remote destination '{name}'")))?,
            ),
        };
        let session = MemVisitorSession::start(self.snapshot(), self.bucket_count, params, destination, events)?;
        Ok(session)
    }
}

/// FNV-1a over the id, so bucket placement is stable across runs.
fn bucket_of(
    id: &DocumentId,
    bucket_count: u32,
) -> u32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in id.as_str().bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % bucket_count as u64) as u32
}

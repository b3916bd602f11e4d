use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::metrics::VISITED_DOCUMENTS_TOTAL;
use crate::AckToken;
use crate::DerivedOperation;
use crate::DispatchOptions;
use crate::DispatchQueue;
use crate::Document;
use crate::DocumentId;
use crate::DocumentOperation;
use crate::DocumentUpdate;
use crate::FieldUpdate;
use crate::JsonResponse;
use crate::Result;
use crate::TestAndSetCondition;
use crate::VisitState;
use crate::VisitorParameters;
use crate::WorkItem;

/// Everything a callback may touch while its visit runs.
pub struct VisitContext {
    pub response: Arc<JsonResponse>,
    pub state: Arc<VisitState>,
    pub params: VisitorParameters,
}

#[derive(Debug)]
pub enum VisitedItem {
    Document { document: Document, timestamp: u64 },
    Removal { id: DocumentId, timestamp: u64 },
}

/// What a bulk request does with the documents its session delivers.
pub trait VisitCallback: Send + Sync {
    /// Short name used for logging and metric labels
    fn variant(&self) -> &'static str;

    /// Whether visited documents are delivered to this gateway at all.
    fn has_local_data_handler(&self) -> bool {
        true
    }

    fn on_start(
        &self,
        _ctx: &VisitContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Handles one visited entry. `ack` must eventually be acknowledged or
    /// dropped; the backend keeps the entry pending until then.
    fn on_document(
        &self,
        ctx: &VisitContext,
        item: VisitedItem,
        ack: AckToken,
    );

    fn on_end(
        &self,
        _ctx: &VisitContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Streams every visited document into the response.
pub struct StreamDocuments;

impl VisitCallback for StreamDocuments {
    fn variant(&self) -> &'static str {
        "stream"
    }

    fn on_start(
        &self,
        ctx: &VisitContext,
    ) -> Result<()> {
        ctx.response.write_documents_array_start()
    }

    fn on_document(
        &self,
        ctx: &VisitContext,
        item: VisitedItem,
        ack: AckToken,
    ) {
        VISITED_DOCUMENTS_TOTAL.with_label_values(&[self.variant()]).inc();
        let written = match item {
            VisitedItem::Document { document, .. } => ctx.response.write_document_value(&document, Some(ack)),
            VisitedItem::Removal { id, .. } => ctx.response.write_document_removal(&id, Some(ack)),
        };
        if let Err(e) = written {
            ctx.state.fail(format!("failed to write visited document: {e}"));
        }
    }
}

/// Documents go straight from the backend to a remote destination; this
/// gateway only reports the outcome.
pub struct ForwardDocuments;

impl VisitCallback for ForwardDocuments {
    fn variant(&self) -> &'static str {
        "forward"
    }

    fn has_local_data_handler(&self) -> bool {
        false
    }

    fn on_document(
        &self,
        _ctx: &VisitContext,
        _item: VisitedItem,
        ack: AckToken,
    ) {
        debug!("forwarding visit received a local document");
        ack.ack();
    }
}

/// The mutation applied to every visited document.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitMutation {
    Update { fields: Vec<(String, FieldUpdate)> },
    Remove,
    /// Replaces the document, with these fields overlaid on the visited ones
    Put { fields: Map<String, Value> },
}

impl VisitMutation {
    fn name(&self) -> &'static str {
        match self {
            VisitMutation::Update { .. } => "update",
            VisitMutation::Remove => "remove",
            VisitMutation::Put { .. } => "put",
        }
    }
}

/// Issues a conditional mutation for every visited document through the
/// visit-operation queue.
///
/// A document is acknowledged once its mutation is accepted by the backend,
/// so the session's pending window also throttles the mutations.
pub struct MutateDocuments {
    mutation: VisitMutation,
    queue: Arc<DispatchQueue>,
    timestamp_conditions: bool,
    route: Option<String>,
}

impl MutateDocuments {
    pub fn new(
        mutation: VisitMutation,
        queue: Arc<DispatchQueue>,
        timestamp_conditions: bool,
        route: Option<String>,
    ) -> Self {
        Self {
            mutation,
            queue,
            timestamp_conditions,
            route,
        }
    }

    fn derive(
        &self,
        document: Document,
    ) -> DocumentOperation {
        match &self.mutation {
            VisitMutation::Update { fields } => DocumentOperation::Update {
                update: DocumentUpdate {
                    id: document.id,
                    fields: fields.clone(),
                    create_if_missing: false,
                },
            },
            VisitMutation::Remove => DocumentOperation::Remove { id: document.id },
            VisitMutation::Put { fields } => {
                let mut document = document;
                for (name, value) in fields {
                    document.fields.insert(name.clone(), value.clone());
                }
                DocumentOperation::Put { document }
            }
        }
    }

    /// The visited version must still be the stored one. Backends without
    /// timestamp conditions fall back to the visit's selection.
    fn condition(
        &self,
        params: &VisitorParameters,
        timestamp: u64,
    ) -> Option<TestAndSetCondition> {
        if self.timestamp_conditions {
            Some(TestAndSetCondition::Timestamp(timestamp))
        } else {
            params.selection().map(|s| TestAndSetCondition::Selection(s.to_string()))
        }
    }
}

impl VisitCallback for MutateDocuments {
    fn variant(&self) -> &'static str {
        self.mutation.name()
    }

    fn on_document(
        &self,
        ctx: &VisitContext,
        item: VisitedItem,
        ack: AckToken,
    ) {
        let (document, timestamp) = match item {
            VisitedItem::Document { document, timestamp } => (document, timestamp),
            VisitedItem::Removal { .. } => {
                ack.ack();
                return;
            }
        };
        VISITED_DOCUMENTS_TOTAL.with_label_values(&[self.variant()]).inc();

        let options = DispatchOptions {
            condition: self.condition(&ctx.params, timestamp),
            route: self.route.clone(),
            timeout: None,
            trace_level: ctx.params.trace_level(),
        };
        let operation = DerivedOperation::new(self.derive(document), options, ack, ctx.state.clone());
        if let Err(rejected) = self.queue.enqueue(WorkItem::Derived(operation)) {
            if let WorkItem::Derived(operation) = rejected.item {
                operation.reject(rejected.reason);
            }
        }
    }
}

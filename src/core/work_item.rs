use std::fmt;

use tokio::time::Instant;

use crate::AdmissionError;
use crate::DerivedOperation;
use crate::DispatchError;
use crate::Operation;
use crate::OperationDispatcher;

/// Result of one dispatch attempt of a [`WorkItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Issued, or nothing left to do
    Done,
    /// The backend asked to try again later; the item stays at the queue head
    Retry,
    /// Terminal failure; the item is completed with this error
    Failed(DispatchError),
}

/// Unit of work held by a dispatch queue.
pub enum WorkItem {
    Single(Operation),
    Derived(DerivedOperation),
}

impl WorkItem {
    pub fn created(&self) -> Instant {
        match self {
            WorkItem::Single(op) => op.created(),
            WorkItem::Derived(op) => op.created(),
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        dispatcher: &OperationDispatcher,
    ) -> DispatchOutcome {
        match self {
            WorkItem::Single(op) => op.dispatch(dispatcher),
            WorkItem::Derived(op) => op.dispatch(dispatcher),
        }
    }

    /// Completes the item with a terminal dispatch error.
    pub(crate) fn fail(
        self,
        error: DispatchError,
    ) {
        match self {
            WorkItem::Single(op) => {
                tokio::spawn(op.fail(error));
            }
            WorkItem::Derived(op) => op.fail(error),
        }
    }

    /// Completes the item with an admission rejection.
    pub async fn reject(
        self,
        reason: AdmissionError,
    ) {
        match self {
            WorkItem::Single(op) => op.reject(reason).await,
            WorkItem::Derived(op) => op.reject(reason),
        }
    }
}

/// Work refused at enqueue time, handed back to the caller.
pub struct Rejected {
    pub item: WorkItem,
    pub reason: AdmissionError,
}

impl fmt::Debug for Rejected {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Rejected").field("reason", &self.reason).finish_non_exhaustive()
    }
}

impl Rejected {
    pub async fn complete(self) -> AdmissionError {
        let reason = self.reason.clone();
        self.item.reject(self.reason).await;
        reason
    }
}

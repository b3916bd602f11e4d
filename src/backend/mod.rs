//! Interfaces of the two asynchronous collaborators the gateway drives: the
//! document-operation session and the bucket-visiting backend.
//!
//! Both report their real effects later. The document session resolves a
//! [`Responder`] exactly once per accepted call; the visitor backend pushes
//! [`VisitorEvent`]s over a channel owned by the session driver.

mod visitor;
pub use visitor::*;

pub mod mem;

use std::fmt;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::Document;
use crate::DocumentId;
use crate::DocumentUpdate;
use crate::TestAndSetCondition;

/// Immediate answer of the document session to an issued call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// The operation is in flight; its [`Responder`] will be resolved later
    Accepted,
    /// The backend cannot take the operation right now; retry later
    TransientError(String),
    /// The backend will never take the operation
    FatalError(String),
}

/// Final effect of an accepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    NotFound,
    ConditionFailed,
    Timeout,
    InsufficientStorage,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Outcome::Success => "SUCCESS",
            Outcome::NotFound => "NOT_FOUND",
            Outcome::ConditionFailed => "CONDITION_FAILED",
            Outcome::Timeout => "TIMEOUT",
            Outcome::InsufficientStorage => "INSUFFICIENT_STORAGE",
            Outcome::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub outcome: Outcome,
    /// Present for successful gets
    pub document: Option<Document>,
    pub message: Option<String>,
    pub trace: Option<Value>,
}

impl BackendResponse {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            document: None,
            message: None,
            trace: None,
        }
    }

    pub fn success() -> Self {
        Self::new(Outcome::Success)
    }

    pub fn with_document(
        mut self,
        document: Document,
    ) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_message(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One-shot completion slot for an accepted operation.
#[derive(Debug)]
pub struct Responder(oneshot::Sender<BackendResponse>);

impl Responder {
    pub fn channel() -> (Self, oneshot::Receiver<BackendResponse>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn respond(
        self,
        response: BackendResponse,
    ) {
        // The receiving side only goes away during forced teardown
        let _ = self.0.send(response);
    }
}

/// Per-call parameters handed to the document session.
#[derive(Debug)]
pub struct OperationParameters {
    pub condition: Option<TestAndSetCondition>,
    pub route: Option<String>,
    pub timeout: Option<Duration>,
    pub trace_level: u8,
    pub responder: Responder,
}

/// Asynchronous document-operation session.
///
/// Implementations must never block: each call either accepts the operation
/// (and later resolves `params.responder` exactly once), or refuses it with a
/// transient or fatal error, in which case the responder is dropped unused.
#[cfg_attr(test, automock)]
pub trait DocumentSession: Send + Sync + 'static {
    fn put(
        &self,
        document: Document,
        params: OperationParameters,
    ) -> DispatchResult;

    fn update(
        &self,
        update: DocumentUpdate,
        params: OperationParameters,
    ) -> DispatchResult;

    fn remove(
        &self,
        id: DocumentId,
        params: OperationParameters,
    ) -> DispatchResult;

    fn get(
        &self,
        id: DocumentId,
        field_set: Option<String>,
        params: OperationParameters,
    ) -> DispatchResult;
}

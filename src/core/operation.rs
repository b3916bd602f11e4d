use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::metrics;
use crate::AckToken;
use crate::AdmissionError;
use crate::BackendResponse;
use crate::DispatchError;
use crate::DispatchOptions;
use crate::DispatchOutcome;
use crate::DocumentOperation;
use crate::DocumentRequest;
use crate::JsonResponse;
use crate::OperationDispatcher;
use crate::Outcome;
use crate::ResponseStatus;
use crate::VisitState;

/// A single-document request waiting to be issued.
///
/// The request is parsed on the first dispatch attempt and the result is kept
/// for later attempts.
pub struct Operation {
    request: DocumentRequest,
    response: Arc<JsonResponse>,
    parsed: Option<(DocumentOperation, DispatchOptions)>,
    created: Instant,
    attempts: u32,
}

impl Operation {
    pub fn new(
        request: DocumentRequest,
        response: Arc<JsonResponse>,
    ) -> Self {
        Self {
            request,
            response,
            parsed: None,
            created: Instant::now(),
            attempts: 0,
        }
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn dispatch(
        &mut self,
        dispatcher: &OperationDispatcher,
    ) -> DispatchOutcome {
        if self.request.is_cancelled() {
            debug!(path = %self.request.path_id, "request cancelled before dispatch");
            self.response.abandon();
            return DispatchOutcome::Done;
        }
        self.attempts += 1;

        let (operation, options) = match &self.parsed {
            Some(parsed) => parsed.clone(),
            None => match self.request.parse() {
                Ok(parsed) => {
                    self.parsed = Some(parsed.clone());
                    parsed
                }
                Err(e) => return DispatchOutcome::Failed(e),
            },
        };

        let response = self.response.clone();
        let name = operation.name();
        let create_if_missing = operation.create_if_missing();
        let id = operation.id().clone();
        let on_response = move |backend: BackendResponse| async move {
            metrics::record_operation(name, backend.outcome, create_if_missing);
            let status = status_for(name, backend.outcome);
            let rendered = render(&response, &id, status, backend);
            if let Err(e) = rendered {
                debug!("could not render {} response: {}", name, e);
            } else if let Err(e) = response.commit(status, status.is_success()).await {
                debug!("could not commit {} response: {}", name, e);
            }
            response.close().await;
        };

        match dispatcher.dispatch(operation, options, on_response) {
            Ok(true) => DispatchOutcome::Done,
            Ok(false) => DispatchOutcome::Retry,
            Err(e) => DispatchOutcome::Failed(e),
        }
    }

    /// Renders a terminal dispatch failure.
    pub(crate) async fn fail(
        self,
        error: DispatchError,
    ) {
        let status = match error {
            DispatchError::BadRequest(_) => ResponseStatus::BadRequest,
            DispatchError::Server(_) => ResponseStatus::InternalServerError,
        };
        self.finish(status, error.to_string()).await;
    }

    /// Renders an admission rejection.
    pub(crate) async fn reject(
        self,
        reason: AdmissionError,
    ) {
        self.finish(ResponseStatus::TooManyRequests, reason.to_string()).await;
    }

    async fn finish(
        self,
        status: ResponseStatus,
        message: String,
    ) {
        if let Err(e) = self.response.write_message(message) {
            debug!("could not write message: {}", e);
        } else if let Err(e) = self.response.commit(status, false).await {
            debug!("could not commit response: {}", e);
        }
        self.response.close().await;
    }
}

pub(crate) fn status_for(
    operation: &str,
    outcome: Outcome,
) -> ResponseStatus {
    match outcome {
        Outcome::Success => ResponseStatus::Ok,
        Outcome::NotFound if operation == "remove" => ResponseStatus::Ok,
        Outcome::NotFound => ResponseStatus::NotFound,
        Outcome::ConditionFailed => ResponseStatus::PreconditionFailed,
        Outcome::Timeout => ResponseStatus::GatewayTimeout,
        Outcome::InsufficientStorage => ResponseStatus::InsufficientStorage,
        Outcome::Error => ResponseStatus::InternalServerError,
    }
}

fn render(
    response: &JsonResponse,
    id: &crate::DocumentId,
    status: ResponseStatus,
    backend: BackendResponse,
) -> crate::Result<()> {
    match backend.document {
        Some(document) if status.is_success() => response.write_single_document(document)?,
        _ => response.write_document_id(id)?,
    }
    match backend.message {
        Some(message) => response.write_message(message)?,
        None if !status.is_success() => response.write_message(default_message(backend.outcome))?,
        None => {}
    }
    if let Some(trace) = backend.trace {
        response.write_trace(trace)?;
    }
    Ok(())
}

fn default_message(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::NotFound => "Document not found",
        Outcome::ConditionFailed => "Test-and-set condition failed",
        Outcome::Timeout => "Operation timed out",
        Outcome::InsufficientStorage => "Insufficient storage",
        _ => "Operation failed",
    }
}

/// A mutation issued on behalf of a visited document.
///
/// Holds the visited document's acknowledgement until the backend has either
/// accepted the mutation or refused it for good.
pub struct DerivedOperation {
    operation: DocumentOperation,
    options: DispatchOptions,
    ack: Option<AckToken>,
    visit: Arc<VisitState>,
    created: Instant,
}

impl DerivedOperation {
    pub(crate) fn new(
        operation: DocumentOperation,
        options: DispatchOptions,
        ack: AckToken,
        visit: Arc<VisitState>,
    ) -> Self {
        Self {
            operation,
            options,
            ack: Some(ack),
            visit,
            created: Instant::now(),
        }
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub(crate) fn dispatch(
        &mut self,
        dispatcher: &OperationDispatcher,
    ) -> DispatchOutcome {
        if self.visit.has_failed() {
            // the visit is being aborted, nothing more is issued for it
            self.acknowledge();
            return DispatchOutcome::Done;
        }

        let name = self.operation.name();
        let create_if_missing = self.operation.create_if_missing();
        let id = self.operation.id().clone();
        let visit = self.visit.clone();
        visit.derived_started();
        let on_response = {
            let visit = visit.clone();
            move |backend: BackendResponse| async move {
                metrics::record_operation(name, backend.outcome, create_if_missing);
                match backend.outcome {
                    Outcome::Success | Outcome::NotFound | Outcome::ConditionFailed => {}
                    outcome => {
                        let reason = backend.message.unwrap_or_else(|| outcome.to_string());
                        visit.fail(format!("{name} of {id} failed: {reason}"));
                    }
                }
                visit.derived_finished();
            }
        };

        match dispatcher.dispatch(self.operation.clone(), self.options.clone(), on_response) {
            Ok(true) => {
                self.acknowledge();
                DispatchOutcome::Done
            }
            Ok(false) => {
                visit.derived_finished();
                DispatchOutcome::Retry
            }
            Err(e) => {
                visit.derived_finished();
                DispatchOutcome::Failed(e)
            }
        }
    }

    /// Latches a terminal failure on the visit and releases the document.
    pub(crate) fn fail(
        mut self,
        error: DispatchError,
    ) {
        warn!("{} of {} failed: {}", self.operation.name(), self.operation.id(), error);
        self.visit.fail(error.to_string());
        self.acknowledge();
    }

    pub(crate) fn reject(
        self,
        reason: AdmissionError,
    ) {
        self.fail(DispatchError::Server(reason.to_string()));
    }

    fn acknowledge(&mut self) {
        if let Some(ack) = self.ack.take() {
            ack.ack();
        }
    }
}

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;
use tracing::warn;

use crate::metrics::OUTSTANDING_OPERATIONS;
use crate::BackendResponse;
use crate::DispatchError;
use crate::DispatchResult;
use crate::DocumentOperation;
use crate::DocumentSession;
use crate::OperationParameters;
use crate::Outcome;
use crate::Responder;
use crate::TestAndSetCondition;

/// Per-call options that travel with an operation across retries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOptions {
    pub condition: Option<TestAndSetCondition>,
    pub route: Option<String>,
    pub timeout: Option<Duration>,
    pub trace_level: u8,
}

/// Issues document operations against the backend session and tracks how
/// many accepted operations are still waiting for their response.
pub struct OperationDispatcher {
    session: Arc<dyn DocumentSession>,
    outstanding: Arc<AtomicUsize>,
}

impl OperationDispatcher {
    pub fn new(session: Arc<dyn DocumentSession>) -> Self {
        Self {
            session,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Issues one backend call.
    ///
    /// Returns `Ok(true)` when the backend accepted the operation, in which
    /// case `on_response` runs once the backend answers, and the outstanding
    /// counter is released after it completes. `Ok(false)` means the backend
    /// asked to retry later. Fatal refusals are returned as errors.
    pub fn dispatch<F, Fut>(
        &self,
        operation: DocumentOperation,
        options: DispatchOptions,
        on_response: F,
    ) -> std::result::Result<bool, DispatchError>
    where
        F: FnOnce(BackendResponse) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = operation.name();
        let (responder, response_rx) = Responder::channel();
        let params = OperationParameters {
            condition: options.condition,
            route: options.route,
            timeout: options.timeout,
            trace_level: options.trace_level,
            responder,
        };

        let result = match operation {
            DocumentOperation::Put { document } => self.session.put(document, params),
            DocumentOperation::Update { update } => self.session.update(update, params),
            DocumentOperation::Remove { id } => self.session.remove(id, params),
            DocumentOperation::Get { id, field_set } => self.session.get(id, field_set, params),
        };

        match result {
            DispatchResult::Accepted => {
                self.outstanding.fetch_add(1, Ordering::SeqCst);
                OUTSTANDING_OPERATIONS.inc();
                let outstanding = self.outstanding.clone();
                tokio::spawn(async move {
                    let response = match response_rx.await {
                        Ok(response) => response,
                        Err(_) => {
                            warn!("backend dropped a {} operation without responding", name);
                            BackendResponse::new(Outcome::Error).with_message("Backend dropped the operation")
                        }
                    };
                    on_response(response).await;
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    OUTSTANDING_OPERATIONS.dec();
                });
                Ok(true)
            }
            DispatchResult::TransientError(reason) => {
                trace!("backend refused {} for now: {}", name, reason);
                Ok(false)
            }
            DispatchResult::FatalError(reason) => {
                warn!("backend refused {}: {}", name, reason);
                Err(DispatchError::Server(reason))
            }
        }
    }

    /// Accepted operations whose response has not been processed yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

//! Gateway facade.
//!
//! [`GatewayBuilder`] wires a document session and a visitor backend to the
//! two dispatch queues, their loops and the visiting orchestrator.
//! [`DocumentGateway`] is the entry point for single-document requests and
//! bulk requests alike.

mod builder;
mod request;
pub use builder::*;
pub use request::*;


use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::AdmissionError;
use crate::DispatchQueue;
use crate::Error;
use crate::ForwardDocuments;
use crate::GatewayConfig;
use crate::JsonResponse;
use crate::MutateDocuments;
use crate::Operation;
use crate::OperationDispatcher;
use crate::ResponseChannel;
use crate::ResponseFormat;
use crate::ResponseStatus;
use crate::Result;
use crate::SessionId;
use crate::SessionRegistry;
use crate::ShutdownCoordinator;
use crate::ShutdownReport;
use crate::StreamDocuments;
use crate::VisitCallback;
use crate::VisitError;
use crate::VisitMutation;
use crate::VisitingOrchestrator;
use crate::VisitorParameters;
use crate::VisitorParametersBuilder;
use crate::WorkItem;

/// A bulk request.
#[derive(Debug, Clone)]
pub struct VisitRequest {
    pub path_id: String,
    pub params: VisitorParameters,
    pub format: ResponseFormat,
    /// Deadline of the whole request; the configured default when `None`
    pub timeout: Option<Duration>,
    /// Route for mutations issued by visit-and-mutate requests
    pub route: Option<String>,
}

impl VisitRequest {
    pub fn new(params: VisitorParameters) -> Self {
        Self {
            path_id: "/document/v1/".to_string(),
            params,
            format: ResponseFormat::Buffered,
            timeout: None,
            route: None,
        }
    }

    pub fn with_path_id(
        mut self,
        path_id: impl Into<String>,
    ) -> Self {
        self.path_id = path_id.into();
        self
    }

    pub fn with_format(
        mut self,
        format: ResponseFormat,
    ) -> Self {
        self.format = format;
        self
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_route(
        mut self,
        route: impl Into<String>,
    ) -> Self {
        self.route = Some(route.into());
        self
    }
}

pub struct DocumentGateway {
    config: GatewayConfig,
    dispatcher: Arc<OperationDispatcher>,
    operations: Arc<DispatchQueue>,
    visit_operations: Arc<DispatchQueue>,
    registry: Arc<SessionRegistry>,
    orchestrator: VisitingOrchestrator,
    shutdown_tx: watch::Sender<()>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl DocumentGateway {
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Parameter builder seeded with the configured visiting defaults.
    pub fn visitor_parameters(&self) -> VisitorParametersBuilder {
        VisitorParameters::builder().max_pending(self.config.visiting.default_max_pending)
    }

    /// Admits a single-document request. The outcome is rendered into
    /// `channel`; an admission rejection is also returned.
    #[instrument(skip_all, fields(path = %request.path_id))]
    pub async fn submit(
        &self,
        request: DocumentRequest,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<()> {
        let response = JsonResponse::buffered(channel, &request.path_id);
        let operation = Operation::new(request, response);
        match self.operations.enqueue(WorkItem::Single(operation)) {
            Ok(()) => Ok(()),
            Err(rejected) => Err(Error::Admission(rejected.complete().await)),
        }
    }

    /// Streams every matching document into the response.
    pub async fn visit(
        &self,
        request: VisitRequest,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<SessionId> {
        self.start_visit(request, channel, Arc::new(StreamDocuments)).await
    }

    /// Applies `mutation` to every matching document.
    pub async fn visit_and_mutate(
        &self,
        request: VisitRequest,
        mutation: VisitMutation,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<SessionId> {
        let callback = MutateDocuments::new(
            mutation,
            self.visit_operations.clone(),
            self.orchestrator.backend().supports_timestamp_conditions(),
            request.route.clone(),
        );
        self.start_visit(request, channel, Arc::new(callback)).await
    }

    /// Copies every matching document to the request's remote destination.
    pub async fn visit_and_forward(
        &self,
        request: VisitRequest,
        channel: Arc<dyn ResponseChannel>,
    ) -> Result<SessionId> {
        if request.params.remote_destination().is_none() {
            let error: Error = VisitError::InvalidParameters("forwarding requires a remote destination".into()).into();
            let response = JsonResponse::new(channel, request.format, &request.path_id);
            render_failure(&response, ResponseStatus::BadRequest, &error).await;
            return Err(error);
        }
        self.start_visit(request, channel, Arc::new(ForwardDocuments)).await
    }

    async fn start_visit(
        &self,
        request: VisitRequest,
        channel: Arc<dyn ResponseChannel>,
        callback: Arc<dyn VisitCallback>,
    ) -> Result<SessionId> {
        let response = JsonResponse::new(channel, request.format, &request.path_id);
        if !self.operations.is_accepting() {
            let error = Error::Admission(AdmissionError::ShuttingDown);
            render_failure(&response, ResponseStatus::TooManyRequests, &error).await;
            return Err(error);
        }

        match self
            .orchestrator
            .visit(request.params, request.timeout, response.clone(), callback)
        {
            Ok(id) => {
                debug!(session = %id, path = %request.path_id, "visit started");
                Ok(id)
            }
            Err(e) => {
                let status = match &e {
                    Error::Visit(VisitError::InvalidParameters(_)) | Error::Visit(VisitError::InvalidContinuation(_)) => {
                        ResponseStatus::BadRequest
                    }
                    _ => ResponseStatus::InternalServerError,
                };
                render_failure(&response, status, &e).await;
                Err(e)
            }
        }
    }

    /// Drains the gateway within the configured deadline and stops the
    /// dispatch loops. Work still queued afterwards is rejected.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_within(self.config.shutdown.deadline()).await
    }

    pub async fn shutdown_within(
        &self,
        deadline: Duration,
    ) -> ShutdownReport {
        let coordinator = ShutdownCoordinator::new(
            self.operations.clone(),
            self.visit_operations.clone(),
            self.dispatcher.clone(),
            self.registry.clone(),
            self.config.shutdown.clone(),
        );
        let report = coordinator.shutdown_within(deadline).await;

        let _ = self.shutdown_tx.send(());
        let loops: Vec<JoinHandle<()>> = self.loops.lock().drain(..).collect();
        for handle in loops {
            if let Err(e) = handle.await {
                warn!("dispatch loop failed: {}", e);
            }
        }

        let leftovers = [&self.operations, &self.visit_operations]
            .into_iter()
            .flat_map(|queue| queue.take_all())
            .map(|item| item.reject(AdmissionError::ShuttingDown));
        join_all(leftovers).await;
        report
    }

    pub fn queued_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn queued_visit_operations(&self) -> usize {
        self.visit_operations.len()
    }

    pub fn outstanding_operations(&self) -> usize {
        self.dispatcher.outstanding()
    }

    pub fn active_visits(&self) -> usize {
        self.registry.len()
    }
}

async fn render_failure(
    response: &JsonResponse,
    status: ResponseStatus,
    error: &Error,
) {
    if let Err(e) = response.write_message(error.to_string()) {
        debug!("could not write failure message: {}", e);
    } else if let Err(e) = response.commit(status, false).await {
        debug!("could not commit failure: {}", e);
    }
    response.close().await;
}

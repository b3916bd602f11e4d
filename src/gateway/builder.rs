use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use super::DocumentGateway;
use crate::constants::OPERATION_QUEUE;
use crate::constants::VISIT_OPERATION_QUEUE;
use crate::metrics;
use crate::AdmissionPolicy;
use crate::DispatchLoop;
use crate::DispatchQueue;
use crate::DocumentSession;
use crate::Error;
use crate::GatewayConfig;
use crate::MemDocumentStore;
use crate::OperationDispatcher;
use crate::Result;
use crate::SessionRegistry;
use crate::VisitingOrchestrator;
use crate::VisitorBackend;

/// Assembles a running [`DocumentGateway`].
///
/// Must be built inside a tokio runtime: building spawns the dispatch loops.
pub struct GatewayBuilder {
    config: GatewayConfig,
    session: Option<Arc<dyn DocumentSession>>,
    visitor_backend: Option<Arc<dyn VisitorBackend>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            session: None,
            visitor_backend: None,
        }
    }

    /// Loads configuration from the environment, see [`GatewayConfig::new`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GatewayConfig::new()?))
    }

    pub fn document_session(
        mut self,
        session: Arc<dyn DocumentSession>,
    ) -> Self {
        self.session = Some(session);
        self
    }

    pub fn visitor_backend(
        mut self,
        backend: Arc<dyn VisitorBackend>,
    ) -> Self {
        self.visitor_backend = Some(backend);
        self
    }

    /// Uses one in-memory store for both documents and visiting.
    pub fn mem_store(
        self,
        store: Arc<MemDocumentStore>,
    ) -> Self {
        self.document_session(store.clone()).visitor_backend(store)
    }

    pub fn build(self) -> Result<DocumentGateway> {
        let config = self.config.validate()?;
        let session = self
            .session
            .ok_or_else(|| Error::Fatal("a document session is required".into()))?;
        let visitor_backend = self
            .visitor_backend
            .ok_or_else(|| Error::Fatal("a visitor backend is required".into()))?;

        if config.monitoring.metrics_enabled {
            metrics::register_custom_metrics();
        }

        let dispatcher = Arc::new(OperationDispatcher::new(session));
        let operations = Arc::new(DispatchQueue::new(
            OPERATION_QUEUE,
            Some(AdmissionPolicy::from(&config.queue)),
            dispatcher.clone(),
        ));
        // visit mutations are throttled by the sessions' pending windows
        let visit_operations = Arc::new(DispatchQueue::new(VISIT_OPERATION_QUEUE, None, dispatcher.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let interval = config.queue.dispatch_interval();
        let loops = vec![
            tokio::spawn(DispatchLoop::new(operations.clone(), interval, shutdown_rx.clone()).run()),
            tokio::spawn(DispatchLoop::new(visit_operations.clone(), interval, shutdown_rx).run()),
        ];

        let registry = Arc::new(SessionRegistry::new());
        let orchestrator = VisitingOrchestrator::new(visitor_backend, registry.clone(), config.visiting.clone());

        info!(?config, "document gateway started");
        Ok(DocumentGateway {
            config,
            dispatcher,
            operations,
            visit_operations,
            registry,
            orchestrator,
            shutdown_tx,
            loops: Mutex::new(loops),
        })
    }
}

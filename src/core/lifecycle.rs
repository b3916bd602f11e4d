use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;
use tracing::warn;

use crate::DispatchQueue;
use crate::OperationDispatcher;
use crate::SessionRegistry;
use crate::ShutdownConfig;

/// What was left when shutdown returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Everything drained before the deadline
    pub drained: bool,
    pub sessions_aborted: usize,
    /// Sessions still registered at the deadline, destroyed without waiting
    pub sessions_force_destroyed: usize,
    pub residual_operations: usize,
    pub residual_visit_operations: usize,
    pub residual_outstanding: usize,
    pub elapsed: Duration,
}

/// Drives the gateway to quiescence.
///
/// Visitor sessions are aborted first so no new derived work appears, then
/// both queues stop admitting and are drained while outstanding backend
/// calls finish. Returns at the deadline at the latest.
pub struct ShutdownCoordinator {
    operations: Arc<DispatchQueue>,
    visit_operations: Arc<DispatchQueue>,
    dispatcher: Arc<OperationDispatcher>,
    registry: Arc<SessionRegistry>,
    config: ShutdownConfig,
}

impl ShutdownCoordinator {
    pub fn new(
        operations: Arc<DispatchQueue>,
        visit_operations: Arc<DispatchQueue>,
        dispatcher: Arc<OperationDispatcher>,
        registry: Arc<SessionRegistry>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            operations,
            visit_operations,
            dispatcher,
            registry,
            config,
        }
    }

    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_within(self.config.deadline()).await
    }

    pub async fn shutdown_within(
        &self,
        deadline: Duration,
    ) -> ShutdownReport {
        let started = Instant::now();
        let deadline_at = started + deadline;

        let sessions_aborted = self.registry.abort_all();
        info!("shutting down: aborted {} visitor sessions", sessions_aborted);

        self.operations.close_admission();
        self.visit_operations.close_admission();

        let drained = loop {
            if self.is_quiescent() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline_at {
                break false;
            }
            self.operations.wake();
            self.visit_operations.wake();
            tokio::time::sleep(self.config.poll_interval().min(deadline_at - now)).await;
        };

        let sessions_force_destroyed = self.registry.destroy_all();
        let report = ShutdownReport {
            drained,
            sessions_aborted,
            sessions_force_destroyed,
            residual_operations: self.operations.len(),
            residual_visit_operations: self.visit_operations.len(),
            residual_outstanding: self.dispatcher.outstanding(),
            elapsed: started.elapsed(),
        };

        if drained {
            info!("shutdown drained in {:?}", report.elapsed);
        } else {
            warn!(
                "shutdown deadline of {:?} reached with residual work: {} queued operations, {} queued visit operations, {} outstanding operations, {} visitor sessions force destroyed",
                deadline,
                report.residual_operations,
                report.residual_visit_operations,
                report.residual_outstanding,
                report.sessions_force_destroyed
            );
        }
        report
    }

    fn is_quiescent(&self) -> bool {
        self.registry.is_empty()
            && self.operations.is_empty()
            && self.visit_operations.is_empty()
            && self.dispatcher.outstanding() == 0
    }
}

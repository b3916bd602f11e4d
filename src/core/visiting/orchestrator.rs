use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::constants::VISITING_FAILED_MESSAGE;
use crate::CompletionCode;
use crate::JsonResponse;
use crate::ResponseFormat;
use crate::ResponseStatus;
use crate::Result;
use crate::SessionId;
use crate::SessionRegistry;
use crate::VisitCallback;
use crate::VisitContext;
use crate::VisitState;
use crate::VisitedItem;
use crate::VisitingConfig;
use crate::VisitorBackend;
use crate::VisitorContinuation;
use crate::VisitorEvent;
use crate::VisitorParameters;
use crate::VisitorSession;

/// Starts visitor sessions and drives each one to a rendered response.
pub struct VisitingOrchestrator {
    backend: Arc<dyn VisitorBackend>,
    registry: Arc<SessionRegistry>,
    config: VisitingConfig,
}

impl VisitingOrchestrator {
    pub fn new(
        backend: Arc<dyn VisitorBackend>,
        registry: Arc<SessionRegistry>,
        config: VisitingConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn VisitorBackend> {
        &self.backend
    }

    /// Creates a session for `params` and hands it to a driver task, which
    /// renders the terminal response into `response`.
    ///
    /// `request_timeout` is the deadline of the whole request; the session is
    /// given what remains of it after the abort margin.
    pub fn visit(
        &self,
        params: VisitorParameters,
        request_timeout: Option<Duration>,
        response: Arc<JsonResponse>,
        callback: Arc<dyn VisitCallback>,
    ) -> Result<SessionId> {
        let timeout = request_timeout.unwrap_or_else(|| self.config.default_request_timeout());
        let margin = self.config.streaming_abort_margin();
        let session_budget = timeout.saturating_sub(margin).max(Duration::from_millis(1));
        let params = params.with_session_timeout(params.session_timeout().min(session_budget));

        let streaming = response.format() == ResponseFormat::Lines;
        let ctx = VisitContext {
            response: response.clone(),
            state: Arc::new(VisitState::new()),
            params: params.clone(),
        };
        callback.on_start(&ctx)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = self.backend.create_visitor_session(params, events_tx)?;
        ctx.state.attach(session.clone());
        if callback.has_local_data_handler() {
            response.spawn_flusher();
        }

        let id: SessionId = nanoid!();
        let (registered_tx, registered_rx) = oneshot::channel();
        let driver = SessionDriver {
            id: id.clone(),
            session: session.clone(),
            events: events_rx,
            callback,
            ctx,
            registry: self.registry.clone(),
            registered: registered_rx,
            abort_after: streaming.then_some(session_budget),
            progress_interval: streaming.then(|| self.config.progress_interval()),
            timeout,
            margin,
        };
        tokio::spawn(driver.run());
        self.registry.register(id.clone(), session, registered_tx);
        Ok(id)
    }
}

/// Owns one session from creation to destruction.
struct SessionDriver {
    id: SessionId,
    session: Arc<dyn VisitorSession>,
    events: mpsc::UnboundedReceiver<VisitorEvent>,
    callback: Arc<dyn VisitCallback>,
    ctx: VisitContext,
    registry: Arc<SessionRegistry>,
    registered: oneshot::Receiver<()>,
    /// Streaming visits are aborted this long after start
    abort_after: Option<Duration>,
    /// Streaming visits emit inline progress at this interval
    progress_interval: Option<Duration>,
    timeout: Duration,
    margin: Duration,
}

impl SessionDriver {
    async fn run(mut self) {
        let abort_deadline = self.abort_after.map(|after| Instant::now() + after);
        let abort_timer = tokio::time::sleep_until(abort_deadline.unwrap_or_else(far_future));
        tokio::pin!(abort_timer);
        let mut abort_armed = abort_deadline.is_some();

        let mut progress = tokio::time::interval(self.progress_interval.unwrap_or(Duration::from_secs(3600)));
        progress.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        progress.reset();
        let progress_enabled = self.progress_interval.is_some();

        let (code, message) = loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(VisitorEvent::Document { document, timestamp, ack }) => {
                        self.ctx.state.document_visited();
                        self.callback.on_document(&self.ctx, VisitedItem::Document { document, timestamp }, ack);
                    }
                    Some(VisitorEvent::Removal { id, timestamp, ack }) => {
                        self.ctx.state.document_visited();
                        self.callback.on_document(&self.ctx, VisitedItem::Removal { id, timestamp }, ack);
                    }
                    Some(VisitorEvent::Done { code, message }) => break (code, message),
                    None => break (CompletionCode::Failure, Some("Visitor session ended without completing".to_string())),
                },

                _ = &mut abort_timer, if abort_armed => {
                    abort_armed = false;
                    debug!(session = %self.id, "aborting streaming visit before request deadline");
                    self.session.abort();
                }

                _ = progress.tick(), if progress_enabled => {
                    let continuation = VisitorContinuation::from_progress(&self.session.progress());
                    if let Err(e) = self.ctx.response.write_progress(continuation) {
                        debug!(session = %self.id, "could not write progress: {}", e);
                    }
                }
            }
        };

        debug!(session = %self.id, %code, "visitor session done");
        self.ctx.state.settled().await;
        self.finish(code, message).await;
    }

    async fn finish(
        self,
        code: CompletionCode,
        message: Option<String>,
    ) {
        let ctx = &self.ctx;
        if let Err(e) = self.callback.on_end(ctx) {
            ctx.state.fail(e.to_string());
        }

        if let Err(e) = self.render(code, message).await {
            warn!(session = %self.id, "could not render visit response: {}", e);
        }
        ctx.response.close().await;

        if let Some(session) = self.registry.deregister(&self.id, self.registered).await {
            session.destroy();
        }
    }

    async fn render(
        &self,
        code: CompletionCode,
        message: Option<String>,
    ) -> Result<()> {
        let response = &self.ctx.response;
        let statistics = self.session.statistics();
        let count = if self.callback.has_local_data_handler() {
            self.ctx.state.documents_visited()
        } else {
            statistics.documents_visited
        };
        response.write_document_count(count)?;
        if let Some(trace) = self.session.trace() {
            response.write_trace(trace)?;
        }

        let error = self.ctx.state.error();
        let status = match code {
            CompletionCode::Timeout | CompletionCode::Aborted if error.is_none() && statistics.buckets_visited == 0 => {
                response.write_message(format!(
                    "No buckets visited within timeout of {}ms (request timeout -{}ms)",
                    self.timeout.as_millis(),
                    self.margin.as_millis()
                ))?;
                ResponseStatus::GatewayTimeout
            }
            CompletionCode::Success | CompletionCode::Timeout | CompletionCode::Aborted if error.is_none() => {
                let continuation = VisitorContinuation::from_progress(&self.session.progress());
                if !continuation.is_exhausted() || response.format() == ResponseFormat::Lines {
                    response.write_continuation(continuation)?;
                }
                ResponseStatus::Ok
            }
            _ => {
                let message = error.or(message).unwrap_or_else(|| VISITING_FAILED_MESSAGE.to_string());
                response.write_message(message)?;
                ResponseStatus::InternalServerError
            }
        };
        response.commit(status, status.is_success()).await
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}

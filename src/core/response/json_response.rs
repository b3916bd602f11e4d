use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::render;
use super::FlushCounters;
use super::FlushEvent;
use super::FlushState;
use super::ResponseFormat;
use crate::constants::CONTENT_TYPE_JSON;
use crate::constants::CONTENT_TYPE_JSONL;
use crate::constants::DEFAULT_ERROR_MESSAGE;
use crate::constants::FLUSH_BATCH_SIZE;
use crate::AckToken;
use crate::Document;
use crate::DocumentId;
use crate::Error;
use crate::ResponseChannel;
use crate::ResponseStatus;
use crate::Result;
use crate::TransportError;
use crate::VisitorContinuation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentsArray {
    NotOpened,
    Open { empty: bool },
    Closed,
}

struct PendingDocument {
    bytes: Vec<u8>,
    ack: Option<AckToken>,
}

struct ResponseState {
    pending: VecDeque<PendingDocument>,
    flush: FlushState,
    /// Buffered format: the JSON object rendered so far
    body: Vec<u8>,
    documents: DocumentsArray,
    id: Option<DocumentId>,
    fields: Option<Map<String, Value>>,
    message: Option<String>,
    document_count: Option<u64>,
    trace: Option<Value>,
    continuation: Option<VisitorContinuation>,
    /// Line format: latest not-yet-flushed inline progress
    progress: Option<VisitorContinuation>,
    /// Line format: the last progress line handed to the channel
    last_progress: Option<VisitorContinuation>,
    status: Option<ResponseStatus>,
    channel_committed: bool,
    closed: bool,
}

impl ResponseState {
    fn new(body: Vec<u8>) -> Self {
        Self {
            pending: VecDeque::new(),
            flush: FlushState::new(FLUSH_BATCH_SIZE),
            body,
            documents: DocumentsArray::NotOpened,
            id: None,
            fields: None,
            message: None,
            document_count: None,
            trace: None,
            continuation: None,
            progress: None,
            last_progress: None,
            status: None,
            channel_committed: false,
            closed: false,
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        if self.status.is_some() {
            return Err(TransportError::AlreadyCommitted.into());
        }
        Ok(())
    }

    fn open_documents_array(&mut self) {
        if self.documents == DocumentsArray::NotOpened {
            self.body.extend_from_slice(br#","documents":["#);
            self.documents = DocumentsArray::Open { empty: true };
        }
    }

    fn append_buffered_document(
        &mut self,
        bytes: &[u8],
    ) {
        self.open_documents_array();
        if let DocumentsArray::Open { empty } = self.documents {
            if !empty {
                self.body.push(b',');
            }
            self.body.extend_from_slice(bytes);
            self.documents = DocumentsArray::Open { empty: false };
        }
    }

    fn render_buffered_tail(&mut self) -> Result<Vec<u8>> {
        let mut out = std::mem::take(&mut self.body);
        if let DocumentsArray::Open { .. } = self.documents {
            out.push(b']');
        }
        self.documents = DocumentsArray::Closed;

        if let Some(id) = &self.id {
            render::append_field(&mut out, "id", &Value::String(id.to_string()))?;
        }
        if let Some(fields) = self.fields.take() {
            render::append_field(&mut out, "fields", &Value::Object(fields))?;
        }
        if let Some(message) = &self.message {
            render::append_field(&mut out, "message", &Value::String(message.clone()))?;
        }
        if let Some(count) = self.document_count {
            render::append_field(&mut out, "documentCount", &Value::from(count))?;
        }
        if let Some(trace) = self.trace.take() {
            render::append_field(&mut out, "trace", &trace)?;
        }
        if let Some(token) = self.continuation.as_ref().and_then(|c| c.token()) {
            render::append_field(&mut out, "continuation", &Value::String(token.to_string()))?;
        }
        out.push(b'}');
        Ok(out)
    }

    fn render_lines_tail(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(message) = &self.message {
            render::append_line(&mut out, "message", &Value::String(message.clone()))?;
        }
        if let Some(count) = self.document_count {
            render::append_line(&mut out, "documentCount", &Value::from(count))?;
        }
        if let Some(trace) = self.trace.take() {
            render::append_line(&mut out, "trace", &trace)?;
        }
        if let Some(continuation) = &self.continuation {
            render::append_line(&mut out, "continuation", &continuation.to_json())?;
        }
        Ok(out)
    }
}

/// Output side-channel of one request.
///
/// Documents are serialized into private buffers and queued together with
/// their acknowledgement. A flush pass moves at most [`FLUSH_BATCH_SIZE`]
/// queued documents into the outgoing buffer, and only fires their
/// acknowledgements once that transfer has completed. Acknowledgements
/// therefore fire in write order, never before the bytes are queued for
/// transmission.
///
/// All state lives behind one lock, which is never held while calling into
/// the [`ResponseChannel`].
pub struct JsonResponse {
    channel: Arc<dyn ResponseChannel>,
    format: ResponseFormat,
    state: Mutex<ResponseState>,
    flush_requested: Arc<Notify>,
    pass_finished: Notify,
    closed: CancellationToken,
}

impl JsonResponse {
    /// A single JSON object, `{"pathId": ..., ...}`, sent on commit.
    pub fn buffered(
        channel: Arc<dyn ResponseChannel>,
        path_id: &str,
    ) -> Arc<Self> {
        let mut body = br#"{"pathId":"#.to_vec();
        // a string always serializes
        let _ = serde_json::to_writer(&mut body, path_id);
        Self::create(channel, ResponseFormat::Buffered, body)
    }

    /// One JSON object per line, streamed as documents are flushed.
    pub fn lines(channel: Arc<dyn ResponseChannel>) -> Arc<Self> {
        Self::create(channel, ResponseFormat::Lines, Vec::new())
    }

    pub fn new(
        channel: Arc<dyn ResponseChannel>,
        format: ResponseFormat,
        path_id: &str,
    ) -> Arc<Self> {
        match format {
            ResponseFormat::Buffered => Self::buffered(channel, path_id),
            ResponseFormat::Lines => Self::lines(channel),
        }
    }

    fn create(
        channel: Arc<dyn ResponseChannel>,
        format: ResponseFormat,
        body: Vec<u8>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            format,
            state: Mutex::new(ResponseState::new(body)),
            flush_requested: Arc::new(Notify::new()),
            pass_finished: Notify::new(),
            closed: CancellationToken::new(),
        })
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Opens the buffered `documents` array, so that it is rendered even when
    /// nothing is visited. No-op for line output.
    pub fn write_documents_array_start(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        if self.format == ResponseFormat::Buffered {
            state.open_documents_array();
        }
        Ok(())
    }

    pub fn write_document_value(
        &self,
        document: &Document,
        ack: Option<AckToken>,
    ) -> Result<()> {
        let bytes = render::document_bytes(self.format, document)?;
        self.enqueue(bytes, ack)
    }

    pub fn write_document_removal(
        &self,
        id: &DocumentId,
        ack: Option<AckToken>,
    ) -> Result<()> {
        let bytes = render::removal_bytes(id)?;
        self.enqueue(bytes, ack)
    }

    fn enqueue(
        &self,
        bytes: Vec<u8>,
        ack: Option<AckToken>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.ensure_writable()?;
            state.pending.push_back(PendingDocument { bytes, ack });
            state.flush.apply(FlushEvent::Written);
        }
        self.flush_requested.notify_one();
        Ok(())
    }

    pub fn write_document_id(
        &self,
        id: &DocumentId,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.id = Some(id.clone());
        Ok(())
    }

    /// Renders a single fetched document as top-level `id` and `fields`.
    pub fn write_single_document(
        &self,
        document: Document,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.id = Some(document.id);
        state.fields = Some(document.fields);
        Ok(())
    }

    /// Sets the human-readable message. The last write before commit wins.
    pub fn write_message(
        &self,
        message: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.message = Some(message.into());
        Ok(())
    }

    pub fn write_document_count(
        &self,
        count: u64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.document_count = Some(count);
        Ok(())
    }

    pub fn write_trace(
        &self,
        trace: Value,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.trace = Some(trace);
        Ok(())
    }

    /// Terminal continuation, rendered on commit.
    pub fn write_continuation(
        &self,
        continuation: VisitorContinuation,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_writable()?;
        state.continuation = Some(continuation);
        Ok(())
    }

    /// Inline continuation progress for line output, emitted after the next
    /// flushed batch. Replaces any earlier progress not yet flushed; a repeat
    /// of the last emitted progress is dropped. Held back until the first
    /// document has been streamed. Ignored for buffered output.
    pub fn write_progress(
        &self,
        continuation: VisitorContinuation,
    ) -> Result<()> {
        if self.format == ResponseFormat::Buffered {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            state.ensure_writable()?;
            if state.last_progress.as_ref() == Some(&continuation) {
                state.progress = None;
                return Ok(());
            }
            state.progress = Some(continuation);
        }
        self.flush_requested.notify_one();
        Ok(())
    }

    /// Runs one flush pass. Returns the number of documents acknowledged by
    /// it; zero when there was nothing to do or another pass is running.
    pub async fn flush(&self) -> Result<usize> {
        let (bytes, acks, commit_first) = {
            let mut state = self.state.lock();
            if state.flush.pass_running() {
                return Ok(0);
            }
            // progress alone never commits the channel: until a document is
            // streamed the terminal status may still be an error
            let has_progress =
                self.format == ResponseFormat::Lines && state.progress.is_some() && state.channel_committed;
            if state.pending.is_empty() && !has_progress {
                return Ok(0);
            }

            let n = state.flush.apply(FlushEvent::FlushStarted) as usize;
            let docs: Vec<PendingDocument> = state.pending.drain(..n).collect();
            let mut acks = Vec::with_capacity(n);
            match self.format {
                ResponseFormat::Buffered => {
                    for doc in docs {
                        state.append_buffered_document(&doc.bytes);
                        acks.push(doc.ack);
                    }
                    (None, acks, false)
                }
                ResponseFormat::Lines => {
                    let mut out = Vec::new();
                    for doc in docs {
                        out.extend_from_slice(&doc.bytes);
                        out.push(b'\n');
                        acks.push(doc.ack);
                    }
                    if let Some(progress) = state.progress.take() {
                        if let Err(e) = render::append_line(&mut out, "continuation", &progress.to_json()) {
                            warn!("failed to render progress: {}", e);
                        }
                        state.last_progress = Some(progress);
                    }
                    let commit_first = !state.channel_committed;
                    state.channel_committed = true;
                    (Some(out), acks, commit_first)
                }
            }
        };

        let mut result: std::result::Result<(), TransportError> = Ok(());
        if let Some(bytes) = bytes {
            if commit_first {
                result = self.channel.commit(ResponseStatus::Ok, CONTENT_TYPE_JSONL, true);
            }
            if result.is_ok() {
                result = await_write(self.channel.write(Bytes::from(bytes))).await;
            }
        }

        let acknowledged = acks.len();
        for ack in acks.into_iter().flatten() {
            ack.ack();
        }
        let counters = {
            let mut state = self.state.lock();
            state.flush.apply(FlushEvent::Acknowledged);
            state.flush.counters()
        };
        self.pass_finished.notify_waiters();
        trace!(?counters, acknowledged, "flush pass finished");

        match result {
            Ok(()) => Ok(acknowledged),
            Err(e) => {
                debug!("flush write failed after acknowledging {} documents: {}", acknowledged, e);
                Err(e.into())
            }
        }
    }

    /// Flushes until nothing is queued and no pass is running.
    async fn drain(&self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        loop {
            let finished = self.pass_finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            let running = {
                let state = self.state.lock();
                if state.pending.is_empty() && !state.flush.pass_running() {
                    break;
                }
                state.flush.pass_running()
            };
            if running {
                finished.await;
                continue;
            }
            if let Err(e) = self.flush().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Renders the terminal status and metadata. May only be called once.
    pub async fn commit(
        &self,
        status: ResponseStatus,
        fully_applied: bool,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.ensure_writable()?;
            state.status = Some(status);
            state.progress = None;
        }

        let drained = self.drain().await;

        let (bytes, commit_channel) = {
            let mut state = self.state.lock();
            let bytes = match self.format {
                ResponseFormat::Buffered => state.render_buffered_tail()?,
                ResponseFormat::Lines => state.render_lines_tail()?,
            };
            let commit_channel = !state.channel_committed;
            state.channel_committed = true;
            (bytes, commit_channel)
        };

        if commit_channel {
            let content_type = match self.format {
                ResponseFormat::Buffered => CONTENT_TYPE_JSON,
                ResponseFormat::Lines => CONTENT_TYPE_JSONL,
            };
            self.channel.commit(status, content_type, fully_applied)?;
        }
        if !bytes.is_empty() {
            await_write(self.channel.write(Bytes::from(bytes))).await?;
        }
        debug!(%status, "response committed");
        drained
    }

    /// Closes the underlying channel exactly once, committing a server error
    /// first if nothing was committed.
    pub async fn close(&self) {
        let needs_commit = {
            let mut state = self.state.lock();
            let needs_commit = state.status.is_none() && !state.closed;
            if needs_commit && state.message.is_none() {
                state.message = Some(DEFAULT_ERROR_MESSAGE.to_string());
            }
            needs_commit
        };
        if needs_commit {
            if let Err(e) = self.commit(ResponseStatus::InternalServerError, false).await {
                warn!("forced commit on close failed: {}", e);
            }
        }
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.closed.cancel();
        self.channel.close();
    }

    /// Closes the channel without rendering anything, for a request whose
    /// client has gone away. No-op once closed.
    pub fn abandon(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
        }
        self.closed.cancel();
        self.channel.close();
    }

    /// Spawns the background flusher, which runs flush passes whenever new
    /// documents or progress are queued, until the response is closed.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let response = Arc::downgrade(self);
        let requested = self.flush_requested.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = requested.notified() => {}
                }
                let Some(response) = response.upgrade() else {
                    break;
                };
                loop {
                    match response.flush().await {
                        Ok(0) => break,
                        Ok(n) => trace!("flushed {} documents", n),
                        Err(e) => {
                            debug!("background flush failed: {}", e);
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn counters(&self) -> FlushCounters {
        self.state.lock().flush.counters()
    }

    pub fn pending_documents(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Status given to [`JsonResponse::commit`], if committed.
    pub fn status(&self) -> Option<ResponseStatus> {
        self.state.lock().status
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().status.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

async fn await_write(completion: crate::WriteCompletion) -> std::result::Result<(), TransportError> {
    match completion.await {
        Ok(result) => result,
        Err(_) => Err(TransportError::WriteFailed("transport dropped write completion".into())),
    }
}

impl Drop for JsonResponse {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        warn!("response dropped without being closed");
        if !state.channel_committed {
            let _ = self
                .channel
                .commit(ResponseStatus::InternalServerError, CONTENT_TYPE_JSON, false);
        }
        self.closed.cancel();
        self.channel.close();
    }
}

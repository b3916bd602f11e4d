use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::ResponseChannel;
use super::ResponseStatus;
use super::WriteCompletion;
use crate::TransportError;

type CompletionSender = oneshot::Sender<std::result::Result<(), TransportError>>;

/// In-memory [`ResponseChannel`] that records everything written to it.
///
/// In the default mode every write completes immediately. A channel created
/// with [`MemoryChannel::manual`] holds completions until
/// [`MemoryChannel::complete_writes`] releases them, in submission order.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    manual: bool,
    inner: Mutex<MemoryChannelState>,
}

#[derive(Debug, Default)]
struct MemoryChannelState {
    status: Option<ResponseStatus>,
    content_type: Option<&'static str>,
    fully_applied: Option<bool>,
    commits: usize,
    closes: usize,
    writes: usize,
    body: Vec<u8>,
    pending: VecDeque<CompletionSender>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            inner: Mutex::new(MemoryChannelState::default()),
        }
    }

    /// Completes up to `n` held writes. Returns how many were completed.
    pub fn complete_writes(
        &self,
        n: usize,
    ) -> usize {
        let senders: Vec<CompletionSender> = {
            let mut inner = self.inner.lock();
            let n = n.min(inner.pending.len());
            inner.pending.drain(..n).collect()
        };
        let completed = senders.len();
        for tx in senders {
            let _ = tx.send(Ok(()));
        }
        completed
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn status(&self) -> Option<ResponseStatus> {
        self.inner.lock().status
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.inner.lock().content_type
    }

    pub fn fully_applied(&self) -> Option<bool> {
        self.inner.lock().fully_applied
    }

    pub fn commit_count(&self) -> usize {
        self.inner.lock().commits
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closes > 0
    }

    pub fn body(&self) -> Vec<u8> {
        self.inner.lock().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().body).into_owned()
    }

    /// Parses the body as a single JSON value.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.inner.lock().body)
    }

    /// Parses the body as one JSON value per non-empty line.
    pub fn json_lines(&self) -> serde_json::Result<Vec<Value>> {
        self.body_string()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect()
    }
}

impl ResponseChannel for MemoryChannel {
    fn commit(
        &self,
        status: ResponseStatus,
        content_type: &'static str,
        fully_applied: bool,
    ) -> std::result::Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.closes > 0 {
            return Err(TransportError::Closed);
        }
        if inner.commits > 0 {
            return Err(TransportError::AlreadyCommitted);
        }
        inner.commits += 1;
        inner.status = Some(status);
        inner.content_type = Some(content_type);
        inner.fully_applied = Some(fully_applied);
        Ok(())
    }

    fn write(
        &self,
        bytes: Bytes,
    ) -> WriteCompletion {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if inner.closes > 0 {
            let _ = tx.send(Err(TransportError::Closed));
            return rx;
        }
        inner.writes += 1;
        inner.body.extend_from_slice(&bytes);
        if self.manual {
            inner.pending.push_back(tx);
        } else {
            let _ = tx.send(Ok(()));
        }
        rx
    }

    fn close(&self) {
        let pending: Vec<CompletionSender> = {
            let mut inner = self.inner.lock();
            inner.closes += 1;
            inner.pending.drain(..).collect()
        };
        for tx in pending {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }
}

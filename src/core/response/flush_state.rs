//! Write/flush/acknowledge bookkeeping of one response writer.
//!
//! Three monotonic counters, each advanced by a different actor:
//! - `written`: documents serialized and queued by the visiting side
//! - `flushed`: documents handed to the outgoing buffer by a flush pass
//! - `acknowledged`: documents whose completion handlers have fired
//!
//! Invariant: `acknowledged <= flushed <= written`, and a flush pass never
//! claims more than `batch_size` documents, so at most `flushed + batch_size`
//! documents can ever be acknowledged.

use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushCounters {
    pub written: u64,
    pub flushed: u64,
    pub acknowledged: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushEvent {
    /// One more document was queued
    Written,
    /// A flush pass starts and claims up to one batch of queued documents
    FlushStarted,
    /// The claimed documents of the running pass have been acknowledged
    Acknowledged,
}

#[derive(Debug)]
pub(crate) struct FlushState {
    counters: FlushCounters,
    batch_size: u64,
    in_pass: Option<u64>,
}

impl FlushState {
    pub(crate) fn new(batch_size: usize) -> Self {
        Self {
            counters: FlushCounters::default(),
            batch_size: batch_size.max(1) as u64,
            in_pass: None,
        }
    }

    /// Single transition entry point. Returns the number of documents the
    /// event concerns: 1 for `Written`, the claimed batch for `FlushStarted`
    /// (0 when a pass is already running), and the acknowledged count for
    /// `Acknowledged`.
    pub(crate) fn apply(
        &mut self,
        event: FlushEvent,
    ) -> u64 {
        let n = match event {
            FlushEvent::Written => {
                self.counters.written += 1;
                1
            }
            FlushEvent::FlushStarted => {
                if self.in_pass.is_some() {
                    return 0;
                }
                let n = (self.counters.written - self.counters.flushed).min(self.batch_size);
                self.counters.flushed += n;
                self.in_pass = Some(n);
                n
            }
            FlushEvent::Acknowledged => {
                let n = self.in_pass.take().unwrap_or(0);
                self.counters.acknowledged += n;
                n
            }
        };
        trace!(?event, counters = ?self.counters, "flush state transition");
        debug_assert!(self.invariant_holds(), "flush invariant violated: {:?}", self.counters);
        n
    }

    pub(crate) fn pass_running(&self) -> bool {
        self.in_pass.is_some()
    }

    pub(crate) fn counters(&self) -> FlushCounters {
        self.counters
    }

    pub(crate) fn invariant_holds(&self) -> bool {
        let c = self.counters;
        c.acknowledged <= c.flushed && c.flushed <= c.written && c.flushed <= c.acknowledged + self.batch_size
    }
}

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::trace;

use crate::metrics;
use crate::metrics::QUEUE_DEPTH;
use crate::AdmissionError;
use crate::DispatchOutcome;
use crate::OperationDispatcher;
use crate::QueueConfig;
use crate::Rejected;
use crate::WorkItem;

/// Admission limits of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Zero disables queuing
    pub max_depth: usize,
    pub max_age: Duration,
}

impl From<&QueueConfig> for AdmissionPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_depth: config.max_queue_depth,
            max_age: config.max_queue_age(),
        }
    }
}

enum Step {
    Dispatched,
    Blocked,
    Empty,
}

/// FIFO of work items waiting for the backend.
///
/// Only the head is ever dispatched. When the backend asks for a retry the
/// head stays in place and draining stops until the next pass, so items are
/// issued in arrival order. At most one caller dispatches at a time.
pub struct DispatchQueue {
    name: &'static str,
    policy: Option<AdmissionPolicy>,
    dispatcher: Arc<OperationDispatcher>,
    items: Mutex<VecDeque<WorkItem>>,
    /// Admitted and not yet issued
    enqueued: AtomicUsize,
    dispatching: AtomicBool,
    accepting: AtomicBool,
    wakeup: Notify,
}

impl DispatchQueue {
    pub fn new(
        name: &'static str,
        policy: Option<AdmissionPolicy>,
        dispatcher: Arc<OperationDispatcher>,
    ) -> Self {
        Self {
            name,
            policy,
            dispatcher,
            items: Mutex::new(VecDeque::new()),
            enqueued: AtomicUsize::new(0),
            dispatching: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            wakeup: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Admits `item` and tries to dispatch the queue head right away.
    ///
    /// Refused items are handed back untouched together with the reason.
    pub fn enqueue(
        &self,
        item: WorkItem,
    ) -> std::result::Result<(), Rejected> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(self.rejected(item, AdmissionError::ShuttingDown));
        }

        if let Some(policy) = self.policy {
            if policy.max_depth == 0 {
                return self.dispatch_unqueued(item);
            }

            let depth = self.enqueued.fetch_add(1, Ordering::SeqCst);
            if depth >= policy.max_depth {
                self.enqueued.fetch_sub(1, Ordering::SeqCst);
                return Err(self.rejected(
                    item,
                    AdmissionError::QueueFull {
                        queue: self.name,
                        depth,
                        max: policy.max_depth,
                    },
                ));
            }

            let oldest_age = {
                let items = self.items.lock();
                if items.len() > 1 {
                    items.front().map(|head| head.created().elapsed())
                } else {
                    None
                }
            };
            if let Some(age) = oldest_age.filter(|age| *age > policy.max_age) {
                self.enqueued.fetch_sub(1, Ordering::SeqCst);
                return Err(self.rejected(
                    item,
                    AdmissionError::QueueTooOld {
                        queue: self.name,
                        age,
                        max_age: policy.max_age,
                    },
                ));
            }
        } else {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
        }

        {
            let mut items = self.items.lock();
            items.push_back(item);
            QUEUE_DEPTH.with_label_values(&[self.name]).set(items.len() as i64);
        }
        self.dispatch_first();
        self.wakeup.notify_one();
        Ok(())
    }

    fn dispatch_unqueued(
        &self,
        mut item: WorkItem,
    ) -> std::result::Result<(), Rejected> {
        match item.dispatch(&self.dispatcher) {
            DispatchOutcome::Done => Ok(()),
            DispatchOutcome::Failed(e) => {
                item.fail(e);
                Ok(())
            }
            DispatchOutcome::Retry => Err(self.rejected(item, AdmissionError::Overloaded)),
        }
    }

    fn rejected(
        &self,
        item: WorkItem,
        reason: AdmissionError,
    ) -> Rejected {
        debug!(queue = self.name, "{}", reason);
        metrics::record_rejection(self.name, reason.reason());
        Rejected { item, reason }
    }

    /// Makes one dispatch attempt at the head, unless a drain is running.
    pub fn dispatch_first(&self) -> bool {
        if !self.try_begin() {
            return false;
        }
        let dispatched = matches!(self.step(), Step::Dispatched);
        self.dispatching.store(false, Ordering::SeqCst);
        dispatched
    }

    /// Dispatches from the head until the queue is empty or the backend asks
    /// for a retry. Returns how many items left the queue.
    pub fn drain(&self) -> usize {
        if !self.try_begin() {
            return 0;
        }
        let mut dispatched = 0;
        while let Step::Dispatched = self.step() {
            dispatched += 1;
        }
        self.dispatching.store(false, Ordering::SeqCst);
        if dispatched > 0 {
            trace!(queue = self.name, "dispatched {} items", dispatched);
        }
        dispatched
    }

    fn try_begin(&self) -> bool {
        self.dispatching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn step(&self) -> Step {
        let Some(mut item) = self.items.lock().pop_front() else {
            return Step::Empty;
        };

        match item.dispatch(&self.dispatcher) {
            DispatchOutcome::Retry => {
                self.items.lock().push_front(item);
                Step::Blocked
            }
            DispatchOutcome::Done => {
                self.release();
                Step::Dispatched
            }
            DispatchOutcome::Failed(e) => {
                self.release();
                item.fail(e);
                Step::Dispatched
            }
        }
    }

    fn release(&self) {
        self.enqueued.fetch_sub(1, Ordering::SeqCst);
        QUEUE_DEPTH
            .with_label_values(&[self.name])
            .set(self.items.lock().len() as i64);
    }

    /// Stops admitting work. Queued items are still drained.
    pub fn close_admission(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.wakeup.notify_one();
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Items currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items admitted and not yet issued, including one being dispatched.
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Removes everything still queued.
    pub(crate) fn take_all(&self) -> Vec<WorkItem> {
        let items: Vec<WorkItem> = self.items.lock().drain(..).collect();
        self.enqueued.fetch_sub(items.len(), Ordering::SeqCst);
        QUEUE_DEPTH.with_label_values(&[self.name]).set(0);
        items
    }

    pub(crate) async fn notified(&self) {
        self.wakeup.notified().await
    }

    pub(crate) fn wake(&self) {
        self.wakeup.notify_one();
    }
}

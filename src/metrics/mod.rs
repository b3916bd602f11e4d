use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

use crate::backend::Outcome;


lazy_static! {
    pub static ref OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("docgate_operations_total", "Completed single-document operations"),
        &["operation", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("docgate_queue_rejections_total", "Work rejected by admission control"),
        &["queue", "reason"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("docgate_queue_depth", "Work items currently admitted to a queue"),
        &["queue"]
    )
    .expect("metric can not be created");

    pub static ref OUTSTANDING_OPERATIONS: IntGauge = IntGauge::new(
        "docgate_outstanding_operations",
        "Operations accepted by the backend and not yet answered"
    )
    .expect("metric can not be created");

    pub static ref VISITED_DOCUMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("docgate_visited_documents_total", "Documents and removals delivered by visitor sessions"),
        &["variant"]
    )
    .expect("metric can not be created");

    pub static ref VISIT_SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "docgate_visit_sessions_active",
        "Visitor sessions currently registered"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the gateway collectors with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(OPERATIONS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(QUEUE_REJECTIONS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(QUEUE_DEPTH.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(OUTSTANDING_OPERATIONS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(VISITED_DOCUMENTS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(VISIT_SESSIONS_ACTIVE.clone()))
            .expect("collector can be registered");
    });
}

/// Renders the registry in the prometheus text exposition format.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Metric label for a backend outcome.
///
/// A NOT_FOUND answer to a create-if-missing operation only means the document
/// was created, so it is counted as a success. The response status is not
/// affected by this.
pub(crate) fn outcome_label(
    outcome: Outcome,
    create_if_missing: bool,
) -> &'static str {
    match outcome {
        Outcome::NotFound if create_if_missing => "success",
        Outcome::Success => "success",
        Outcome::NotFound => "not_found",
        Outcome::ConditionFailed => "condition_failed",
        Outcome::Timeout => "timeout",
        Outcome::InsufficientStorage => "insufficient_storage",
        Outcome::Error => "error",
    }
}

pub(crate) fn record_operation(
    operation: &'static str,
    outcome: Outcome,
    create_if_missing: bool,
) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome_label(outcome, create_if_missing)])
        .inc();
}

pub(crate) fn record_rejection(
    queue: &'static str,
    reason: &'static str,
) {
    QUEUE_REJECTIONS_TOTAL.with_label_values(&[queue, reason]).inc();
}

//! Fixed engine constants.

/// Maximum number of queued documents moved to the outgoing channel per flush pass.
pub const FLUSH_BATCH_SIZE: usize = 128;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";
pub(crate) const CONTENT_TYPE_JSONL: &str = "application/jsonl; charset=UTF-8";

/// Queue names, used for logging and metrics labels.
pub(crate) const OPERATION_QUEUE: &str = "operations";
pub(crate) const VISIT_OPERATION_QUEUE: &str = "visit_operations";

pub(crate) const DEFAULT_ERROR_MESSAGE: &str = "Response not committed before close";
pub(crate) const VISITING_FAILED_MESSAGE: &str = "Visiting failed";

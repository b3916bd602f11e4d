//! Response transport boundary.
//!
//! A [`ResponseChannel`] accepts a status commit, byte writes and a close.
//! Writes issued before the commit are buffered by the transport; writes
//! issued after it are sent immediately. Write completions resolve in
//! submission order, on whatever thread the transport uses.

mod memory_channel;
pub use memory_channel::*;

use std::fmt;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::oneshot;

use crate::TransportError;

/// Resolved by the transport once the bytes of one `write` have been handed off.
pub type WriteCompletion = oneshot::Receiver<std::result::Result<(), TransportError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Ok,
    BadRequest,
    NotFound,
    PreconditionFailed,
    TooManyRequests,
    InternalServerError,
    GatewayTimeout,
    InsufficientStorage,
}

impl ResponseStatus {
    pub fn code(&self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::BadRequest => 400,
            ResponseStatus::NotFound => 404,
            ResponseStatus::PreconditionFailed => 412,
            ResponseStatus::TooManyRequests => 429,
            ResponseStatus::InternalServerError => 500,
            ResponseStatus::GatewayTimeout => 504,
            ResponseStatus::InsufficientStorage => 507,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg_attr(test, automock)]
pub trait ResponseChannel: Send + Sync + 'static {
    fn commit(
        &self,
        status: ResponseStatus,
        content_type: &'static str,
        fully_applied: bool,
    ) -> std::result::Result<(), TransportError>;

    fn write(
        &self,
        bytes: Bytes,
    ) -> WriteCompletion;

    fn close(&self);
}

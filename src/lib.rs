//! Data-plane gateway for a distributed document store.
//!
//! Single-document operations pass through an admission-controlled queue
//! before they are issued against an asynchronous [`DocumentSession`]. Bulk
//! requests run a visitor session whose documents are streamed into a
//! [`JsonResponse`], forwarded elsewhere, or mutated through a second queue.
//! The response writer acknowledges visited documents only once their bytes
//! are handed to the transport, which throttles the visitor to the speed of
//! the client.

mod backend;
mod config;
mod constants;
mod core;
mod document;
mod errors;
mod gateway;
pub mod metrics;
mod transport;

pub use backend::mem::*;
pub use backend::*;
pub use self::config::*;
pub use constants::FLUSH_BATCH_SIZE;
pub use self::core::*;
pub use document::*;
pub use errors::*;
pub use gateway::*;
pub use transport::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

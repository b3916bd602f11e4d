//! Streaming response writer.
//!
//! Two renderings share [`JsonResponse`]:
//! - [`ResponseFormat::Buffered`]: one JSON object with an optional
//!   `documents` array, handed to the transport on commit
//! - [`ResponseFormat::Lines`]: one JSON object per line, streamed as
//!   documents are flushed, with inline continuation progress lines

mod flush_state;
mod json_response;
mod render;
pub use flush_state::FlushCounters;
pub(crate) use flush_state::*;
pub use json_response::*;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Buffered,
    Lines,
}

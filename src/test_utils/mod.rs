//! Shared test components for the unit tests of every module.
mod common;
mod scripted_session;
mod scripted_visitor;

pub use common::*;
pub use scripted_session::*;
pub use scripted_visitor::*;

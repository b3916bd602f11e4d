//! Bulk visiting.
//!
//! A bulk request owns one visitor session. The session pushes visited
//! documents to a [`VisitCallback`], which either streams them into the
//! response, mutates them through the visit-operation queue, or (for
//! remote forwarding) never sees them. When the session reports done, its
//! driver renders the terminal status, count and continuation, and only then
//! deregisters and destroys the session.

mod callback;
mod continuation;
mod orchestrator;
mod parameters;
mod session_registry;
mod visit_state;

pub use callback::*;
pub use continuation::*;
pub use orchestrator::*;
pub use parameters::*;
pub use session_registry::*;
pub use visit_state::*;

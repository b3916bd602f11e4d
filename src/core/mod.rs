mod dispatch_loop;
mod dispatch_queue;
mod dispatcher;
mod lifecycle;
mod operation;
mod response;
mod visiting;
mod work_item;

pub use dispatch_loop::*;
pub use dispatch_queue::*;
pub use dispatcher::*;
pub use lifecycle::*;
pub use operation::*;
pub use response::*;
pub use visiting::*;
pub use work_item::*;

#[cfg(test)]
mod dispatch_queue_test;

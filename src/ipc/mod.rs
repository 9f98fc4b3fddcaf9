//! # Inter-Task Messaging
//!
//! Bounded, typed hand-off of values between tasks without shared mutable state:
//!
//! - [`Queue`]: fixed-capacity FIFO, many producers, one consumer.
//! - [`Publisher`] / [`Link`]: broadcast of one value into every linked queue.
//! - [`TaskEventQueue`]: a queue bound to a listener on the consuming task, drained
//!   one item per wakeup.
//!
//! Producers never block on a slow consumer: publishing into a full queue drops that
//! copy for that subscriber only and reports it in the [`PublishOutcome`].

pub mod link;
pub mod queue;
pub mod task_queue;

pub use link::{Link, LinkError, PublishOutcome, Publisher, Sink};
pub use queue::{Queue, QueueError};
pub use task_queue::{EventListener, TaskEventQueue, TaskEventSource, forward_next};

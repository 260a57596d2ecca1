//! Delayed state transitions for the marketplace order engine.
//!
//! Orders move forward on timers as well as on user actions: unpaid orders
//! are auto-cancelled at the payment deadline, shipped orders auto-confirm
//! after a dwell period. This crate provides:
//!
//! - [`Job`] / [`JobId`] / [`JobKind`]: units of delayed work with a
//!   deterministic identity (`<kind>-<order-id>`), so re-scheduling the same
//!   transition collapses to one pending timer instead of creating duplicates
//! - [`JobQueue`]: the durable delayed-queue collaborator contract, with
//!   enqueue-with-delay, removal-before-execution, and at-least-once delivery
//!   with retry/backoff
//! - [`InMemoryJobQueue`]: dev/test implementation of that contract
//! - [`TransitionScheduler`]: the schedule/cancel API used by the engine
//! - [`WorkerPool`]: long-running consumers draining due jobs into a
//!   [`JobHandler`]

pub mod error;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use error::{JobError, QueueError};
pub use job::{Job, JobId, JobKind};
pub use queue::{InMemoryJobQueue, JobQueue, RetryPolicy};
pub use scheduler::TransitionScheduler;
pub use worker::{JobHandler, WorkerPool, WorkerPoolHandle};

//! In-memory fakes for skua's external seams.
//!
//! The dispatcher is written against the [`skua::QueueConsumer`] and
//! [`skua::ComputeScheduler`] traits; this crate supplies substitutes for
//! both so dispatch behavior can be exercised without a real queue or
//! scheduler:
//!
//! - [`InMemoryQueue`] - a source queue backed by a `VecDeque`, with
//!   delete tracking, scripted delete failures, and redelivery.
//! - [`RecordingScheduler`] - a scheduler that captures every submission
//!   and can be scripted to reject selected inputs.

pub mod queue;
pub mod scheduler;

pub use queue::InMemoryQueue;
pub use scheduler::RecordingScheduler;

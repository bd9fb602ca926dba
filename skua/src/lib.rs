//! Skua - queue-driven dispatch of image-analysis jobs to a managed
//! compute scheduler.
//!
//! Records arrive on a durable queue, each carrying one job request or an
//! ordered batch of them. The dispatcher decodes and validates every
//! request, fills omitted fields from process configuration, submits each
//! one to the external scheduler, and acknowledges the record back to the
//! queue only when every derived request produced a job run. Anything less
//! leaves the record to the queue's redelivery and dead-letter policy.
//!
//! # Core Concepts
//!
//! - **Queue Record**: one delivery from the source queue, carrying an
//!   opaque body and an acknowledgement token ([`QueueRecord`]).
//!
//! - **Job Request**: a validated, defaulted description of one compute job
//!   ([`JobRequest`]), extracted from a record body by the codec.
//!
//! - **Submission Outcome**: the per-request result of calling the external
//!   scheduler ([`SubmissionOutcome`]) - a record is deleted only if every
//!   outcome is `Submitted`.
//!
//! - **At-least-once**: the scheduler API has no idempotency token, so a
//!   record left unacknowledged after a partial failure re-submits its
//!   already-successful requests on redelivery. Duplicate job runs are the
//!   accepted cost of never losing work.
//!
//! - **Injected seams**: the queue ([`QueueConsumer`]) and scheduler
//!   ([`ComputeScheduler`]) clients are traits supplied at construction,
//!   substitutable with the fakes in `skua-testkit`.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use skua::*;
//! use std::sync::Arc;
//!
//! let config = DispatcherConfig::from_env()?;
//! let dispatcher = Arc::new(Dispatcher::new(
//!     queue_client,
//!     scheduler_client,
//!     config,
//!     Arc::new(DispatchEventBus::new(1024)),
//! ));
//!
//! let runtime = DispatchRuntime::new(dispatcher, PollerConfig::default());
//! runtime.spawn_pollers(4).await;
//! ```

/// Record body decoding.
///
/// The `codec` module turns a raw record body into job request candidates:
/// - [`decode`](codec::decode) - object or array bodies into candidates
/// - [`JobRequestCandidate`] - one unvalidated element
/// - [`DecodeError`] - record-level rejection
pub mod codec;

/// Process configuration loaded once at startup.
///
/// The `config` module defines [`DispatcherConfig`], its environment keys,
/// and the fatal [`ConfigError`] raised on a partial environment.
pub mod config;

/// In-process dispatch lifecycle events.
///
/// The `events` module provides [`DispatchEventBus`], a broadcast fan-out
/// of [`DispatchEvent`]s with a per-record correlation id in
/// [`EventMeta`].
pub mod events;

/// Source-queue types and the consumer seam.
///
/// The `queue` module defines the [`QueueConsumer`] trait along with
/// [`QueueRecord`] and [`ReceiptToken`].
pub mod queue;

/// Job request validation and enrichment.
///
/// The `request` module defines [`JobRequest`], its
/// [`validate`](JobRequest::validate) constructor, and
/// [`ValidationError`].
pub mod request;

/// The dispatch loop and polling runtime.
///
/// The `runtime` module provides:
/// - [`Dispatcher`] - per-record decode, submit, acknowledge
/// - [`RecordOutcome`], [`RecordDisposition`], [`RedeliveryCause`],
///   [`BatchReport`] - dispatch results
/// - [`DispatchRuntime`], [`PollerConfig`], [`ShutdownToken`] - the
///   always-on polling service
pub mod runtime;

/// Compute-scheduler submission types and the scheduler seam.
///
/// The `submit` module defines the [`ComputeScheduler`] trait, the wire
/// types of a submission ([`JobSubmission`], [`EnvVar`],
/// [`ResourceRequirement`], [`RetryStrategy`]), the [`JobSubmitter`], and
/// [`SubmissionOutcome`].
pub mod submit;

/// Tracing spans and metric recording helpers.
pub mod telemetry;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

pub use codec::*;
pub use config::*;
pub use events::*;
pub use queue::*;
pub use request::*;
pub use runtime::*;
pub use submit::*;

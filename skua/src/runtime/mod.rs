/// The dispatch loop: per-record decode, submit, and acknowledgement.
pub mod dispatcher;
/// Polling runtime and graceful shutdown.
pub mod poller;

pub use dispatcher::{
    BatchReport, Dispatcher, RecordDisposition, RecordOutcome, RedeliveryCause,
};
pub use poller::{DispatchRuntime, PollerConfig, ShutdownToken};

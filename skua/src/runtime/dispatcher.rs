use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::codec;
use crate::config::DispatcherConfig;
use crate::events::{
    DispatchEvent, DispatchEventBus, DispatchEventPayload, EventMeta,
};
use crate::queue::{QueueConsumer, QueueRecord};
use crate::request::JobRequest;
use crate::submit::{
    ComputeScheduler, FailureReason, JobSubmitter, SubmissionOutcome,
};
use crate::telemetry;

/// Why a record was left on the queue instead of being acknowledged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RedeliveryCause {
    /// The body could not be decoded; redelivery will not fix it, and the
    /// queue's max-receive-count policy eventually quarantines the record.
    MalformedBody,
    /// At least one candidate failed validation or submission.
    FailedCandidates,
    /// Every candidate was submitted but the delete call failed; the next
    /// delivery re-submits all of them.
    AckFailure,
}

impl RedeliveryCause {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedBody => "malformed_body",
            Self::FailedCandidates => "failed_candidates",
            Self::AckFailure => "ack_failure",
        }
    }
}

/// Terminal state of one record after a dispatch pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordDisposition {
    /// Every candidate was submitted and the record was deleted.
    Acked,
    /// The record stays on the queue; its visibility timeout governs when
    /// it is delivered again.
    LeftForRedelivery {
        /// Why acknowledgement was withheld.
        cause: RedeliveryCause,
    },
}

impl RecordDisposition {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::LeftForRedelivery { cause } => cause.as_str(),
        }
    }
}

/// Everything the dispatch loop learned about one record.
///
/// Outcomes are indexed by the candidate's original position in the record
/// body, so observability survives any future reordering of the work.
#[derive(Clone, Debug)]
pub struct RecordOutcome {
    /// Queue-assigned identifier of the record.
    pub message_id: String,
    /// How the record was resolved.
    pub disposition: RecordDisposition,
    /// Per-candidate outcomes in body order; empty when decoding failed.
    pub outcomes: Vec<SubmissionOutcome>,
}

impl RecordOutcome {
    /// Whether the record was acknowledged.
    pub fn is_acked(&self) -> bool {
        self.disposition == RecordDisposition::Acked
    }
}

/// Aggregate result of dispatching one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-record outcomes in batch order.
    pub records: Vec<RecordOutcome>,
}

impl BatchReport {
    /// Number of records acknowledged.
    pub fn acked(&self) -> usize {
        self.records.iter().filter(|r| r.is_acked()).count()
    }

    /// Number of records left for redelivery.
    pub fn left_for_redelivery(&self) -> usize {
        self.records.len() - self.acked()
    }

    /// Number of job runs created across the batch.
    pub fn jobs_submitted(&self) -> usize {
        self.records
            .iter()
            .flat_map(|r| &r.outcomes)
            .filter(|o| o.is_submitted())
            .count()
    }
}

/// The dispatch loop: consumes queue records and turns them into compute
/// job runs.
///
/// Per record the loop runs decode, then validate and submit for each
/// candidate in order, then decides acknowledgement: the record is deleted
/// only when every candidate reached `Submitted`. Any failure leaves the
/// whole record to the queue's redelivery machinery, which means candidates
/// that already produced a job run will produce another one on the next
/// delivery. That at-least-once contract is deliberate: duplicate job runs
/// are a cheaper failure mode than lost work, and the scheduler API offers
/// no idempotency token to do better.
///
/// The queue and scheduler clients are injected so tests can substitute
/// fakes.
pub struct Dispatcher<Q, S> {
    queue: Arc<Q>,
    submitter: JobSubmitter<S>,
    events: Arc<DispatchEventBus>,
}

impl<Q, S> Dispatcher<Q, S>
where
    Q: QueueConsumer + 'static,
    S: ComputeScheduler + 'static,
{
    /// Create a dispatcher over the injected queue and scheduler clients.
    pub fn new(
        queue: Arc<Q>,
        scheduler: Arc<S>,
        config: DispatcherConfig,
        events: Arc<DispatchEventBus>,
    ) -> Self {
        Self {
            queue,
            submitter: JobSubmitter::new(scheduler, config),
            events,
        }
    }

    /// Get a clone of the queue client.
    pub fn queue(&self) -> Arc<Q> {
        Arc::clone(&self.queue)
    }

    /// The process configuration this dispatcher runs with.
    pub fn config(&self) -> &DispatcherConfig {
        self.submitter.config()
    }

    /// Get a clone of the event bus.
    pub fn events(&self) -> Arc<DispatchEventBus> {
        Arc::clone(&self.events)
    }

    /// Dispatch one batch of records.
    ///
    /// Records are independent units: one record's failure never affects
    /// another record's disposition.
    pub async fn dispatch_batch(&self, records: Vec<QueueRecord>) -> BatchReport {
        let mut report = BatchReport::default();
        for record in &records {
            report.records.push(self.dispatch_record(record).await);
        }
        tracing::debug!(
            records = report.records.len(),
            acked = report.acked(),
            left = report.left_for_redelivery(),
            jobs = report.jobs_submitted(),
            "batch dispatched"
        );
        report
    }

    /// Run one record through decode, per-candidate submit, and the ack
    /// decision.
    pub async fn dispatch_record(&self, record: &QueueRecord) -> RecordOutcome {
        let correlation_id = Uuid::now_v7();
        let span = telemetry::record_dispatch_span(&record.message_id);
        self.process_record(record, correlation_id)
            .instrument(span)
            .await
    }

    async fn process_record(
        &self,
        record: &QueueRecord,
        correlation_id: Uuid,
    ) -> RecordOutcome {
        let started = Instant::now();
        telemetry::record_record_received(&record.message_id, record.receive_count);
        self.publish(
            record,
            correlation_id,
            DispatchEventPayload::RecordReceived {
                receive_count: record.receive_count,
            },
        );

        let candidates = match codec::decode(record.body.as_bytes()) {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(
                    message_id = %record.message_id,
                    receive_count = record.receive_count,
                    error = %err,
                    "record body rejected, leaving for dead-letter policy"
                );
                self.publish(
                    record,
                    correlation_id,
                    DispatchEventPayload::RecordRejected {
                        error: err.to_string(),
                    },
                );
                return self.resolve(
                    record,
                    correlation_id,
                    Vec::new(),
                    RecordDisposition::LeftForRedelivery {
                        cause: RedeliveryCause::MalformedBody,
                    },
                    started,
                );
            }
        };

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (position, candidate) in candidates.iter().enumerate() {
            let outcome =
                match JobRequest::validate(candidate, self.submitter.config()) {
                    Ok(request) => self.submitter.submit(&request).await,
                    Err(err) => SubmissionOutcome::Failed {
                        reason: FailureReason::Validation(err),
                    },
                };

            match &outcome {
                SubmissionOutcome::Submitted { run_id } => {
                    self.publish(
                        record,
                        correlation_id,
                        DispatchEventPayload::JobSubmitted {
                            position,
                            run_id: run_id.clone(),
                        },
                    );
                }
                SubmissionOutcome::Failed { reason } => {
                    let stage = match reason {
                        FailureReason::Validation(_) => "validation",
                        FailureReason::Submission(_) => "submission",
                    };
                    tracing::warn!(
                        message_id = %record.message_id,
                        position,
                        stage,
                        reason = %reason,
                        "job request failed"
                    );
                    telemetry::record_candidate_failed(stage);
                    self.publish(
                        record,
                        correlation_id,
                        DispatchEventPayload::CandidateFailed {
                            position,
                            reason: reason.to_string(),
                        },
                    );
                }
            }
            outcomes.push(outcome);
        }

        // An empty body ([]) derives no candidates and counts as vacuous
        // success: nothing to submit, nothing to keep on the queue.
        let disposition = if outcomes.iter().all(SubmissionOutcome::is_submitted)
        {
            self.acknowledge(record, correlation_id, outcomes.len()).await
        } else {
            let failed =
                outcomes.iter().filter(|o| !o.is_submitted()).count();
            tracing::warn!(
                message_id = %record.message_id,
                failed,
                total = outcomes.len(),
                "record left for redelivery"
            );
            RecordDisposition::LeftForRedelivery {
                cause: RedeliveryCause::FailedCandidates,
            }
        };

        self.resolve(record, correlation_id, outcomes, disposition, started)
    }

    async fn acknowledge(
        &self,
        record: &QueueRecord,
        correlation_id: Uuid,
        submitted: usize,
    ) -> RecordDisposition {
        let span = telemetry::ack_span(&record.message_id);
        match self
            .queue
            .delete_record(&record.receipt)
            .instrument(span)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    message_id = %record.message_id,
                    submitted,
                    "record acknowledged"
                );
                self.publish(
                    record,
                    correlation_id,
                    DispatchEventPayload::RecordAcked { submitted },
                );
                RecordDisposition::Acked
            }
            Err(err) => {
                // The job runs already exist; the next delivery of this
                // record submits them again.
                tracing::error!(
                    message_id = %record.message_id,
                    error = %format!("{:#}", err),
                    "delete failed after successful submission"
                );
                RecordDisposition::LeftForRedelivery {
                    cause: RedeliveryCause::AckFailure,
                }
            }
        }
    }

    fn resolve(
        &self,
        record: &QueueRecord,
        correlation_id: Uuid,
        outcomes: Vec<SubmissionOutcome>,
        disposition: RecordDisposition,
        started: Instant,
    ) -> RecordOutcome {
        if let RecordDisposition::LeftForRedelivery { cause } = &disposition {
            self.publish(
                record,
                correlation_id,
                DispatchEventPayload::RecordLeftForRedelivery { cause: *cause },
            );
        }
        telemetry::record_record_resolved(
            disposition.as_str(),
            started.elapsed().as_secs_f64(),
        );

        RecordOutcome {
            message_id: record.message_id.clone(),
            disposition,
            outcomes,
        }
    }

    fn publish(
        &self,
        record: &QueueRecord,
        correlation_id: Uuid,
        payload: DispatchEventPayload,
    ) {
        self.events.publish(DispatchEvent {
            meta: EventMeta::new(&record.message_id, correlation_id),
            payload,
        });
    }
}

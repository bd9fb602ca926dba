//! End-to-end dispatch tests.
//!
//! Drives the dispatcher through the in-memory queue and recording
//! scheduler fakes, covering single and batched bodies, validation and
//! submission failures, acknowledgement failures, batch isolation, event
//! ordering, and the polling runtime.

use std::sync::Arc;
use std::time::Duration;

use skua::runtime::{
    DispatchRuntime, Dispatcher, PollerConfig, RecordDisposition,
    RedeliveryCause,
};
use skua::{
    DispatchEventBus, DispatchEventPayload, DispatcherConfig, FailureReason,
    ResourceKind, SubmissionOutcome, ValidationError,
};
use skua_testkit::{InMemoryQueue, RecordingScheduler};
use tokio::time::timeout;

fn config() -> DispatcherConfig {
    DispatcherConfig {
        job_name_prefix: "cellpaint".into(),
        default_job_definition: "analysis-job-def".into(),
        default_job_queue: "analysis-queue".into(),
        retry_attempts: 3,
        default_job_memory_mib: 4096,
        default_job_vcpus: 4,
        output_bucket: "results-bucket".into(),
        queue_url: "https://queue.example/jobs".into(),
    }
}

fn dispatcher(
    queue: &InMemoryQueue,
    scheduler: &RecordingScheduler,
) -> Dispatcher<InMemoryQueue, RecordingScheduler> {
    Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(scheduler.clone()),
        config(),
        Arc::new(DispatchEventBus::new(256)),
    )
}

#[tokio::test]
async fn test_single_object_record_submits_and_acks() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(
        r#"{"pipeline":"p.cppipe","input":"s3://b/in","output":"s3://b/out"}"#,
    );
    let outcome = dispatcher.dispatch_record(&record).await;

    assert_eq!(outcome.disposition, RecordDisposition::Acked);
    assert_eq!(outcome.outcomes.len(), 1);
    assert!(outcome.outcomes[0].is_submitted());
    assert!(queue.is_deleted(&record));

    scheduler.assert_submission_count_eq(1);
    let submission = &scheduler.submissions()[0];
    assert_eq!(submission.env_value("INPUT"), Some("s3://b/in"));
    assert_eq!(submission.env_value("OUTPUT"), Some("s3://b/out"));
    assert_eq!(submission.env_value("PIPELINE"), Some("p.cppipe"));
}

#[tokio::test]
async fn test_array_record_submits_all_in_order_and_acks() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(
        r#"[{"pipeline":"p","input":"i1","output":"o1"},
            {"pipeline":"p","input":"i2","output":"o2"}]"#,
    );
    let outcome = dispatcher.dispatch_record(&record).await;

    assert_eq!(outcome.disposition, RecordDisposition::Acked);
    assert!(queue.is_deleted(&record));

    let submissions = scheduler.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].env_value("INPUT"), Some("i1"));
    assert_eq!(submissions[1].env_value("INPUT"), Some("i2"));
}

#[tokio::test]
async fn test_missing_pipeline_leaves_record() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(r#"{"input":"i","output":"o"}"#);
    let outcome = dispatcher.dispatch_record(&record).await;

    assert_eq!(
        outcome.disposition,
        RecordDisposition::LeftForRedelivery {
            cause: RedeliveryCause::FailedCandidates
        }
    );
    assert_eq!(
        outcome.outcomes[0],
        SubmissionOutcome::Failed {
            reason: FailureReason::Validation(ValidationError::MissingField(
                "pipeline"
            ))
        }
    );
    assert!(!queue.is_deleted(&record));
    scheduler.assert_submission_count_eq(0);
}

#[tokio::test]
async fn test_malformed_record_never_reaches_scheduler() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body("not-json{");
    let outcome = dispatcher.dispatch_record(&record).await;

    assert_eq!(
        outcome.disposition,
        RecordDisposition::LeftForRedelivery {
            cause: RedeliveryCause::MalformedBody
        }
    );
    assert!(outcome.outcomes.is_empty());
    assert!(!queue.is_deleted(&record));
    scheduler.assert_submission_count_eq(0);
}

#[tokio::test]
async fn test_partial_failure_keeps_whole_record() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    scheduler.fail_input("i2", "capacity exceeded");
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(
        r#"[{"pipeline":"p","input":"i1","output":"o1"},
            {"pipeline":"p","input":"i2","output":"o2"}]"#,
    );
    let outcome = dispatcher.dispatch_record(&record).await;

    // Both candidates were attempted; the second failure withholds the ack
    // for the whole record even though the first already created a job run.
    scheduler.assert_submission_count_eq(2);
    assert!(outcome.outcomes[0].is_submitted());
    assert!(matches!(
        &outcome.outcomes[1],
        SubmissionOutcome::Failed {
            reason: FailureReason::Submission(reason)
        } if reason.contains("capacity exceeded")
    ));
    assert_eq!(
        outcome.disposition,
        RecordDisposition::LeftForRedelivery {
            cause: RedeliveryCause::FailedCandidates
        }
    );
    assert!(!queue.is_deleted(&record));
}

#[tokio::test]
async fn test_invalid_sibling_does_not_block_others() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(
        r#"[{"pipeline":"p","output":"o1"},
            {"pipeline":"p","input":"i2","output":"o2"}]"#,
    );
    let outcome = dispatcher.dispatch_record(&record).await;

    // The second candidate is still submitted despite the first failing
    // validation.
    scheduler.assert_submission_count_eq(1);
    assert_eq!(scheduler.submissions()[0].env_value("INPUT"), Some("i2"));
    assert!(matches!(
        &outcome.outcomes[0],
        SubmissionOutcome::Failed {
            reason: FailureReason::Validation(ValidationError::MissingField(
                "input"
            ))
        }
    ));
    assert!(outcome.outcomes[1].is_submitted());
    assert!(!queue.is_deleted(&record));
}

#[tokio::test]
async fn test_defaults_and_overrides_forwarded_to_scheduler() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let record = queue.push_body(
        r#"[{"pipeline":"p","input":"i1","output":"o1"},
            {"pipeline":"p","input":"i2","output":"o2",
             "job_definition":"big-job-def","job_queue":"spot-queue",
             "job_memory":16384,"job_vcpu":8}]"#,
    );
    dispatcher.dispatch_record(&record).await;

    let submissions = scheduler.submissions();

    let defaulted = &submissions[0];
    assert_eq!(defaulted.job_definition, "analysis-job-def");
    assert_eq!(defaulted.job_queue, "analysis-queue");
    assert_eq!(defaulted.resource_requirements[0].kind, ResourceKind::Memory);
    assert_eq!(defaulted.resource_requirements[0].value, "4096");
    assert_eq!(defaulted.resource_requirements[1].kind, ResourceKind::Vcpu);
    assert_eq!(defaulted.resource_requirements[1].value, "4");
    assert_eq!(defaulted.retry_strategy.attempts, 3);
    assert!(defaulted.job_name.starts_with("cellpaint-"));

    let overridden = &submissions[1];
    assert_eq!(overridden.job_definition, "big-job-def");
    assert_eq!(overridden.job_queue, "spot-queue");
    assert_eq!(overridden.resource_requirements[0].value, "16384");
    assert_eq!(overridden.resource_requirements[1].value, "8");
}

#[tokio::test]
async fn test_ack_failure_leaves_record() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    queue.fail_next_deletes(1);
    let record =
        queue.push_body(r#"{"pipeline":"p","input":"i","output":"o"}"#);
    let outcome = dispatcher.dispatch_record(&record).await;

    // The job run exists but the record could not be acknowledged.
    scheduler.assert_submission_count_eq(1);
    assert_eq!(
        outcome.disposition,
        RecordDisposition::LeftForRedelivery {
            cause: RedeliveryCause::AckFailure
        }
    );
    assert!(!queue.is_deleted(&record));
}

#[tokio::test]
async fn test_batch_records_are_isolated() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);

    let bad = queue.push_body("not-json{");
    let good =
        queue.push_body(r#"{"pipeline":"p","input":"i","output":"o"}"#);

    let records = vec![bad.clone(), good.clone()];
    let report = dispatcher.dispatch_batch(records).await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.acked(), 1);
    assert_eq!(report.left_for_redelivery(), 1);
    assert_eq!(report.jobs_submitted(), 1);
    assert!(!queue.is_deleted(&bad));
    assert!(queue.is_deleted(&good));
}

#[tokio::test]
async fn test_events_follow_record_lifecycle() {
    let queue = InMemoryQueue::default();
    let scheduler = RecordingScheduler::new();
    let dispatcher = dispatcher(&queue, &scheduler);
    let mut events = dispatcher.events().subscribe();

    let record =
        queue.push_body(r#"{"pipeline":"p","input":"i","output":"o"}"#);
    dispatcher.dispatch_record(&record).await;

    let received = timeout(Duration::from_millis(500), events.recv())
        .await
        .unwrap()
        .unwrap();
    let submitted = timeout(Duration::from_millis(500), events.recv())
        .await
        .unwrap()
        .unwrap();
    let acked = timeout(Duration::from_millis(500), events.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        received.payload,
        DispatchEventPayload::RecordReceived { receive_count: 1 }
    ));
    assert!(matches!(
        submitted.payload,
        DispatchEventPayload::JobSubmitted { position: 0, .. }
    ));
    assert!(matches!(
        acked.payload,
        DispatchEventPayload::RecordAcked { submitted: 1 }
    ));

    // One correlation id stitches the whole record lifecycle together.
    assert_eq!(received.meta.message_id, record.message_id);
    assert_eq!(
        received.meta.correlation_id,
        submitted.meta.correlation_id
    );
    assert_eq!(submitted.meta.correlation_id, acked.meta.correlation_id);
}

#[tokio::test]
async fn test_pollers_drain_queue_and_shut_down() {
    let queue = InMemoryQueue::new(2);
    let scheduler = RecordingScheduler::new();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(scheduler.clone()),
        config(),
        Arc::new(DispatchEventBus::new(256)),
    ));

    for i in 0..3 {
        queue.push_body(format!(
            r#"{{"pipeline":"p","input":"i{}","output":"o{}"}}"#,
            i, i
        ));
    }

    let runtime = DispatchRuntime::new(
        dispatcher,
        PollerConfig::default()
            .with_idle_backoff(10)
            .with_shutdown_grace(5),
    );
    runtime.spawn_pollers(2).await;

    timeout(Duration::from_secs(5), async {
        loop {
            if scheduler.submission_count() == 3 && queue.deleted().len() == 3
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pollers did not drain the queue within 5 seconds");

    timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("shutdown did not complete within 5 seconds")
        .expect("shutdown returned error");
}

//! Basic dispatch example with in-memory fakes.
//!
//! Demonstrates wiring a dispatcher and polling runtime against
//! skua-testkit's InMemoryQueue and RecordingScheduler, including a record
//! that fails submission and is left unacknowledged.

use std::sync::Arc;
use std::time::Duration;

use skua::runtime::{DispatchRuntime, Dispatcher, PollerConfig};
use skua::{DispatchEventBus, DispatcherConfig};
use skua_testkit::{InMemoryQueue, RecordingScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = DispatcherConfig {
        job_name_prefix: "cellpaint".into(),
        default_job_definition: "analysis-job-def".into(),
        default_job_queue: "analysis-queue".into(),
        retry_attempts: 3,
        default_job_memory_mib: 4096,
        default_job_vcpus: 4,
        output_bucket: "results-bucket".into(),
        queue_url: "https://queue.example/jobs".into(),
    };

    let queue = InMemoryQueue::new(5);
    let scheduler = RecordingScheduler::new();
    scheduler.fail_input("s3://bucket/plate-3", "scheduler unavailable");

    // A single request, a batched fan-out, and a request scripted to fail.
    queue.push_body(
        r#"{"pipeline":"illum.cppipe","input":"s3://bucket/plate-1","output":"s3://bucket/out-1"}"#,
    );
    queue.push_body(
        r#"[{"pipeline":"analysis.cppipe","input":"s3://bucket/plate-2a","output":"s3://bucket/out-2a"},
            {"pipeline":"analysis.cppipe","input":"s3://bucket/plate-2b","output":"s3://bucket/out-2b"}]"#,
    );
    queue.push_body(
        r#"{"pipeline":"analysis.cppipe","input":"s3://bucket/plate-3","output":"s3://bucket/out-3"}"#,
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(scheduler.clone()),
        config,
        Arc::new(DispatchEventBus::new(256)),
    ));

    let runtime = DispatchRuntime::new(
        dispatcher,
        PollerConfig::default().with_idle_backoff(50),
    );
    runtime.spawn_pollers(2).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    runtime.shutdown().await?;

    println!(
        "submissions seen by scheduler: {}",
        scheduler.submission_count()
    );
    println!("records acknowledged: {}", queue.deleted().len());

    Ok(())
}

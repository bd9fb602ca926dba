use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::request::{JobRequest, ValidationError};
use crate::telemetry;

/// Identifier assigned by the compute scheduler to a created job run.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobRunId(String);

impl JobRunId {
    /// Wrap a scheduler-assigned run identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One environment variable passed into the job container.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Resource dimension understood by the scheduler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Memory in MiB.
    Memory,
    /// vCPU count.
    Vcpu,
}

impl ResourceKind {
    /// Wire name of the resource dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "MEMORY",
            Self::Vcpu => "VCPU",
        }
    }
}

/// One resource requirement attached to a submission.
///
/// Values are carried as strings, matching the scheduler's wire format.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub kind: ResourceKind,
    pub value: String,
}

/// Scheduler-native retry policy for the submitted job run.
///
/// Applies to execution failures of the job itself; the submission call is
/// never retried by this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Number of attempts the scheduler gives the job run.
    pub attempts: u32,
}

/// A fully-built compute job submission.
///
/// Mirrors the scheduler's job-submission API: a name, the job
/// definition/queue to run under, container environment overrides, resource
/// requirements, and the retry strategy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_name: String,
    pub job_definition: String,
    pub job_queue: String,
    pub environment: Vec<EnvVar>,
    pub resource_requirements: Vec<ResourceRequirement>,
    pub retry_strategy: RetryStrategy,
}

impl JobSubmission {
    /// Look up an environment override by name.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }
}

/// Trait for the external compute-scheduler client.
///
/// Submitting a job is the one point of external state mutation in the
/// dispatch path. The API offers no client-supplied idempotency token, so
/// implementations must not retry internally; redelivery of the
/// unacknowledged record is the retry path.
#[async_trait]
pub trait ComputeScheduler: Send + Sync {
    /// Create a job run from a submission, returning its scheduler-assigned
    /// identifier.
    async fn submit_job(
        &self,
        submission: JobSubmission,
    ) -> anyhow::Result<JobRunId>;
}

/// Why a candidate failed to produce a job run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The candidate never reached the scheduler.
    Validation(ValidationError),
    /// The scheduler rejected the submission or could not be reached.
    /// Transient and permanent causes are deliberately not distinguished.
    Submission(String),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation: {}", err),
            Self::Submission(reason) => write!(f, "submission: {}", reason),
        }
    }
}

/// Per-candidate result of the submit stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// A job run was created.
    Submitted {
        /// Scheduler-assigned run identifier.
        run_id: JobRunId,
    },
    /// No job run was created for this candidate.
    Failed {
        /// What went wrong.
        reason: FailureReason,
    },
}

impl SubmissionOutcome {
    /// Whether this candidate reached the scheduler successfully.
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

/// Builds submissions from validated requests and performs the scheduler
/// call.
///
/// The submitter holds the injected scheduler client plus the process
/// configuration it draws the job-name prefix and retry-attempt count from.
pub struct JobSubmitter<S> {
    scheduler: Arc<S>,
    config: DispatcherConfig,
}

impl<S: ComputeScheduler> JobSubmitter<S> {
    /// Create a submitter over the given scheduler client.
    pub fn new(scheduler: Arc<S>, config: DispatcherConfig) -> Self {
        Self { scheduler, config }
    }

    /// The configuration this submitter was built with.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Build the scheduler submission for a validated request.
    ///
    /// Pure except for the generated job-name suffix. The request's
    /// `pipeline`, `input`, and `output` become job-visible environment
    /// overrides; memory and vCPUs become resource requirements in the
    /// scheduler's string wire format.
    pub fn build_submission(&self, request: &JobRequest) -> JobSubmission {
        JobSubmission {
            job_name: format!("{}-{}", self.config.job_name_prefix, Uuid::now_v7()),
            job_definition: request.job_definition.clone(),
            job_queue: request.job_queue.clone(),
            environment: vec![
                EnvVar::new("INPUT", &request.input),
                EnvVar::new("OUTPUT", &request.output),
                EnvVar::new("PIPELINE", &request.pipeline),
            ],
            resource_requirements: vec![
                ResourceRequirement {
                    kind: ResourceKind::Memory,
                    value: request.job_memory_mib.to_string(),
                },
                ResourceRequirement {
                    kind: ResourceKind::Vcpu,
                    value: request.job_vcpus.to_string(),
                },
            ],
            retry_strategy: RetryStrategy {
                attempts: self.config.retry_attempts,
            },
        }
    }

    /// Submit one request to the scheduler.
    ///
    /// Exactly one `submit_job` call is made; any error becomes a `Failed`
    /// outcome immediately rather than being retried here.
    pub async fn submit(&self, request: &JobRequest) -> SubmissionOutcome {
        let submission = self.build_submission(request);
        let job_name = submission.job_name.clone();
        let job_queue = submission.job_queue.clone();
        let span = telemetry::submit_span(&job_name, &job_queue);

        match self.scheduler.submit_job(submission).instrument(span).await {
            Ok(run_id) => {
                tracing::info!(
                    job_name = %job_name,
                    job_queue = %job_queue,
                    run_id = %run_id,
                    "job run created"
                );
                telemetry::record_job_submitted(&job_queue);
                SubmissionOutcome::Submitted { run_id }
            }
            Err(err) => SubmissionOutcome::Failed {
                reason: FailureReason::Submission(format!("{:#}", err)),
            },
        }
    }
}

use async_trait::async_trait;
use parking_lot::Mutex;
use skua::{ComputeScheduler, JobRunId, JobSubmission};
use std::collections::HashMap;
use std::sync::Arc;

/// Compute scheduler fake that records every submission it receives.
///
/// Run identifiers are assigned sequentially (`run-1`, `run-2`, ...).
/// Failures are scripted per input: a submission whose `INPUT` environment
/// override matches a marked value is rejected with the scripted reason,
/// which lets tests fail one candidate of a multi-candidate record
/// deterministically.
#[derive(Clone)]
pub struct RecordingScheduler {
    submissions: Arc<Mutex<Vec<JobSubmission>>>,
    failing_inputs: Arc<Mutex<HashMap<String, String>>>,
    next_run: Arc<Mutex<u64>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self {
            submissions: Arc::new(Mutex::new(Vec::new())),
            failing_inputs: Arc::new(Mutex::new(HashMap::new())),
            next_run: Arc::new(Mutex::new(1)),
        }
    }

    /// Reject submissions whose `INPUT` override equals `input`.
    pub fn fail_input(&self, input: impl Into<String>, reason: impl Into<String>) {
        self.failing_inputs
            .lock()
            .insert(input.into(), reason.into());
    }

    /// Stop rejecting the given input.
    pub fn clear_failure(&self, input: &str) {
        self.failing_inputs.lock().remove(input);
    }

    /// Every accepted or rejected submission is recorded; rejected ones
    /// too, since the scheduler saw them.
    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.lock().clone()
    }

    /// Number of submissions the scheduler has seen.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Assert how many submissions the scheduler has seen.
    pub fn assert_submission_count_eq(&self, expected: usize) {
        let actual = self.submissions.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} submissions, got {}",
            expected, actual
        );
    }
}

impl Default for RecordingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeScheduler for RecordingScheduler {
    async fn submit_job(
        &self,
        submission: JobSubmission,
    ) -> anyhow::Result<JobRunId> {
        let input = submission.env_value("INPUT").map(str::to_owned);
        self.submissions.lock().push(submission);

        if let Some(input) = input {
            if let Some(reason) = self.failing_inputs.lock().get(&input) {
                anyhow::bail!("{}", reason);
            }
        }

        let run = {
            let mut next = self.next_run.lock();
            let run = *next;
            *next += 1;
            run
        };
        Ok(JobRunId::new(format!("run-{}", run)))
    }
}

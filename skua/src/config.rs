use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment key for the compute job name prefix.
pub const ENV_JOB_NAME_PREFIX: &str = "JOB_NAME_PREFIX";
/// Environment key for the default job definition identifier.
pub const ENV_JOB_DEFINITION: &str = "JOB_DEFINITION";
/// Environment key for the default job queue identifier.
pub const ENV_JOB_QUEUE: &str = "JOB_QUEUE";
/// Environment key for the scheduler-side retry attempt count.
pub const ENV_JOB_ATTEMPTS: &str = "JOB_ATTEMPTS";
/// Environment key for the default job memory in MiB.
pub const ENV_JOB_MEMORY_MIB: &str = "JOB_MEMORY_MIB";
/// Environment key for the default job vCPU count.
pub const ENV_JOB_VCPUS: &str = "JOB_VCPUS";
/// Environment key for the output bucket identifier.
pub const ENV_OUTPUT_BUCKET: &str = "OUTPUT_BUCKET";
/// Environment key for the source queue URL.
pub const ENV_QUEUE_URL: &str = "QUEUE_URL";

const REQUIRED_KEYS: [&str; 8] = [
    ENV_JOB_NAME_PREFIX,
    ENV_JOB_DEFINITION,
    ENV_JOB_QUEUE,
    ENV_JOB_ATTEMPTS,
    ENV_JOB_MEMORY_MIB,
    ENV_JOB_VCPUS,
    ENV_OUTPUT_BUCKET,
    ENV_QUEUE_URL,
];

/// Error raised when the process configuration cannot be assembled.
///
/// Configuration failures are fatal: the process refuses to run with a
/// partial configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required environment variables are not set. All missing
    /// keys are collected before failing so a single run reports the full
    /// set.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    /// A variable is set but its value cannot be parsed.
    #[error("environment variable {key} has invalid value {value:?}: {detail}")]
    InvalidValue {
        /// The offending environment key.
        key: &'static str,
        /// The raw value as found in the environment.
        value: String,
        /// Parse failure detail.
        detail: String,
    },
}

/// Immutable process configuration, loaded once at startup.
///
/// Carries the defaults substituted into job requests that omit optional
/// fields, the scheduler-side retry policy, and the identifiers of the
/// external collaborators. Read-only for the lifetime of the process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Prefix for generated compute job names.
    pub job_name_prefix: String,
    /// Job definition used when a request names none.
    pub default_job_definition: String,
    /// Job queue used when a request names none.
    pub default_job_queue: String,
    /// Retry attempts attached to each submission; applies to execution
    /// failures of the submitted job, not to the submission call.
    pub retry_attempts: u32,
    /// Memory in MiB used when a request names none.
    pub default_job_memory_mib: u64,
    /// vCPU count used when a request names none.
    pub default_job_vcpus: u32,
    /// Bucket expected to hold pipeline outputs. Validated at startup;
    /// not consumed by the dispatch path itself.
    pub output_bucket: String,
    /// URL of the source queue records are received from.
    pub queue_url: String,
}

impl DispatcherConfig {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKeys`] naming every absent variable,
    /// or [`ConfigError::InvalidValue`] for the first unparsable one.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests supply a closure over a map instead
    /// of mutating the process environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| lookup(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }

        let get = |key: &str| lookup(key).unwrap_or_default();

        Ok(Self {
            job_name_prefix: get(ENV_JOB_NAME_PREFIX),
            default_job_definition: get(ENV_JOB_DEFINITION),
            default_job_queue: get(ENV_JOB_QUEUE),
            retry_attempts: parse_number(ENV_JOB_ATTEMPTS, get(ENV_JOB_ATTEMPTS))?,
            default_job_memory_mib: parse_number(
                ENV_JOB_MEMORY_MIB,
                get(ENV_JOB_MEMORY_MIB),
            )?,
            default_job_vcpus: parse_number(ENV_JOB_VCPUS, get(ENV_JOB_VCPUS))?,
            output_bucket: get(ENV_OUTPUT_BUCKET),
            queue_url: get(ENV_QUEUE_URL),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: String,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key,
            value,
            detail: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_JOB_NAME_PREFIX, "cellpaint"),
            (ENV_JOB_DEFINITION, "analysis-job-def"),
            (ENV_JOB_QUEUE, "analysis-queue"),
            (ENV_JOB_ATTEMPTS, "3"),
            (ENV_JOB_MEMORY_MIB, "4096"),
            (ENV_JOB_VCPUS, "4"),
            (ENV_OUTPUT_BUCKET, "results-bucket"),
            (ENV_QUEUE_URL, "https://queue.example/jobs"),
        ])
    }

    fn lookup<'a>(env: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| env.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_complete_environment_loads() {
        let env = full_env();
        let config = DispatcherConfig::from_lookup(lookup(&env)).unwrap();

        assert_eq!(config.job_name_prefix, "cellpaint");
        assert_eq!(config.default_job_definition, "analysis-job-def");
        assert_eq!(config.default_job_queue, "analysis-queue");
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.default_job_memory_mib, 4096);
        assert_eq!(config.default_job_vcpus, 4);
        assert_eq!(config.output_bucket, "results-bucket");
        assert_eq!(config.queue_url, "https://queue.example/jobs");
    }

    #[test]
    fn test_all_missing_keys_reported_together() {
        let mut env = full_env();
        env.remove(ENV_JOB_QUEUE);
        env.remove(ENV_QUEUE_URL);

        let err = DispatcherConfig::from_lookup(lookup(&env)).unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => {
                assert_eq!(keys.len(), 2);
                assert!(keys.contains(&ENV_JOB_QUEUE.to_string()));
                assert!(keys.contains(&ENV_QUEUE_URL.to_string()));
            }
            other => panic!("expected MissingKeys, got {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_number_rejected() {
        let mut env = full_env();
        env.insert(ENV_JOB_ATTEMPTS, "lots");

        let err = DispatcherConfig::from_lookup(lookup(&env)).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, ENV_JOB_ATTEMPTS);
                assert_eq!(value, "lots");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_environment_reports_every_key() {
        let err = DispatcherConfig::from_lookup(|_| None).unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => assert_eq!(keys.len(), 8),
            other => panic!("expected MissingKeys, got {:?}", other),
        }
    }
}

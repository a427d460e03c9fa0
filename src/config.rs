//! Operator configuration read from the environment.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryConfig;

const ENV_WATCH_NAMESPACE: &str = "APP_OPERATOR_WATCH_NAMESPACE";
const ENV_RESYNC_INTERVAL: &str = "APP_OPERATOR_RESYNC_INTERVAL_SECS";
const ENV_INDEX_TTL: &str = "APP_OPERATOR_INDEX_TTL_SECS";
const ENV_CLIENT_TTL: &str = "APP_OPERATOR_CLIENT_TTL_SECS";
const ENV_REMOTE_TIMEOUT: &str = "APP_OPERATOR_REMOTE_TIMEOUT_SECS";
const ENV_STEP_RETRIES: &str = "APP_OPERATOR_STEP_RETRY_ATTEMPTS";
const ENV_HEALTH_PORT: &str = "APP_OPERATOR_HEALTH_PORT";

/// Error loading the operator configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigLoadError {
    /// A variable was set to something that is not a valid value.
    #[error("invalid {key}='{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Runtime settings of the operator.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches every namespace.
    pub watch_namespace: Option<String>,
    /// Requeue interval for Apps in a settled state.
    pub resync_interval: Duration,
    /// How long a fetched catalog index stays fresh.
    pub index_ttl: Duration,
    /// How long resolved cluster clients are reused.
    pub client_ttl: Duration,
    /// Upper bound on any single call to a remote cluster.
    pub remote_timeout: Duration,
    /// Attempts per pipeline step for retryable errors.
    pub step_retry_attempts: u32,
    /// Port of the health and metrics server.
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            resync_interval: Duration::from_secs(300),
            index_ttl: Duration::from_secs(300),
            client_ttl: Duration::from_secs(600),
            remote_timeout: Duration::from_secs(5),
            step_retry_attempts: 3,
            health_port: 8080,
        }
    }
}

impl OperatorConfig {
    /// Read the configuration from `APP_OPERATOR_*` variables.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let mut envs = HashMap::new();
        for key in [
            ENV_WATCH_NAMESPACE,
            ENV_RESYNC_INTERVAL,
            ENV_INDEX_TTL,
            ENV_CLIENT_TTL,
            ENV_REMOTE_TIMEOUT,
            ENV_STEP_RETRIES,
            ENV_HEALTH_PORT,
        ] {
            if let Ok(value) = std::env::var(key) {
                envs.insert(key.to_string(), value);
            }
        }
        Self::from_env_map(&envs)
    }

    /// Build the configuration from an explicit variable map.
    pub fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, ConfigLoadError> {
        let defaults = Self::default();
        let get = |key: &str| {
            envs.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            watch_namespace: get(ENV_WATCH_NAMESPACE),
            resync_interval: secs(ENV_RESYNC_INTERVAL, get(ENV_RESYNC_INTERVAL))?
                .unwrap_or(defaults.resync_interval),
            index_ttl: secs(ENV_INDEX_TTL, get(ENV_INDEX_TTL))?.unwrap_or(defaults.index_ttl),
            client_ttl: secs(ENV_CLIENT_TTL, get(ENV_CLIENT_TTL))?.unwrap_or(defaults.client_ttl),
            remote_timeout: secs(ENV_REMOTE_TIMEOUT, get(ENV_REMOTE_TIMEOUT))?
                .unwrap_or(defaults.remote_timeout),
            step_retry_attempts: match get(ENV_STEP_RETRIES) {
                Some(v) => parse_positive(ENV_STEP_RETRIES, v)?,
                None => defaults.step_retry_attempts,
            },
            health_port: match get(ENV_HEALTH_PORT) {
                Some(v) => v.parse().map_err(|_| ConfigLoadError::Invalid {
                    key: ENV_HEALTH_PORT,
                    value: v,
                    reason: "expected a port number",
                })?,
                None => defaults.health_port,
            },
        })
    }

    /// Retry policy applied to each pipeline step.
    pub fn step_retry(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.step_retry_attempts)
    }
}

fn secs(key: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigLoadError> {
    raw.map(|v| parse_positive(key, v).map(|n| Duration::from_secs(u64::from(n))))
        .transpose()
}

fn parse_positive(key: &'static str, value: String) -> Result<u32, ConfigLoadError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigLoadError::Invalid {
            key,
            value,
            reason: "expected a positive integer",
        }),
    }
}

//! Environment-driven harness configuration.
//!
//! | Variable                          | Default     |
//! |-----------------------------------|-------------|
//! | `INFRATEST_BINARY`                | `terraform` |
//! | `INFRATEST_COMMAND_TIMEOUT_SECS`  | `0` (none)  |
//! | `INFRATEST_MAX_ATTEMPTS`          | `4`         |
//! | `INFRATEST_RETRY_DELAY_SECS`      | `5`         |
//! | `INFRATEST_KEEP_WORKSPACES`       | `false`     |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;

/// Environment variables consulted, in order, for the Google Cloud project ID.
pub const GOOGLE_PROJECT_ENV_VARS: &[&str] = &[
    "GOOGLE_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT_ID",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Tool binary (name on PATH or absolute path).
    pub binary: String,

    /// Per-invocation timeout in seconds (0 = unbounded).
    pub command_timeout_secs: u64,

    /// Apply attempts, including the first.
    pub max_attempts: u32,

    /// Delay between apply attempts in seconds.
    pub retry_delay_secs: u64,

    /// Keep isolated workspaces on disk after the test.
    pub keep_workspaces: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            command_timeout_secs: 0,
            max_attempts: 4,
            retry_delay_secs: 5,
            keep_workspaces: false,
        }
    }
}

impl HarnessConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            binary: lookup("INFRATEST_BINARY")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.binary),
            command_timeout_secs: parse_or(
                &lookup,
                "INFRATEST_COMMAND_TIMEOUT_SECS",
                defaults.command_timeout_secs,
            )?,
            max_attempts: parse_or(&lookup, "INFRATEST_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_delay_secs: parse_or(
                &lookup,
                "INFRATEST_RETRY_DELAY_SECS",
                defaults.retry_delay_secs,
            )?,
            keep_workspaces: lookup("INFRATEST_KEEP_WORKSPACES")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.keep_workspaces),
        })
    }

    /// The apply retry policy described by this configuration.
    pub fn retry_policy(&self) -> HarnessResult<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> HarnessResult<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| HarnessError::Configuration(format!("{key}={raw:?}: {e}"))),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whether the process runs under CI (the conventional `CI` variable is set).
pub fn running_in_ci() -> bool {
    std::env::var("CI").map(|v| !v.is_empty()).unwrap_or(false)
}

/// The Google Cloud project ID from the first populated [`GOOGLE_PROJECT_ENV_VARS`] entry.
pub fn google_project_id_from_env() -> HarnessResult<String> {
    google_project_id_from_lookup(|key| std::env::var(key).ok())
}

pub fn google_project_id_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> HarnessResult<String> {
    GOOGLE_PROJECT_ENV_VARS
        .iter()
        .find_map(|key| lookup(key).filter(|v| !v.is_empty()))
        .ok_or_else(|| {
            HarnessError::Configuration(format!(
                "no Google Cloud project ID in environment (checked {})",
                GOOGLE_PROJECT_ENV_VARS.join(", ")
            ))
        })
}

//! Bounded retry of transient tool failures.
//!
//! Only failures whose captured output matches a known transient signature
//! are retried: throttling, flaky networking during provider downloads, and
//! eventual-consistency races between dependent cloud resources. Anything
//! else fails on the first attempt so a genuine configuration error is
//! surfaced immediately instead of after the whole attempt budget.

use std::future::Future;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarnessError, HarnessResult};
use crate::obs;

/// Default signatures of transient failures, with a description used in logs.
const DEFAULT_TRANSIENT_SIGNATURES: &[(&str, &str)] = &[
    (r"(?i)throttl", "provider API throttled the request"),
    (r"RequestLimitExceeded", "provider API rate limit"),
    (r"TooManyRequests", "provider API rate limit"),
    (r"rateLimitExceeded", "provider API rate limit"),
    (r"(?i)rate exceeded", "provider API rate limit"),
    (r"429 Too Many Requests", "provider API rate limit"),
    (r"read: connection reset by peer", "network connection reset"),
    (r"TLS handshake timeout", "network TLS handshake timeout"),
    (r"transport is closing", "provider transport closed"),
    (r"registry service is unreachable", "provider registry unreachable"),
    (r"Failed to query available provider packages", "provider download failed"),
    (r"Error installing provider", "provider download failed"),
    (r"timeout while waiting for plugin to start", "provider plugin start timeout"),
    (r"could not query provider registry", "provider registry unreachable"),
    (r"(?i)eventual consistency", "eventual consistency race"),
    (r"PrincipalNotFound", "identity not yet propagated"),
    (r"(?i)does not exist in the directory", "identity not yet propagated"),
    (r"InvalidInstanceID\.NotFound", "instance not yet visible"),
    (r"AnotherOperationInProgress", "conflicting operation in progress"),
    (r"(?i)operation is already in progress", "conflicting operation in progress"),
    (r"(?i)resource is not ready", "dependent resource not ready"),
];

/// Classifies failures as transient (retryable) or not.
#[derive(Debug, Clone)]
pub struct TransientClassifier {
    signatures: Vec<(Regex, String)>,
}

impl Default for TransientClassifier {
    fn default() -> Self {
        let signatures = DEFAULT_TRANSIENT_SIGNATURES
            .iter()
            .filter_map(|(pattern, description)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| (re, description.to_string()))
            })
            .collect();
        Self { signatures }
    }
}

impl TransientClassifier {
    /// A classifier that treats nothing as transient.
    pub fn none() -> Self {
        Self {
            signatures: Vec::new(),
        }
    }

    /// Add a signature (builder pattern).
    pub fn with_signature(mut self, pattern: &str, description: &str) -> HarnessResult<Self> {
        let re = Regex::new(pattern).map_err(|e| {
            HarnessError::Configuration(format!("invalid transient pattern `{pattern}`: {e}"))
        })?;
        self.signatures.push((re, description.to_string()));
        Ok(self)
    }

    /// Description of the first signature matching `text`, if any.
    pub fn classify(&self, text: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, description)| description.as_str())
    }

    /// Why `err` is transient, or `None` if it is not.
    ///
    /// Only tool invocation failures can be transient.
    pub fn transient_reason(&self, err: &HarnessError) -> Option<&str> {
        match err {
            HarnessError::ToolInvocation { output, .. } => self.classify(output),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// How often, and how patiently, a transient failure is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_between_attempts: Duration,
    pub classifier: TransientClassifier,
}

impl RetryPolicy {
    /// Policy with the default transient classifier.
    pub fn new(max_attempts: u32, delay_between_attempts: Duration) -> HarnessResult<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            delay_between_attempts,
            classifier: TransientClassifier::default(),
        })
    }

    /// A single attempt, never retried.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay_between_attempts: Duration::ZERO,
            classifier: TransientClassifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: TransientClassifier) -> Self {
        self.classifier = classifier;
        self
    }
}

impl Default for RetryPolicy {
    /// Three retries, five seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay_between_attempts: Duration::from_secs(5),
            classifier: TransientClassifier::default(),
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the policy's
/// attempt budget is spent. Returns the value and the number of attempts.
///
/// The last error is surfaced with its attempt count set.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut op: F,
) -> HarnessResult<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(mut err) => {
                let reason = policy.classifier.transient_reason(&err);
                match reason {
                    Some(reason) if attempt < max_attempts => {
                        obs::emit_retry_scheduled(
                            description,
                            attempt,
                            max_attempts,
                            reason,
                            policy.delay_between_attempts,
                        );
                        tokio::time::sleep(policy.delay_between_attempts).await;
                        attempt += 1;
                    }
                    _ => {
                        if let HarnessError::ToolInvocation { attempts, .. } = &mut err {
                            *attempts = attempt;
                        }
                        return Err(err);
                    }
                }
            }
        }
    }
}

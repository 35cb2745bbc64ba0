//! Structured lifecycle events.
//!
//! Every event carries an `event` field (`command.started`, `apply.retry`, ...)
//! so log pipelines can filter on it regardless of message text.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn, Span};

/// Span tagging everything inside it with the module under test.
///
/// Attach it to the test's future with `tracing::Instrument`:
///
/// ```ignore
/// runner.with_applied(&opts, body).instrument(lifecycle_span("aws", &name)).await
/// ```
pub fn lifecycle_span(module: &str, name: &str) -> Span {
    tracing::info_span!("infratest.lifecycle", module = %module, name = %name)
}

pub fn emit_command_started(command: &str, working_dir: &Path) {
    debug!(event = "command.started", command = %command, dir = %working_dir.display());
}

pub fn emit_command_finished(command: &str, exit_code: i32, duration_ms: u64) {
    debug!(
        event = "command.finished",
        command = %command,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

pub fn emit_step(step: &str, working_dir: &Path) {
    info!(event = "lifecycle.step", step = %step, dir = %working_dir.display());
}

pub fn emit_retry_scheduled(
    description: &str,
    attempt: u32,
    max_attempts: u32,
    reason: &str,
    delay: Duration,
) {
    warn!(
        event = "apply.retry",
        what = %description,
        attempt = attempt,
        max_attempts = max_attempts,
        reason = %reason,
        delay_ms = delay.as_millis() as u64,
    );
}

pub fn emit_destroy_finished(working_dir: &Path, success: bool) {
    info!(event = "destroy.finished", dir = %working_dir.display(), success = success);
}

pub fn emit_cleanup_error(working_dir: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "destroy.error", dir = %working_dir.display(), error = %error);
}

pub fn emit_validation_module(module: &str, succeeded: bool) {
    info!(event = "validation.module", module = %module, succeeded = succeeded);
}

//! Lifecycle runner: init → plan | apply → outputs → destroy.
//!
//! Resources provisioned by `apply` must be released by `destroy` on every
//! exit path. [`LifecycleRunner::with_applied`] enforces that: it runs the
//! caller's assertions between apply and destroy, and still destroys when
//! apply fails, when the assertions return an error, and when they panic.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{CommandOutput, Invocation, TerraformCli, ToolExecutor};
use crate::obs;
use crate::options::ExecutionOptions;
use crate::retry::retry_transient;
use crate::vars::var_args;

/// Outcome of a plan or apply.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleResult {
    /// The saved plan file, when the plan was written to disk.
    pub plan_artifact: Option<PathBuf>,

    /// The plan as JSON (`show -json`), for plan-and-show only.
    pub plan: Option<Value>,

    /// Module outputs by name. Empty for plan-only runs.
    pub outputs: BTreeMap<String, Value>,

    /// Exit status of the final plan/apply invocation.
    pub exit_status: i32,

    /// Apply invocations made, including the successful one.
    pub attempts: u32,
}

/// One entry of `output -json`.
#[derive(Debug, Deserialize)]
struct OutputEntry {
    value: Value,
    #[serde(default)]
    sensitive: bool,
}

/// Drives the tool through a module's lifecycle.
#[derive(Clone)]
pub struct LifecycleRunner {
    executor: Arc<dyn ToolExecutor>,
}

impl LifecycleRunner {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    /// Runner backed by the real binary described by `config`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(Arc::new(TerraformCli::from_config(config)))
    }

    /// `init`, then `plan`. Provisions nothing.
    pub async fn init_and_plan(&self, options: &ExecutionOptions) -> HarnessResult<LifecycleResult> {
        self.init(options).await?;

        obs::emit_step("plan", options.working_directory());
        let plan = self.run(options, plan_args(options)).await?;

        Ok(LifecycleResult {
            plan_artifact: options.plan_artifact_path().map(PathBuf::from),
            plan: None,
            outputs: BTreeMap::new(),
            exit_status: plan.exit_code,
            attempts: 1,
        })
    }

    /// `init`, `plan -out`, then `show -json` of the saved plan.
    ///
    /// Requires a plan artifact path in `options`.
    pub async fn init_and_plan_and_show(
        &self,
        options: &ExecutionOptions,
    ) -> HarnessResult<LifecycleResult> {
        let plan_path = options.plan_artifact_path().ok_or_else(|| {
            HarnessError::Configuration("plan-and-show needs a plan artifact path".to_string())
        })?;

        let mut result = self.init_and_plan(options).await?;

        let mut args = vec!["show".to_string()];
        if options.color_suppressed() {
            args.push("-no-color".to_string());
        }
        args.push("-json".to_string());
        args.push(plan_path.to_string_lossy().to_string());

        let shown = self.run(options, args).await?;
        result.plan = Some(serde_json::from_str(shown.stdout.trim())?);
        Ok(result)
    }

    /// `init`, then `apply` with transient-failure retry, then read outputs.
    ///
    /// Init failures are never retried. The caller owns the obligation to
    /// call [`destroy`](Self::destroy) afterwards, whatever this returns;
    /// prefer [`with_applied`](Self::with_applied), which discharges it.
    pub async fn init_and_apply(&self, options: &ExecutionOptions) -> HarnessResult<LifecycleResult> {
        self.init(options).await?;

        obs::emit_step("apply", options.working_directory());
        let args = apply_args(options);
        let runner = self;
        let (applied, attempts) = retry_transient(options.retry_policy(), "apply", move |_| {
            runner.run(options, args.clone())
        })
        .await?;

        let outputs = self.read_outputs(options).await?;
        info!(
            dir = %options.working_directory().display(),
            attempts = attempts,
            outputs = outputs.len(),
            "apply succeeded"
        );

        Ok(LifecycleResult {
            plan_artifact: None,
            plan: None,
            outputs,
            exit_status: applied.exit_code,
            attempts,
        })
    }

    /// `destroy`. Safe to call after a failed or partial apply.
    pub async fn destroy(&self, options: &ExecutionOptions) -> HarnessResult<()> {
        obs::emit_step("destroy", options.working_directory());
        let result = self.run(options, destroy_args(options)).await;
        obs::emit_destroy_finished(options.working_directory(), result.is_ok());
        result.map(|_| ())
    }

    /// Apply, hand the result to `body`, then destroy exactly once.
    ///
    /// - apply fails: destroy runs, the apply error is returned.
    /// - `body` returns: destroy runs; a destroy failure is returned as the error.
    /// - `body` panics: destroy runs, then the panic resumes.
    ///
    /// A destroy failure after a failed apply or a panic is logged, not returned,
    /// so the original cause is what the test reports.
    pub async fn with_applied<T, F, Fut>(
        &self,
        options: &ExecutionOptions,
        body: F,
    ) -> HarnessResult<T>
    where
        F: FnOnce(LifecycleResult) -> Fut,
        Fut: Future<Output = T>,
    {
        let outcome = match self.init_and_apply(options).await {
            Ok(result) => Ok(AssertUnwindSafe(async move { body(result).await })
                .catch_unwind()
                .await),
            Err(e) => Err(e),
        };

        let destroyed = self.destroy(options).await;

        match outcome {
            Ok(Ok(value)) => destroyed.map(|_| value),
            Ok(Err(panic)) => {
                if let Err(e) = &destroyed {
                    obs::emit_cleanup_error(options.working_directory(), e);
                }
                std::panic::resume_unwind(panic)
            }
            Err(apply_err) => {
                if let Err(e) = &destroyed {
                    obs::emit_cleanup_error(options.working_directory(), e);
                }
                Err(apply_err)
            }
        }
    }

    /// All outputs of the current state (`output -json`), without re-applying.
    pub async fn read_outputs(
        &self,
        options: &ExecutionOptions,
    ) -> HarnessResult<BTreeMap<String, Value>> {
        let out = self.run(options, output_args(options, None)).await?;
        parse_outputs(&out.stdout)
    }

    /// One output by name (`output -json <name>`).
    pub async fn output(&self, options: &ExecutionOptions, name: &str) -> HarnessResult<Value> {
        let inv = self.invocation(options, output_args(options, Some(name)));
        let command = inv.command_line(self.executor.binary());
        let out = self.executor.execute(&inv).await?;

        if !out.success() && is_missing_output(&out.combined(), name) {
            return Err(HarnessError::MissingOutput {
                name: name.to_string(),
                available: Vec::new(),
            });
        }
        let out = out.into_result(command)?;
        Ok(serde_json::from_str(out.stdout.trim())?)
    }

    async fn init(&self, options: &ExecutionOptions) -> HarnessResult<CommandOutput> {
        obs::emit_step("init", options.working_directory());
        self.run(options, init_args(true, options.color_suppressed()))
            .await
    }

    fn invocation(&self, options: &ExecutionOptions, args: Vec<String>) -> Invocation {
        Invocation::new(args, options.working_directory()).with_env(options.env_vars())
    }

    async fn run(&self, options: &ExecutionOptions, args: Vec<String>) -> HarnessResult<CommandOutput> {
        let inv = self.invocation(options, args);
        let command = inv.command_line(self.executor.binary());
        self.executor.execute(&inv).await?.into_result(command)
    }
}

/// The tool's own report that `name` is absent from state. Other failures
/// mentioning "not found" (backend, credentials, binary) stay tool errors.
fn is_missing_output(text: &str, name: &str) -> bool {
    text.contains(&format!("Output \"{name}\" not found"))
        || text.contains("output variable requested could not be found")
}

/// Parse `output -json`. Blank output means no outputs.
fn parse_outputs(stdout: &str) -> HarnessResult<BTreeMap<String, Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(trimmed)?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            if entry.sensitive {
                tracing::debug!(output = %name, "reading sensitive output");
            }
            (name, entry.value)
        })
        .collect())
}

/// `init [-backend=false]`.
pub(crate) fn init_args(backend: bool, no_color: bool) -> Vec<String> {
    let mut args = vec!["init".to_string(), "-input=false".to_string()];
    if !backend {
        args.push("-backend=false".to_string());
    }
    if no_color {
        args.push("-no-color".to_string());
    }
    args
}

/// Flags shared by plan, apply and destroy.
fn mutation_args(subcommand: &str, options: &ExecutionOptions) -> Vec<String> {
    let mut args = vec![subcommand.to_string(), "-input=false".to_string()];
    if subcommand != "plan" {
        args.push("-auto-approve".to_string());
    }
    if !options.lock_state() {
        args.push("-lock=false".to_string());
    }
    if options.color_suppressed() {
        args.push("-no-color".to_string());
    }
    args.extend(var_args(options.variables()));
    for file in options.var_files() {
        args.push(format!("-var-file={}", file.display()));
    }
    args
}

fn plan_args(options: &ExecutionOptions) -> Vec<String> {
    let mut args = mutation_args("plan", options);
    if let Some(path) = options.plan_artifact_path() {
        args.push(format!("-out={}", path.display()));
    }
    args
}

fn apply_args(options: &ExecutionOptions) -> Vec<String> {
    mutation_args("apply", options)
}

fn destroy_args(options: &ExecutionOptions) -> Vec<String> {
    mutation_args("destroy", options)
}

fn output_args(options: &ExecutionOptions, name: Option<&str>) -> Vec<String> {
    let mut args = vec!["output".to_string()];
    if options.color_suppressed() {
        args.push("-no-color".to_string());
    }
    args.push("-json".to_string());
    if let Some(name) = name {
        args.push(name.to_string());
    }
    args
}

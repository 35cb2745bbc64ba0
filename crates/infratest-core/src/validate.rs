//! Static validation of module sources: `init -backend=false` then `validate`.
//!
//! Every module is checked, concurrently, and one failing module never stops
//! the others from being evaluated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{CommandOutput, Invocation, TerraformCli, ToolExecutor};
use crate::lifecycle::init_args;
use crate::obs;
use crate::workspace::{self, CopyScope};

/// Text a successful `validate` prints.
pub const SUCCESS_MARKER: &str = "Success!";

/// Result of validating one module.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub provider_name: String,
    pub succeeded: bool,

    /// Output of the last command run for this module.
    pub combined_output: String,

    /// Why the module failed, when it did.
    pub error: Option<HarnessError>,
}

impl ValidationOutcome {
    fn passed(provider_name: &str, combined_output: String) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            succeeded: true,
            combined_output,
            error: None,
        }
    }

    fn failed(provider_name: &str, combined_output: String, error: HarnessError) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            succeeded: false,
            combined_output,
            error: Some(error),
        }
    }
}

/// Outcomes of a validation run, keyed by module name.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub outcomes: BTreeMap<String, ValidationOutcome>,
}

impl ValidationReport {
    pub fn passed_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.succeeded).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.values().all(|o| o.succeeded)
    }

    pub fn get(&self, provider_name: &str) -> Option<&ValidationOutcome> {
        self.outcomes.get(provider_name)
    }

    /// Failed outcomes, in module name order.
    pub fn failures(&self) -> impl Iterator<Item = &ValidationOutcome> {
        self.outcomes.values().filter(|o| !o.succeeded)
    }

    /// `Ok` when every module passed, otherwise the first failure's error.
    pub fn into_result(self) -> HarnessResult<()> {
        for (_, outcome) in self.outcomes {
            if let Some(error) = outcome.error {
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Validates module directories under a common root.
#[derive(Clone)]
pub struct ValidationRunner {
    executor: Arc<dyn ToolExecutor>,
    success_marker: String,
    isolated: bool,
    no_color: bool,
}

impl ValidationRunner {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            executor,
            success_marker: SUCCESS_MARKER.to_string(),
            isolated: false,
            no_color: true,
        }
    }

    /// Runner backed by the real binary described by `config`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(Arc::new(TerraformCli::from_config(config)))
    }

    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    /// Validate ephemeral copies of the whole root instead of the sources.
    /// `init` writes a `.terraform` directory into whatever it runs in.
    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn color(mut self, enabled: bool) -> Self {
        self.no_color = !enabled;
        self
    }

    /// Validate every module in `modules` (directory names under `root`).
    pub async fn run(&self, root: &Path, modules: &[&str]) -> ValidationReport {
        let outcomes = join_all(modules.iter().map(|m| self.validate_module(root, m))).await;

        let report = ValidationReport {
            outcomes: outcomes
                .into_iter()
                .map(|o| (o.provider_name.clone(), o))
                .collect(),
        };
        debug!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "validation finished"
        );
        report
    }

    /// Validate one module directory.
    pub async fn validate_module(&self, root: &Path, module: &str) -> ValidationOutcome {
        let outcome = match self.prepare(root, module) {
            Ok((dir, _guard)) => match self.check(&dir).await {
                Ok(output) => ValidationOutcome::passed(module, output),
                Err((error, output)) => ValidationOutcome::failed(module, output, error),
            },
            Err(error) => ValidationOutcome::failed(module, String::new(), error),
        };
        obs::emit_validation_module(module, outcome.succeeded);
        outcome
    }

    /// Directory to validate in, plus the workspace keeping it alive when isolated.
    fn prepare(
        &self,
        root: &Path,
        module: &str,
    ) -> HarnessResult<(PathBuf, Option<workspace::ModuleWorkspace>)> {
        if self.isolated {
            let ws = workspace::isolate_scoped(root, module, CopyScope::Root)?;
            return Ok((ws.ephemeral_path.clone(), Some(ws)));
        }

        let dir = root.join(module);
        if !dir.is_dir() {
            return Err(HarnessError::setup(&dir, "module directory does not exist"));
        }
        Ok((dir, None))
    }

    async fn check(&self, dir: &Path) -> Result<String, (HarnessError, String)> {
        self.step(dir, init_args(false, self.no_color)).await?;

        let mut args = vec!["validate".to_string()];
        if self.no_color {
            args.push("-no-color".to_string());
        }
        let output = self.step(dir, args).await?.combined();

        if !output.contains(&self.success_marker) {
            let error = HarnessError::UnexpectedOutput {
                message: format!("validate output lacks `{}`", self.success_marker),
                output: output.clone(),
            };
            return Err((error, output));
        }
        Ok(output)
    }

    async fn step(
        &self,
        dir: &Path,
        args: Vec<String>,
    ) -> Result<CommandOutput, (HarnessError, String)> {
        let inv = Invocation::new(args, dir);
        let command = inv.command_line(self.executor.binary());

        let out = self
            .executor
            .execute(&inv)
            .await
            .map_err(|e| (e, String::new()))?;
        let combined = out.combined();
        out.into_result(command).map_err(|e| (e, combined))
    }
}

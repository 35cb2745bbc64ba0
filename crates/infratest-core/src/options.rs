//! Execution options handed to the lifecycle runner.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;
use crate::vars::{VarValue, Variables};
use crate::workspace::ModuleWorkspace;

/// A deployment target and the input variables its module cannot run without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    pub required_variables: Vec<String>,
}

impl ProviderProfile {
    pub fn new(name: &str, required_variables: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            required_variables: required_variables.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Required keys absent from `vars`.
    pub fn missing_variables(&self, vars: &Variables) -> Vec<String> {
        self.required_variables
            .iter()
            .filter(|key| !vars.contains_key(key.as_str()))
            .cloned()
            .collect()
    }
}

/// Everything one lifecycle invocation needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    working_directory: PathBuf,
    variables: Variables,
    var_files: Vec<PathBuf>,
    env_vars: BTreeMap<String, String>,
    retry_policy: RetryPolicy,
    plan_artifact_path: Option<PathBuf>,
    color_suppressed: bool,
    lock_state: bool,
}

impl ExecutionOptions {
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn var_files(&self) -> &[PathBuf] {
        &self.var_files
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn plan_artifact_path(&self) -> Option<&Path> {
        self.plan_artifact_path.as_deref()
    }

    pub fn color_suppressed(&self) -> bool {
        self.color_suppressed
    }

    pub fn lock_state(&self) -> bool {
        self.lock_state
    }
}

/// Fluent builder for [`ExecutionOptions`].
///
/// Defaults: color suppressed, state locking off, [`RetryPolicy::default`].
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    working_directory: PathBuf,
    profile: Option<ProviderProfile>,
    variables: Variables,
    var_files: Vec<PathBuf>,
    env_vars: BTreeMap<String, String>,
    retry_policy: RetryPolicy,
    plan_artifact_path: Option<PathBuf>,
    color_suppressed: bool,
    lock_state: bool,
}

impl OptionsBuilder {
    /// Options targeting an isolated workspace.
    pub fn new(workspace: &ModuleWorkspace) -> Self {
        Self::for_dir(&workspace.ephemeral_path)
    }

    /// Options targeting an arbitrary module directory.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: dir.into(),
            profile: None,
            variables: Variables::new(),
            var_files: Vec::new(),
            env_vars: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
            plan_artifact_path: None,
            color_suppressed: true,
            lock_state: false,
        }
    }

    /// Check the variables against this profile's required keys on build.
    pub fn profile(mut self, profile: ProviderProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn var(mut self, name: &str, value: impl Into<VarValue>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn vars(mut self, vars: Variables) -> Self {
        self.variables.extend(vars);
        self
    }

    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env_vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Where `plan -out` writes. Relative paths resolve against the working directory.
    pub fn plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_artifact_path = Some(path.into());
        self
    }

    pub fn color(mut self, enabled: bool) -> Self {
        self.color_suppressed = !enabled;
        self
    }

    pub fn lock_state(mut self, lock: bool) -> Self {
        self.lock_state = lock;
        self
    }

    pub fn build(self) -> HarnessResult<ExecutionOptions> {
        for name in self.variables.keys() {
            if !is_valid_identifier(name) {
                return Err(HarnessError::Configuration(format!(
                    "malformed variable name `{name}`"
                )));
            }
        }

        if let Some(profile) = &self.profile {
            let missing = profile.missing_variables(&self.variables);
            if !missing.is_empty() {
                return Err(HarnessError::Configuration(format!(
                    "provider `{}` is missing required variable(s): {}",
                    profile.name,
                    missing.join(", ")
                )));
            }
        }

        let plan_artifact_path = self.plan_artifact_path.map(|p| {
            if p.is_relative() {
                self.working_directory.join(p)
            } else {
                p
            }
        });

        Ok(ExecutionOptions {
            working_directory: self.working_directory,
            variables: self.variables,
            var_files: self.var_files,
            env_vars: self.env_vars,
            retry_policy: self.retry_policy,
            plan_artifact_path,
            color_suppressed: self.color_suppressed,
            lock_state: self.lock_state,
        })
    }
}

/// Build options for `workspace` in one call.
pub fn build_options(
    workspace: &ModuleWorkspace,
    profile: &ProviderProfile,
    variables: Variables,
    retry_policy: RetryPolicy,
    plan_path: Option<PathBuf>,
) -> HarnessResult<ExecutionOptions> {
    let mut builder = OptionsBuilder::new(workspace)
        .profile(profile.clone())
        .vars(variables)
        .retry_policy(retry_policy);
    if let Some(path) = plan_path {
        builder = builder.plan_file(path);
    }
    builder.build()
}

/// Letters, digits, underscores and dashes; must not start with a digit or dash.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

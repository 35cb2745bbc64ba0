//! Infratest provider suite
//!
//! Profiles and presets for the AWS, Azure, GCP and common-networking
//! modules, plus helpers the end-to-end tests share.

pub mod providers;

use std::path::PathBuf;
use std::sync::Arc;

use infratest_core::{
    build_options, CopyScope, ExecutionOptions, HarnessConfig, HarnessResult, LifecycleRunner,
    ModuleWorkspace, ProviderProfile, TerraformCli, ToolExecutor, ValidationRunner, Variables,
};

pub use providers::{
    aws, azure, common_networking, gcp, ExpectedOutputs, AZURE_OUTPUTS, GCP_OUTPUTS,
    VALIDATED_MODULES,
};

/// Directory holding the provider modules.
///
/// `INFRATEST_MODULES_ROOT` when set, otherwise the workspace root.
pub fn modules_root() -> PathBuf {
    match std::env::var("INFRATEST_MODULES_ROOT") {
        Ok(root) if !root.trim().is_empty() => PathBuf::from(root),
        _ => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../.."),
    }
}

/// Runners for one test, sharing a single executor.
pub struct Harness {
    pub config: HarnessConfig,
    pub lifecycle: LifecycleRunner,
    pub validation: ValidationRunner,
}

impl Harness {
    pub fn new(config: HarnessConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            lifecycle: LifecycleRunner::new(executor.clone()),
            validation: ValidationRunner::new(executor),
            config,
        }
    }

    /// Harness driving the real binary, configured from the environment.
    pub fn from_env() -> HarnessResult<Self> {
        let config = HarnessConfig::from_env()?;
        let executor = Arc::new(TerraformCli::from_config(&config));
        Ok(Self::new(config, executor))
    }

    /// Isolate `module` from [`modules_root`].
    ///
    /// The whole root is copied: provider modules reference
    /// `../common-networking`.
    pub fn isolate(&self, module: &str) -> HarnessResult<ModuleWorkspace> {
        infratest_core::isolate_with_config(&modules_root(), module, CopyScope::Root, &self.config)
    }

    /// Options for `workspace`, checked against `profile`, with the configured
    /// retry policy. A relative `plan_path` lands inside the workspace.
    pub fn build_options(
        &self,
        workspace: &ModuleWorkspace,
        profile: &ProviderProfile,
        variables: Variables,
        plan_path: Option<PathBuf>,
    ) -> HarnessResult<ExecutionOptions> {
        build_options(
            workspace,
            profile,
            variables,
            self.config.retry_policy()?,
            plan_path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_modules_root_is_workspace_root() {
        if std::env::var("INFRATEST_MODULES_ROOT").is_ok() {
            return;
        }
        let root = modules_root();
        assert!(root.join("Cargo.toml").is_file());
        assert!(root.join("crates").is_dir());
    }

    #[test]
    fn test_build_options_uses_configured_retry_policy() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("aws")).unwrap();
        let workspace = infratest_core::isolate(root.path(), "aws").unwrap();

        let config = HarnessConfig {
            max_attempts: 2,
            ..HarnessConfig::default()
        };
        let harness = Harness::new(config, Arc::new(infratest_core::fakes::ScriptedExecutor::new()));

        let options = harness
            .build_options(
                &workspace,
                &aws(),
                providers::aws_minimal_vars("terratest-abc"),
                Some(PathBuf::from("plan.out")),
            )
            .unwrap();
        assert_eq!(options.retry_policy().max_attempts, 2);
        assert_eq!(
            options.plan_artifact_path(),
            Some(workspace.ephemeral_path.join("plan.out").as_path())
        );

        let err = harness
            .build_options(&workspace, &gcp(), providers::aws_minimal_vars("x"), None)
            .unwrap_err();
        assert!(matches!(err, infratest_core::HarnessError::Configuration(_)));
    }

    #[test]
    fn test_validated_modules_have_profiles() {
        let names: Vec<String> = [aws(), azure(), gcp(), common_networking()]
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, VALIDATED_MODULES);
    }
}

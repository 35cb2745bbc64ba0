//! Integration tests for scoped apply/destroy with a scripted executor.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use infratest_core::fakes::ScriptedExecutor;
use infratest_core::{
    assert_count, assert_non_empty, isolate, namespaced, CommandOutput, ExecutionOptions,
    HarnessError, LifecycleRunner, OptionsBuilder, ProviderProfile, RetryPolicy,
};
use serde_json::json;
use tempfile::TempDir;

fn network_outputs() -> CommandOutput {
    let outputs = json!({
        "vpc_id": {"sensitive": false, "type": "string", "value": "vnet-0a1b2c"},
        "public_subnet_ids": {
            "sensitive": false,
            "type": ["list", "string"],
            "value": ["subnet-pub-1", "subnet-pub-2", "subnet-pub-3"]
        },
        "private_subnet_ids": {
            "sensitive": false,
            "type": ["list", "string"],
            "value": ["subnet-priv-1", "subnet-priv-2", "subnet-priv-3"]
        }
    });
    CommandOutput::new(0, outputs.to_string(), "")
}

fn azure_options(dir: &std::path::Path) -> ExecutionOptions {
    OptionsBuilder::for_dir(dir)
        .profile(ProviderProfile::new(
            "azure",
            &["location", "project_name", "environment"],
        ))
        .var("location", "eastus")
        .var("project_name", namespaced("terratest"))
        .var("environment", "test")
        .var("node_count", 1)
        .var("enable_private_cluster", false)
        .retry_policy(RetryPolicy::new(4, Duration::from_millis(1)).unwrap())
        .build()
        .unwrap()
}

/// Test: successful apply, assertions pass, destroy runs once
#[tokio::test]
async fn test_apply_assert_destroy() {
    let fake = Arc::new(ScriptedExecutor::new().respond_always("output", network_outputs()));
    let runner = LifecycleRunner::new(fake.clone());
    let options = azure_options(std::path::Path::new("/work/azure"));

    let checked = runner
        .with_applied(&options, |result| async move {
            let vpc_id = result.scalar("vpc_id")?;
            assert_non_empty(vpc_id.as_str(), "vpc_id")?;

            let public = result.list("public_subnet_ids")?;
            let private = result.list("private_subnet_ids")?;
            assert_count(&public, 3, "public subnets")?;
            assert_count(&private, 3, "private subnets")?;
            Ok::<_, HarnessError>(public.len() + private.len())
        })
        .await
        .expect("lifecycle should succeed");

    assert_eq!(checked.unwrap(), 6);
    assert_eq!(
        fake.subcommands(),
        vec!["init", "apply", "output", "destroy"],
        "destroy must follow the assertions"
    );
}

/// Test: a failing assertion is reported and destroy still runs
#[tokio::test]
async fn test_assertion_failure_still_destroys() {
    let fake = Arc::new(ScriptedExecutor::new().respond_always("output", network_outputs()));
    let runner = LifecycleRunner::new(fake.clone());
    let options = azure_options(std::path::Path::new("/work/azure"));

    let checked = runner
        .with_applied(&options, |result| async move {
            let public = result.list("public_subnet_ids")?;
            assert_count(&public, 2, "public subnets")
        })
        .await
        .expect("harness itself should succeed");

    let err = checked.unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedOutput { .. }));
    assert_eq!(fake.count("destroy"), 1);
}

/// Test: a panicking assertion body still triggers destroy, then the panic resumes
#[tokio::test]
async fn test_panic_still_destroys() {
    let fake = Arc::new(ScriptedExecutor::new().respond_always("output", network_outputs()));
    let runner = LifecycleRunner::new(fake.clone());
    let options = azure_options(std::path::Path::new("/work/azure"));

    let caught = AssertUnwindSafe(runner.with_applied(&options, |_| async {
        if true {
            panic!("assertion exploded");
        }
    }))
    .catch_unwind()
    .await;

    assert!(caught.is_err(), "panic should propagate");
    assert_eq!(fake.count("destroy"), 1);
}

/// Test: apply fails after exhausting retries, destroy still runs once
#[tokio::test]
async fn test_failed_apply_still_destroys() {
    let throttled = CommandOutput::new(1, "", "Error: Throttling: Rate exceeded");
    let fake = Arc::new(ScriptedExecutor::new().respond_always("apply", throttled));
    let runner = LifecycleRunner::new(fake.clone());
    let options = azure_options(std::path::Path::new("/work/azure"));

    let mut body_ran = false;
    let err = runner
        .with_applied(&options, |_| {
            body_ran = true;
            async {}
        })
        .await
        .unwrap_err();

    assert!(!body_ran);
    match err {
        HarnessError::ToolInvocation { attempts, output, .. } => {
            assert_eq!(attempts, 4);
            assert!(output.contains("Throttling"));
        }
        other => panic!("expected ToolInvocation, got {:?}", other),
    }
    assert_eq!(fake.count("apply"), 4);
    assert_eq!(fake.count("destroy"), 1);
}

/// Test: a destroy failure after a successful body is surfaced
#[tokio::test]
async fn test_destroy_failure_is_reported() {
    let fake = Arc::new(
        ScriptedExecutor::new()
            .respond_always("output", network_outputs())
            .respond("destroy", CommandOutput::new(1, "", "Error: deleting VNet: in use")),
    );
    let runner = LifecycleRunner::new(fake.clone());
    let options = azure_options(std::path::Path::new("/work/azure"));

    let err = runner
        .with_applied(&options, |_| async {})
        .await
        .unwrap_err();

    assert!(err.to_string().contains("destroy"));
    assert_eq!(fake.count("destroy"), 1);
}

/// Test: isolated workspace is the working directory and sources stay untouched
#[tokio::test]
async fn test_lifecycle_runs_in_isolated_workspace() {
    let sources = TempDir::new().unwrap();
    let module = sources.path().join("gcp");
    std::fs::create_dir_all(&module).unwrap();
    std::fs::write(module.join("main.tf"), "variable \"project_id\" {}\n").unwrap();

    let workspace = isolate(sources.path(), "gcp").unwrap();
    let options = OptionsBuilder::new(&workspace)
        .var("project_id", "demo-project")
        .build()
        .unwrap();

    let fake = Arc::new(ScriptedExecutor::new());
    let runner = LifecycleRunner::new(fake.clone());
    runner.with_applied(&options, |_| async {}).await.unwrap();

    for call in fake.calls() {
        assert_eq!(call.working_dir, workspace.ephemeral_path);
    }
    assert_eq!(fake.count_in("gcp", "destroy"), 1);
    assert!(!module.join(".terraform").exists());
}

//! Provider modules under test: required variables, small-footprint
//! presets, and the outputs each module must expose after apply.

use infratest_core::outputs::{assert_count, assert_non_empty};
use infratest_core::{
    HarnessError, HarnessResult, LifecycleResult, ProviderProfile, VarValue, Variables,
};
use tracing::debug;

/// Modules checked by static validation, in report order.
pub const VALIDATED_MODULES: [&str; 4] = ["aws", "azure", "gcp", "common-networking"];

/// Subnets the networking layout creates per tier.
pub const SUBNETS_PER_TIER: usize = 3;

pub fn aws() -> ProviderProfile {
    ProviderProfile::new("aws", &["region", "project_name", "environment"])
}

pub fn azure() -> ProviderProfile {
    ProviderProfile::new("azure", &["location", "project_name", "environment"])
}

pub fn gcp() -> ProviderProfile {
    ProviderProfile::new("gcp", &["project_id", "region", "project_name", "environment"])
}

/// Shared networking module; validated only, never applied on its own.
pub fn common_networking() -> ProviderProfile {
    ProviderProfile::new("common-networking", &[])
}

fn base(project_name: &str) -> Variables {
    let mut vars = Variables::new();
    vars.insert("project_name".into(), project_name.into());
    vars.insert("environment".into(), "test".into());
    vars
}

/// AWS variables for a plan: one small node.
pub fn aws_plan_vars(project_name: &str) -> Variables {
    let mut vars = base(project_name);
    vars.insert("region".into(), "us-east-1".into());
    vars.insert("instance_types".into(), VarValue::from(vec!["t3.small"]));
    vars.insert("min_size".into(), 1.into());
    vars.insert("max_size".into(), 1.into());
    vars.insert("desired_size".into(), 1.into());
    vars
}

/// AWS variables with only the required keys set.
pub fn aws_minimal_vars(project_name: &str) -> Variables {
    let mut vars = base(project_name);
    vars.insert("region".into(), "us-east-1".into());
    vars
}

/// Azure variables sized down to a single small node.
pub fn azure_test_vars(project_name: &str) -> Variables {
    let mut vars = base(project_name);
    vars.insert("location".into(), "eastus".into());
    vars.insert("vm_size".into(), "Standard_B2s".into());
    vars.insert("node_count".into(), 1.into());
    vars.insert("min_count".into(), 1.into());
    vars.insert("max_count".into(), 1.into());
    vars.insert("enable_auto_scaling".into(), true.into());
    vars
}

/// GCP variables sized down to a single small node.
pub fn gcp_test_vars(project_id: &str, project_name: &str) -> Variables {
    let mut vars = base(project_name);
    vars.insert("project_id".into(), project_id.into());
    vars.insert("region".into(), "us-central1".into());
    vars.insert("node_machine_type".into(), "e2-small".into());
    vars.insert("min_node_count".into(), 1.into());
    vars.insert("max_node_count".into(), 1.into());
    vars.insert("initial_node_count".into(), 1.into());
    vars
}

/// Outputs a module must expose after a successful apply.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedOutputs {
    /// Scalar outputs that must be non-empty.
    pub scalars: &'static [&'static str],

    /// List outputs with their exact expected length.
    pub lists: &'static [(&'static str, usize)],
}

pub const AZURE_OUTPUTS: ExpectedOutputs = ExpectedOutputs {
    scalars: &[
        "resource_group_name",
        "virtual_network_name",
        "virtual_network_id",
        "aks_cluster_name",
        "aks_cluster_id",
        "kubernetes_version",
    ],
    lists: &[
        ("public_subnet_ids", SUBNETS_PER_TIER),
        ("private_subnet_ids", SUBNETS_PER_TIER),
    ],
};

pub const GCP_OUTPUTS: ExpectedOutputs = ExpectedOutputs {
    scalars: &[
        "vpc_name",
        "vpc_id",
        "gke_cluster_name",
        "gke_cluster_id",
        "gke_node_pool_name",
        "kubernetes_version",
    ],
    lists: &[
        ("public_subnet_names", SUBNETS_PER_TIER),
        ("public_subnet_ids", SUBNETS_PER_TIER),
        ("private_subnet_names", SUBNETS_PER_TIER),
        ("private_subnet_ids", SUBNETS_PER_TIER),
    ],
};

impl ExpectedOutputs {
    /// Check every expected output. All failures are reported together.
    pub fn check(&self, result: &LifecycleResult) -> HarnessResult<()> {
        let scalar_checks = self.scalars.iter().map(|name| {
            result
                .scalar(name)
                .and_then(|value| assert_non_empty(value.as_str(), name))
        });
        let list_checks = self.lists.iter().map(|(name, expected)| {
            let items = result.list(name)?;
            assert_non_empty(&items, name)?;
            assert_count(&items, *expected, name)
        });

        let failures: Vec<String> = scalar_checks
            .chain(list_checks)
            .filter_map(|check| check.err().map(|e| e.to_string()))
            .collect();
        if !failures.is_empty() {
            return Err(HarnessError::unexpected(format!(
                "{} of {} expected outputs failed:\n{}",
                failures.len(),
                self.scalars.len() + self.lists.len(),
                failures.join("\n")
            )));
        }

        debug!(
            scalars = self.scalars.len(),
            lists = self.lists.len(),
            "expected outputs present"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infratest_core::OptionsBuilder;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn build(profile: ProviderProfile, vars: Variables) -> HarnessResult<()> {
        OptionsBuilder::for_dir("/modules/x")
            .profile(profile)
            .vars(vars)
            .build()
            .map(|_| ())
    }

    #[test]
    fn test_presets_satisfy_profiles() {
        build(aws(), aws_plan_vars("terratest-abc")).unwrap();
        build(aws(), aws_minimal_vars("terratest-abc")).unwrap();
        build(azure(), azure_test_vars("terratest-abc")).unwrap();
        build(gcp(), gcp_test_vars("demo-project", "terratest-abc")).unwrap();
        build(common_networking(), Variables::new()).unwrap();
    }

    #[test]
    fn test_gcp_profile_rejects_azure_vars() {
        let err = build(gcp(), azure_test_vars("terratest-abc")).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn test_aws_plan_vars_types() {
        let vars = aws_plan_vars("terratest-abc");
        assert_eq!(vars["instance_types"].to_hcl(), r#"["t3.small"]"#);
        assert_eq!(vars["desired_size"], VarValue::Integer(1));
    }

    fn applied(outputs: Value) -> LifecycleResult {
        let outputs: BTreeMap<String, Value> = serde_json::from_value(outputs).unwrap();
        LifecycleResult {
            plan_artifact: None,
            plan: None,
            outputs,
            exit_status: 0,
            attempts: 1,
        }
    }

    fn azure_outputs(private: Value) -> Value {
        json!({
            "resource_group_name": "rg-terratest",
            "virtual_network_name": "vnet-terratest",
            "virtual_network_id": "/subscriptions/x/vnet",
            "aks_cluster_name": "aks-terratest",
            "aks_cluster_id": "/subscriptions/x/aks",
            "kubernetes_version": "1.29.2",
            "public_subnet_ids": ["p1", "p2", "p3"],
            "private_subnet_ids": private,
        })
    }

    #[test]
    fn test_azure_outputs_check() {
        AZURE_OUTPUTS
            .check(&applied(azure_outputs(json!(["q1", "q2", "q3"]))))
            .unwrap();
    }

    #[test]
    fn test_azure_outputs_wrong_count() {
        let err = AZURE_OUTPUTS
            .check(&applied(azure_outputs(json!(["q1", "q2"]))))
            .unwrap_err();
        assert!(err.to_string().contains("private_subnet_ids"));
    }

    #[test]
    fn test_gcp_outputs_missing() {
        let err = GCP_OUTPUTS
            .check(&applied(azure_outputs(json!([]))))
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnexpectedOutput { .. }));
        let msg = err.to_string();
        assert!(msg.contains("8 of 10 expected outputs failed"), "{msg}");
        for name in ["vpc_name", "gke_cluster_id", "private_subnet_names", "private_subnet_ids"] {
            assert!(msg.contains(name), "{name} missing from {msg}");
        }
        assert!(!msg.contains("`kubernetes_version`"));
    }

    #[test]
    fn test_outputs_report_every_failure() {
        let mut outputs = azure_outputs(json!(["q1"]));
        outputs["aks_cluster_name"] = json!("");
        let err = AZURE_OUTPUTS.check(&applied(outputs)).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("2 of 8 expected outputs failed"), "{msg}");
        assert!(msg.contains("aks_cluster_name"));
        assert!(msg.contains("private_subnet_ids"));
    }
}

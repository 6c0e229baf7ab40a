//! Wire types for the Tower API

use serde::{Deserialize, Serialize};

/// Top-level Tower tenant grouping workspaces and members.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub org_id: i64,
    pub name: String,
    pub full_name: String,
}

/// A user's identity record within an organization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: i64,
    pub user_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Per-project Tower resource scoping participants and compute environments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub full_name: String,
}

/// Pricing model for an AWS Batch compute environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PricingModel {
    #[serde(rename = "SPOT")]
    Spot,
    #[serde(rename = "EC2")]
    OnDemand,
}

impl PricingModel {
    /// Segment used in compute-environment names.
    pub fn name_segment(self) -> &'static str {
        match self {
            PricingModel::Spot => "spot",
            PricingModel::OnDemand => "ondemand",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrganizationRequest<'a> {
    pub organization: OrganizationSpec<'a>,
    #[serde(rename = "logoId")]
    pub logo_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec<'a> {
    pub name: &'a str,
    pub full_name: &'a str,
    pub description: Option<&'a str>,
    pub location: Option<&'a str>,
    pub website: Option<&'a str>,
    pub logo: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct CreateWorkspaceRequest<'a> {
    pub workspace: WorkspaceSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec<'a> {
    pub name: &'a str,
    pub full_name: &'a str,
    pub description: Option<&'a str>,
    pub visibility: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateTeamRequest<'a> {
    pub team: TeamSpec<'a>,
}

#[derive(Debug, Serialize)]
pub struct TeamSpec<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub avatar: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct CreateCredentialsRequest<'a> {
    pub credentials: CredentialsSpec<'a>,
}

#[derive(Debug, Serialize)]
pub struct CredentialsSpec<'a> {
    pub name: &'a str,
    pub provider: &'a str,
    pub keys: CredentialsKeys<'a>,
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsKeys<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub assume_role_arn: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateComputeEnvRequest<'a> {
    #[serde(rename = "computeEnv")]
    pub compute_env: ComputeEnvSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvSpec<'a> {
    pub name: &'a str,
    pub platform: &'a str,
    pub credentials_id: &'a str,
    pub config: BatchForgeConfig<'a>,
}

/// Batch Forge provisioning template, serialized with explicit nulls the
/// way the Tower API expects.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchForgeConfig<'a> {
    pub config_mode: &'a str,
    pub region: &'a str,
    pub work_dir: String,
    pub credentials: Option<&'a str>,
    pub compute_job_role: &'a str,
    pub head_job_role: &'a str,
    pub execution_role: &'a str,
    pub head_job_cpus: Option<u32>,
    pub head_job_memory_mb: u32,
    pub pre_run_script: &'a str,
    pub post_run_script: Option<&'a str>,
    pub cli_path: Option<&'a str>,
    pub forge: ForgeSettings<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeSettings<'a> {
    pub vpc_id: &'a str,
    pub subnets: Vec<&'a str>,
    pub fsx_mode: &'a str,
    pub efs_mode: &'a str,
    #[serde(rename = "type")]
    pub model: PricingModel,
    pub min_cpus: u32,
    pub max_cpus: u32,
    pub gpu_enabled: bool,
    pub ebs_auto_scale: bool,
    pub allow_buckets: Vec<&'a str>,
    pub dispose_on_deletion: bool,
    pub instance_types: Vec<&'a str>,
    pub alloc_strategy: Option<&'a str>,
    pub ec2_key_pair: Option<&'a str>,
    pub image_id: Option<&'a str>,
    pub security_groups: Vec<&'a str>,
    pub ebs_block_size: u32,
    pub fusion_enabled: bool,
    pub efs_create: bool,
    pub bid_percentage: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_model_serialization() {
        assert_eq!(
            serde_json::to_string(&PricingModel::Spot).unwrap(),
            "\"SPOT\""
        );
        assert_eq!(
            serde_json::to_string(&PricingModel::OnDemand).unwrap(),
            "\"EC2\""
        );
    }

    #[test]
    fn test_workspace_spec_uses_camel_case_and_nulls() {
        let request = CreateWorkspaceRequest {
            workspace: WorkspaceSpec {
                name: "example-project",
                full_name: "example-project",
                description: None,
                visibility: "PRIVATE",
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["workspace"]["fullName"], "example-project");
        assert!(value["workspace"]["description"].is_null());
    }

    #[test]
    fn test_member_ignores_unknown_fields() {
        let member: Member = serde_json::from_value(serde_json::json!({
            "memberId": 42,
            "userName": "jdoe",
            "email": "jdoe@example.org",
            "avatar": null,
            "role": "member",
        }))
        .unwrap();
        assert_eq!(member.member_id, 42);
        assert_eq!(member.user_name, "jdoe");
    }
}

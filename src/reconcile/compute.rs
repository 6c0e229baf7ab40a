//! Compute-environment provisioning: credentials and the versioned
//! spot/on-demand pair

use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::aws::CloudProvider;
use crate::error::{Error, Result};
use crate::reconcile::SyncSettings;
use crate::tower::models::{
    BatchForgeConfig, ComputeEnvSpec, CreateComputeEnvRequest,
    CreateCredentialsRequest, CredentialsKeys, CredentialsSpec, ForgeSettings,
    PricingModel,
};
use crate::tower::TowerClient;

/// Stack output holding the Forge service-user access-key secret ARN.
const OUTPUT_SECRET_ARN: &str = "TowerForgeServiceUserAccessKeySecretArn";
/// Stack output holding the Forge service role ARN.
const OUTPUT_SERVICE_ROLE: &str = "TowerForgeServiceRoleArn";
/// Stack output holding the scratch bucket name.
const OUTPUT_SCRATCH: &str = "TowerScratch";
const OUTPUT_WORK_JOB_ROLE: &str = "TowerForgeBatchWorkJobRoleArn";
const OUTPUT_HEAD_JOB_ROLE: &str = "TowerForgeBatchHeadJobRoleArn";
const OUTPUT_EXECUTION_ROLE: &str = "TowerForgeBatchExecutionRoleArn";

/// VPC stack output holding the VPC id.
const VPC_OUTPUT_ID: &str = "VPCId";
/// VPC stack outputs holding the private subnet ids.
const VPC_OUTPUT_SUBNETS: [&str; 4] = [
    "PrivateSubnet",
    "PrivateSubnet1",
    "PrivateSubnet2",
    "PrivateSubnet3",
];

/// The versioned pair of compute environments desired per workspace.
#[derive(Debug, Clone)]
pub struct ComputeEnvironmentIds {
    pub spot: String,
    pub on_demand: String,
}

pub struct ComputeEnvironmentProvisioner<'a> {
    tower: &'a TowerClient,
    cloud: &'a dyn CloudProvider,
    settings: &'a SyncSettings,
}

impl<'a> ComputeEnvironmentProvisioner<'a> {
    pub fn new(
        tower: &'a TowerClient,
        cloud: &'a dyn CloudProvider,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            tower,
            cloud,
            settings,
        }
    }

    /// Get or create the Forge credentials record for one project, named by
    /// its stack. An existing record whose provider or deletion marker is
    /// unexpected signals remote corruption and fails the run.
    pub async fn ensure_credentials(
        &self,
        workspace_id: i64,
        stack: &BTreeMap<String, String>,
    ) -> Result<String> {
        let stack_name = output(stack, "stack_name")?;
        let params = [("workspaceId", workspace_id.to_string())];
        let response = self
            .tower
            .call(Method::GET, "/credentials", &params, None)
            .await?;
        if let Some(credentials) = response.get("credentials").and_then(Value::as_array)
        {
            for cred in credentials {
                if cred.get("name").and_then(Value::as_str) != Some(stack_name) {
                    continue;
                }
                let provider_ok =
                    cred.get("provider").and_then(Value::as_str) == Some("aws");
                let not_deleted = cred.get("deleted").is_none_or(Value::is_null);
                if !provider_ok || !not_deleted {
                    return Err(Error::Reconciliation(format!(
                        "credentials record for {stack_name} is in an unexpected state: {cred}"
                    )));
                }
                let id = cred.get("id").and_then(Value::as_str).ok_or_else(|| {
                    Error::Reconciliation(format!(
                        "credentials record for {stack_name} has no id"
                    ))
                })?;
                debug!(%stack_name, credentials_id = id, "credentials already exist");
                return Ok(id.to_string());
            }
        }
        let secret = self
            .cloud
            .secret_value(output(stack, OUTPUT_SECRET_ARN)?)
            .await?;
        let data = serde_json::to_value(CreateCredentialsRequest {
            credentials: CredentialsSpec {
                name: stack_name,
                provider: "aws",
                keys: CredentialsKeys {
                    access_key: &secret.aws_access_key_id,
                    secret_key: &secret.aws_secret_access_key,
                    assume_role_arn: output(stack, OUTPUT_SERVICE_ROLE)?,
                },
                description: format!("Credentials for {stack_name}"),
            },
        })?;
        let response = self
            .tower
            .call(Method::POST, "/credentials", &params, Some(&data))
            .await?;
        let id = response
            .get("credentialsId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Reconciliation(format!(
                    "credentials creation for {stack_name} returned no id: {response}"
                ))
            })?;
        info!(%stack_name, credentials_id = id, "created credentials");
        Ok(id.to_string())
    }

    /// Ensure the versioned spot/on-demand pair of compute environments
    /// exists for one workspace. A newly created spot environment becomes
    /// the workspace's primary execution target; the on-demand one never
    /// does.
    pub async fn ensure_compute_environments(
        &self,
        workspace_id: i64,
        stack: &BTreeMap<String, String>,
        vpc: &BTreeMap<String, String>,
    ) -> Result<ComputeEnvironmentIds> {
        let stack_name = output(stack, "stack_name")?;
        let version = &self.settings.ce_version;
        let spot_name = format!(
            "{stack_name}-{}-{version}",
            PricingModel::Spot.name_segment()
        );
        let ondemand_name = format!(
            "{stack_name}-{}-{version}",
            PricingModel::OnDemand.name_segment()
        );
        let params = [("workspaceId", workspace_id.to_string())];
        let response = self
            .tower
            .call(Method::GET, "/compute-envs", &params, None)
            .await?;
        let mut spot_id = None;
        let mut ondemand_id = None;
        if let Some(compute_envs) = response.get("computeEnvs").and_then(Value::as_array)
        {
            for compute_env in compute_envs {
                let platform = compute_env.get("platform").and_then(Value::as_str);
                let status = compute_env.get("status").and_then(Value::as_str);
                if platform != Some("aws-batch")
                    || !matches!(status, Some("AVAILABLE") | Some("CREATING"))
                {
                    continue;
                }
                let name = compute_env.get("name").and_then(Value::as_str);
                let id = compute_env
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if name == Some(&spot_name) {
                    spot_id = id;
                } else if name == Some(&ondemand_name) {
                    ondemand_id = id;
                }
            }
        }
        let spot = match spot_id {
            Some(id) => id,
            None => {
                let id = self
                    .create_compute_environment(
                        workspace_id,
                        &spot_name,
                        PricingModel::Spot,
                        stack,
                        vpc,
                    )
                    .await?;
                self.set_primary_compute_environment(workspace_id, &id).await?;
                id
            }
        };
        let on_demand = match ondemand_id {
            Some(id) => id,
            None => {
                self.create_compute_environment(
                    workspace_id,
                    &ondemand_name,
                    PricingModel::OnDemand,
                    stack,
                    vpc,
                )
                .await?
            }
        };
        Ok(ComputeEnvironmentIds { spot, on_demand })
    }

    async fn create_compute_environment(
        &self,
        workspace_id: i64,
        name: &str,
        model: PricingModel,
        stack: &BTreeMap<String, String>,
        vpc: &BTreeMap<String, String>,
    ) -> Result<String> {
        let credentials_id = self.ensure_credentials(workspace_id, stack).await?;
        let subnets = VPC_OUTPUT_SUBNETS
            .into_iter()
            .map(|key| output(vpc, key).map(String::as_str))
            .collect::<Result<Vec<_>>>()?;
        let data = serde_json::to_value(CreateComputeEnvRequest {
            compute_env: ComputeEnvSpec {
                name,
                platform: "aws-batch",
                credentials_id: &credentials_id,
                config: BatchForgeConfig {
                    config_mode: "Batch Forge",
                    region: &self.settings.region,
                    work_dir: format!("s3://{}/work", output(stack, OUTPUT_SCRATCH)?),
                    credentials: None,
                    compute_job_role: output(stack, OUTPUT_WORK_JOB_ROLE)?,
                    head_job_role: output(stack, OUTPUT_HEAD_JOB_ROLE)?,
                    execution_role: output(stack, OUTPUT_EXECUTION_ROLE)?,
                    head_job_cpus: None,
                    head_job_memory_mb: 15360,
                    pre_run_script: "NXF_OPTS='-Xms4g -Xmx12g'",
                    post_run_script: None,
                    cli_path: None,
                    forge: ForgeSettings {
                        vpc_id: output(vpc, VPC_OUTPUT_ID)?,
                        subnets,
                        fsx_mode: "None",
                        efs_mode: "None",
                        model,
                        min_cpus: 0,
                        max_cpus: 1000,
                        gpu_enabled: false,
                        ebs_auto_scale: true,
                        allow_buckets: Vec::new(),
                        dispose_on_deletion: true,
                        instance_types: Vec::new(),
                        alloc_strategy: None,
                        ec2_key_pair: None,
                        image_id: None,
                        security_groups: Vec::new(),
                        ebs_block_size: 1000,
                        fusion_enabled: false,
                        efs_create: false,
                        bid_percentage: None,
                    },
                },
            },
        })?;
        let params = [("workspaceId", workspace_id.to_string())];
        let response = self
            .tower
            .call(Method::POST, "/compute-envs", &params, Some(&data))
            .await?;
        let id = response
            .get("computeEnvId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Reconciliation(format!(
                    "compute environment creation for {name} returned no id: {response}"
                ))
            })?;
        info!(compute_env = name, id, "created compute environment");
        Ok(id.to_string())
    }

    /// Mark the given compute environment as the workspace default.
    async fn set_primary_compute_environment(
        &self,
        workspace_id: i64,
        compute_env_id: &str,
    ) -> Result<()> {
        let endpoint = format!("/compute-envs/{compute_env_id}/primary");
        let params = [("workspaceId", workspace_id.to_string())];
        let data = serde_json::json!({});
        self.tower
            .call(Method::POST, &endpoint, &params, Some(&data))
            .await?;
        Ok(())
    }
}

fn output<'m>(outputs: &'m BTreeMap<String, String>, key: &str) -> Result<&'m String> {
    outputs.get(key).ok_or_else(|| {
        Error::Cloud(format!(
            "stack {} is missing output {key}",
            outputs
                .get("stack_name")
                .map(String::as_str)
                .unwrap_or("<unknown>")
        ))
    })
}

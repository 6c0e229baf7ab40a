//! The reconciliation engine
//!
//! One run converges the remote Tower resource graph to the desired state
//! extracted from configuration: organization, then members and teams, then
//! one workspace per project with its participants, then the versioned pair
//! of compute environments per workspace that can launch workflows.
//!
//! Execution is strictly sequential and every remote mutation is
//! individually idempotent; a failure partway through a run leaves partial
//! state that the next run converges from.

pub mod compute;
pub mod org;
pub mod workspace;

pub use compute::{ComputeEnvironmentIds, ComputeEnvironmentProvisioner};
pub use org::OrganizationReconciler;
pub use workspace::{ParticipantRef, ParticipationMode, WorkspaceReconciler};

use std::time::Duration;

use tracing::info;

use crate::aws::CloudProvider;
use crate::error::Result;
use crate::projects::Projects;
use crate::tower::TowerClient;

/// Increment this version when updating compute environments.
pub const CE_VERSION: &str = "v6";

pub const DEFAULT_ORG_NAME: &str = "Sage Bionetworks";
pub const REGION: &str = "us-east-1";
pub const VPC_STACK_NAME: &str = "nextflow-vpc";

/// Settings for one reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Full name of the Tower organization.
    pub org_name: String,
    /// Materialize one team per (project, role-group) instead of direct
    /// user participants.
    pub use_teams: bool,
    /// Version marker appended to compute-environment names.
    pub ce_version: String,
    /// AWS region for Batch Forge provisioning.
    pub region: String,
    /// CloudFormation stack holding the VPC id and private subnets.
    pub vpc_stack_name: String,
    /// Upper bound on waiting for compute-environment deletions to settle.
    pub settle_timeout: Duration,
    /// Poll interval while waiting for deletions to settle.
    pub settle_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            org_name: DEFAULT_ORG_NAME.to_string(),
            use_teams: false,
            ce_version: CE_VERSION.to_string(),
            region: REGION.to_string(),
            vpc_stack_name: VPC_STACK_NAME.to_string(),
            settle_timeout: Duration::from_secs(120),
            settle_interval: Duration::from_secs(5),
        }
    }
}

/// Run one full reconciliation of the desired state against Tower.
pub async fn run(
    tower: &TowerClient,
    cloud: &dyn CloudProvider,
    projects: &Projects,
    settings: &SyncSettings,
) -> Result<()> {
    let mut org =
        OrganizationReconciler::ensure_organization(tower, &settings.org_name).await?;
    let teams_per_project = org.populate(projects, settings.use_teams).await?;
    let vpc = cloud.stack_outputs(&settings.vpc_stack_name).await?;
    let provisioner = ComputeEnvironmentProvisioner::new(tower, cloud, settings);

    for (stack_name, users) in projects.list_projects() {
        info!(project = %stack_name, "reconciling workspace");
        let workspace =
            WorkspaceReconciler::ensure_workspace(tower, org.org.org_id, stack_name)
                .await?;
        let project_teams = &teams_per_project[stack_name];
        let mode = if settings.use_teams {
            ParticipationMode::Teamed(project_teams)
        } else {
            ParticipationMode::Direct(users)
        };
        workspace.populate(&mut org, mode).await?;
        let has_launchers = mode.has_launchers();
        let deleted = workspace
            .cleanup_compute_environments(&settings.ce_version, has_launchers)
            .await?;
        if has_launchers {
            let stack = cloud.stack_outputs(stack_name).await?;
            let ids = provisioner
                .ensure_compute_environments(workspace.workspace.id, &stack, &vpc)
                .await?;
            info!(
                project = %stack_name,
                spot = %ids.spot,
                on_demand = %ids.on_demand,
                "compute environments ready"
            );
        } else {
            info!(project = %stack_name, "no launchers, skipping compute environments");
        }
        workspace
            .wait_for_removal(&deleted, settings.settle_timeout, settings.settle_interval)
            .await?;
    }
    Ok(())
}

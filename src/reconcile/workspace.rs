//! Workspace reconciliation: participants and compute-environment cleanup

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::projects::{Role, Users};
use crate::reconcile::org::{OrganizationReconciler, ProjectTeams};
use crate::tower::models::{CreateWorkspaceRequest, Workspace, WorkspaceSpec};
use crate::tower::outcome::{classify, ApiOutcome};
use crate::tower::{sanitize_name, TowerClient};

/// How a workspace's participants are configured for one run: direct user
/// assignments or team assignments, never both.
#[derive(Debug, Clone, Copy)]
pub enum ParticipationMode<'a> {
    Direct(&'a Users),
    Teamed(&'a ProjectTeams),
}

impl ParticipationMode<'_> {
    /// Whether at least one configured role is capable of launching a
    /// workflow. Drives whether compute environments are provisioned.
    pub fn has_launchers(&self) -> bool {
        match self {
            ParticipationMode::Direct(users) => users.has_launchers(),
            ParticipationMode::Teamed(teams) => {
                teams.iter().any(|(_, role)| role.can_launch())
            }
        }
    }
}

/// The member or team being bound to a workspace.
#[derive(Debug, Clone, Copy)]
pub enum ParticipantRef {
    Member(i64),
    Team(i64),
}

pub struct WorkspaceReconciler<'a> {
    tower: &'a TowerClient,
    org_id: i64,
    pub workspace: Workspace,
}

impl<'a> WorkspaceReconciler<'a> {
    /// Get or create the workspace for one project under the organization.
    /// Visibility is always private.
    pub async fn ensure_workspace(
        tower: &'a TowerClient,
        org_id: i64,
        stack_name: &str,
    ) -> Result<Self> {
        let name = sanitize_name(stack_name);
        let endpoint = format!("/orgs/{org_id}/workspaces");
        let response = tower.call(Method::GET, &endpoint, &[], None).await?;
        if let Some(workspaces) = response.get("workspaces").and_then(Value::as_array) {
            for workspace in workspaces {
                if workspace.get("name").and_then(Value::as_str) == Some(&name) {
                    let workspace: Workspace =
                        serde_json::from_value(workspace.clone())?;
                    debug!(workspace_id = workspace.id, %name, "workspace already exists");
                    return Ok(Self {
                        tower,
                        org_id,
                        workspace,
                    });
                }
            }
        }
        let data = serde_json::to_value(CreateWorkspaceRequest {
            workspace: WorkspaceSpec {
                name: &name,
                full_name: stack_name,
                description: None,
                visibility: "PRIVATE",
            },
        })?;
        let response = tower
            .call(Method::POST, &endpoint, &[], Some(&data))
            .await?;
        let workspace = response.get("workspace").cloned().ok_or_else(|| {
            Error::Reconciliation(format!(
                "workspace creation for {stack_name} returned no record: {response}"
            ))
        })?;
        let workspace: Workspace = serde_json::from_value(workspace)?;
        info!(workspace_id = workspace.id, %name, "created workspace");
        Ok(Self {
            tower,
            org_id,
            workspace,
        })
    }

    fn participants_endpoint(&self) -> String {
        format!(
            "/orgs/{}/workspaces/{}/participants",
            self.org_id, self.workspace.id
        )
    }

    /// Add a member or team to the workspace if need be, then set its role
    /// unconditionally so role changes in configuration converge on rerun.
    ///
    /// The duplicate path returns no identifier, so an existing participant
    /// is resolved by paginated search over the workspace's participants.
    pub async fn add_participant(
        &self,
        role: Role,
        target: ParticipantRef,
    ) -> Result<i64> {
        let endpoint = self.participants_endpoint();
        let (data, identifier, id_key) = match target {
            ParticipantRef::Member(member_id) => (
                json!({ "memberId": member_id, "teamId": null, "userNameOrEmail": null }),
                member_id,
                "memberId",
            ),
            ParticipantRef::Team(team_id) => (
                json!({ "memberId": null, "teamId": team_id, "userNameOrEmail": null }),
                team_id,
                "teamId",
            ),
        };
        let response = self
            .tower
            .call(Method::PUT, &format!("{endpoint}/add"), &[], Some(&data))
            .await?;
        let participant_id = match classify(&response) {
            ApiOutcome::Created(body) => body
                .pointer("/participant/participantId")
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    Error::Reconciliation(format!(
                        "participant add ({identifier}) returned no id: {body}"
                    ))
                })?,
            ApiOutcome::AlreadyExists(_) => {
                let participants =
                    self.tower.paged(Method::GET, &endpoint, &[]).await?;
                participants
                    .iter()
                    .find(|p| p.get(id_key).and_then(Value::as_i64) == Some(identifier))
                    .and_then(|p| p.get("participantId").and_then(Value::as_i64))
                    .ok_or_else(|| {
                        Error::Reconciliation(format!(
                            "failed to find the given participant ({identifier})"
                        ))
                    })?
            }
            ApiOutcome::Blocked(message) | ApiOutcome::OtherFailure(message) => {
                return Err(Error::Reconciliation(format!(
                    "could not add participant ({identifier}): {message}"
                )));
            }
        };
        self.set_participant_role(participant_id, role).await?;
        Ok(participant_id)
    }

    /// Update the participant role in the given workspace.
    pub async fn set_participant_role(
        &self,
        participant_id: i64,
        role: Role,
    ) -> Result<()> {
        let endpoint = format!("{}/{participant_id}/role", self.participants_endpoint());
        let data = json!({ "role": role.as_str() });
        self.tower
            .call(Method::PUT, &endpoint, &[], Some(&data))
            .await?;
        Ok(())
    }

    /// Apply the configured participation mode: every (identity, role) pair
    /// for direct assignment, or every (team, role) pair for team mode.
    pub async fn populate(
        &self,
        orgs: &mut OrganizationReconciler<'_>,
        mode: ParticipationMode<'_>,
    ) -> Result<()> {
        match mode {
            ParticipationMode::Direct(users) => {
                for (email, role) in users.list_users() {
                    let member = orgs.ensure_member(&email).await?;
                    self.add_participant(role, ParticipantRef::Member(member.member_id))
                        .await?;
                }
            }
            ParticipationMode::Teamed(teams) => {
                for (team_id, role) in teams {
                    self.add_participant(*role, ParticipantRef::Team(*team_id))
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn workspace_params(&self) -> [(&'static str, String); 1] {
        [("workspaceId", self.workspace.id.to_string())]
    }

    /// Delete compute environments whose name does not carry the current
    /// version marker, or all of them when the workspace has no launchers.
    ///
    /// A delete blocked by active jobs is logged and skipped; cleanup is
    /// best-effort because AWS caps live compute environments per account
    /// at 50, but a single run's correctness does not depend on it.
    /// Returns the ids whose deletion was accepted.
    pub async fn cleanup_compute_environments(
        &self,
        version: &str,
        has_launchers: bool,
    ) -> Result<Vec<String>> {
        let params = self.workspace_params();
        let response = self
            .tower
            .call(Method::GET, "/compute-envs", &params, None)
            .await?;
        let mut deleted = Vec::new();
        let Some(compute_envs) = response.get("computeEnvs").and_then(Value::as_array)
        else {
            return Ok(deleted);
        };
        for compute_env in compute_envs {
            let Some(id) = compute_env.get("id").and_then(Value::as_str) else {
                continue;
            };
            let name = compute_env
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name.ends_with(version) && has_launchers {
                continue;
            }
            let endpoint = format!("/compute-envs/{id}");
            let response = self
                .tower
                .call(Method::DELETE, &endpoint, &params, None)
                .await?;
            match classify(&response) {
                ApiOutcome::Created(_) => {
                    info!(
                        workspace = %self.workspace.name,
                        compute_env = name,
                        "deleted stale compute environment"
                    );
                    deleted.push(id.to_string());
                }
                ApiOutcome::Blocked(_) => {
                    info!(
                        workspace = %self.workspace.name,
                        compute_env = name,
                        "skipping deletion of compute environment due to active jobs"
                    );
                }
                ApiOutcome::AlreadyExists(_) | ApiOutcome::OtherFailure(_) => {
                    warn!(
                        workspace = %self.workspace.name,
                        compute_env = name,
                        "compute environment deletion failed, leaving it in place"
                    );
                }
            }
        }
        Ok(deleted)
    }

    /// Poll the compute-environment list until the given ids disappear,
    /// bounded by a timeout. Deletion is asynchronous on the Tower side and
    /// the account-wide cap makes it worth waiting out before the next
    /// workspace provisions replacements. A timeout is logged, not fatal.
    pub async fn wait_for_removal(
        &self,
        deleted: &[String],
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        if deleted.is_empty() {
            return Ok(());
        }
        let params = self.workspace_params();
        let deadline = Instant::now() + timeout;
        loop {
            let response = self
                .tower
                .call(Method::GET, "/compute-envs", &params, None)
                .await?;
            let remaining: Vec<&String> = deleted
                .iter()
                .filter(|id| {
                    response
                        .get("computeEnvs")
                        .and_then(Value::as_array)
                        .is_some_and(|envs| {
                            envs.iter().any(|env| {
                                env.get("id").and_then(Value::as_str)
                                    == Some(id.as_str())
                            })
                        })
                })
                .collect();
            if remaining.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(
                    workspace = %self.workspace.name,
                    ?remaining,
                    "compute environment deletion did not settle before timeout"
                );
                return Ok(());
            }
            debug!(
                workspace = %self.workspace.name,
                pending = remaining.len(),
                "waiting for compute environment deletion to settle"
            );
            sleep(interval).await;
        }
    }
}

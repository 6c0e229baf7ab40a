//! Organization reconciliation: members and teams
//!
//! Tower does not expose members by email, so membership is a two-step
//! get-or-create protocol: attempt the add, and on a duplicate message fall
//! back to searching by the username embedded in that message.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::projects::{Projects, Role};
use crate::tower::models::{
    CreateOrganizationRequest, CreateTeamRequest, Member, Organization,
    OrganizationSpec, TeamSpec,
};
use crate::tower::outcome::{classify, ApiOutcome};
use crate::tower::{sanitize_name, TowerClient};

/// Teams materialized for one project: (team id, role) pairs.
pub type ProjectTeams = Vec<(i64, Role)>;

pub struct OrganizationReconciler<'a> {
    tower: &'a TowerClient,
    pub org: Organization,
    /// Members resolved during this run, keyed by email.
    members: HashMap<String, Member>,
}

impl<'a> OrganizationReconciler<'a> {
    /// Get or create the Tower organization with the given full name.
    ///
    /// Organizations are listed unpaginated; a Tower account is assumed to
    /// hold only a handful of them.
    pub async fn ensure_organization(
        tower: &'a TowerClient,
        full_name: &str,
    ) -> Result<Self> {
        let response = tower.call(Method::GET, "/orgs", &[], None).await?;
        if let Some(orgs) = response.get("organizations").and_then(Value::as_array) {
            for org in orgs {
                if org.get("fullName").and_then(Value::as_str) == Some(full_name) {
                    let org: Organization = serde_json::from_value(org.clone())?;
                    debug!(org_id = org.org_id, "organization already exists");
                    return Ok(Self::new(tower, org));
                }
            }
        }
        let name = sanitize_name(full_name);
        let data = serde_json::to_value(CreateOrganizationRequest {
            organization: OrganizationSpec {
                name: &name,
                full_name,
                description: None,
                location: None,
                website: None,
                logo: None,
            },
            logo_id: None,
        })?;
        let response = tower.call(Method::POST, "/orgs", &[], Some(&data)).await?;
        let org = response.get("organization").cloned().ok_or_else(|| {
            Error::Reconciliation(format!(
                "organization creation returned no record: {response}"
            ))
        })?;
        let org: Organization = serde_json::from_value(org)?;
        info!(org_id = org.org_id, full_name, "created organization");
        Ok(Self::new(tower, org))
    }

    fn new(tower: &'a TowerClient, org: Organization) -> Self {
        Self {
            tower,
            org,
            members: HashMap::new(),
        }
    }

    /// Add the user to the organization if need be and return their member
    /// record, cached for the rest of the run.
    pub async fn ensure_member(&mut self, email: &str) -> Result<Member> {
        if let Some(member) = self.members.get(email) {
            return Ok(member.clone());
        }
        let endpoint = format!("/orgs/{}/members", self.org.org_id);
        let data = json!({ "user": email });
        let response = self
            .tower
            .call(Method::PUT, &format!("{endpoint}/add"), &[], Some(&data))
            .await?;
        let member = match classify(&response) {
            ApiOutcome::Created(body) => {
                let record = body.get("member").cloned().ok_or_else(|| {
                    Error::Reconciliation(format!(
                        "member add for {email} returned no record: {body}"
                    ))
                })?;
                serde_json::from_value(record)?
            }
            ApiOutcome::AlreadyExists(hint) => {
                // Tower embeds the username in the duplicate message; it is
                // the only handle for looking the member up again.
                let username = hint.ok_or_else(|| {
                    Error::Reconciliation(format!(
                        "duplicate-member response for {email} carried no username"
                    ))
                })?;
                self.find_member_by_username(&endpoint, &username)
                    .await?
                    .ok_or_else(|| {
                        Error::Reconciliation(format!(
                            "failed to find the given member ({email})"
                        ))
                    })?
            }
            ApiOutcome::Blocked(message) | ApiOutcome::OtherFailure(message) => {
                return Err(Error::Reconciliation(format!(
                    "could not add member {email}: {message}"
                )));
            }
        };
        self.members.insert(email.to_string(), member.clone());
        Ok(member)
    }

    async fn find_member_by_username(
        &self,
        endpoint: &str,
        username: &str,
    ) -> Result<Option<Member>> {
        let params = [("search", username.to_string())];
        let items = self.tower.paged(Method::GET, endpoint, &params).await?;
        for item in items {
            if item.get("userName").and_then(Value::as_str) == Some(username) {
                return Ok(Some(serde_json::from_value(item)?));
            }
        }
        Ok(None)
    }

    /// Get or create a team by exact name match.
    pub async fn ensure_team(&self, team_name: &str) -> Result<i64> {
        let endpoint = format!("/orgs/{}/teams", self.org.org_id);
        for team in self.tower.paged(Method::GET, &endpoint, &[]).await? {
            if team.get("name").and_then(Value::as_str) == Some(team_name) {
                return team.get("teamId").and_then(Value::as_i64).ok_or_else(|| {
                    Error::Reconciliation(format!("team {team_name} has no teamId"))
                });
            }
        }
        let data = serde_json::to_value(CreateTeamRequest {
            team: TeamSpec {
                name: team_name,
                description: None,
                avatar: None,
            },
        })?;
        let response = self
            .tower
            .call(Method::POST, &endpoint, &[], Some(&data))
            .await?;
        let team_id = response
            .pointer("/team/teamId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Reconciliation(format!(
                    "team creation for {team_name} returned no id: {response}"
                ))
            })?;
        info!(team_id, team_name, "created team");
        Ok(team_id)
    }

    /// Add a user to a team, returning their member id.
    async fn add_member_to_team(&mut self, team_id: i64, email: &str) -> Result<i64> {
        let endpoint = format!("/orgs/{}/teams/{team_id}/members", self.org.org_id);
        let data = json!({ "userNameOrEmail": email });
        let response = self
            .tower
            .call(Method::POST, &endpoint, &[], Some(&data))
            .await?;
        match classify(&response) {
            ApiOutcome::Created(body) => body
                .pointer("/member/memberId")
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    Error::Reconciliation(format!(
                        "team-member add for {email} returned no id: {body}"
                    ))
                }),
            // Already in the team: the org-level member record carries the
            // same member id.
            ApiOutcome::AlreadyExists(_) => {
                Ok(self.ensure_member(email).await?.member_id)
            }
            ApiOutcome::Blocked(message) | ApiOutcome::OtherFailure(message) => {
                Err(Error::Reconciliation(format!(
                    "could not add {email} to team {team_id}: {message}"
                )))
            }
        }
    }

    async fn list_team_members(&self, team_id: i64) -> Result<Vec<i64>> {
        let endpoint = format!("/orgs/{}/teams/{team_id}/members", self.org.org_id);
        let members = self.tower.paged(Method::GET, &endpoint, &[]).await?;
        Ok(members
            .iter()
            .filter_map(|member| member.get("memberId").and_then(Value::as_i64))
            .collect())
    }

    async fn remove_member_from_team(&self, team_id: i64, member_id: i64) -> Result<()> {
        let endpoint = format!(
            "/orgs/{}/teams/{team_id}/members/{member_id}/delete",
            self.org.org_id
        );
        self.tower.call(Method::DELETE, &endpoint, &[], None).await?;
        Ok(())
    }

    /// Converge a team's membership to exactly the desired identity set:
    /// missing members are added, surplus members removed unconditionally.
    pub async fn reconcile_team_membership(
        &mut self,
        team_id: i64,
        desired: &[String],
    ) -> Result<()> {
        let mut verified_ids = BTreeSet::new();
        for email in desired {
            let member = self.ensure_member(email).await?;
            verified_ids.insert(member.member_id);
            self.add_member_to_team(team_id, email).await?;
        }
        for member_id in self.list_team_members(team_id).await? {
            if !verified_ids.contains(&member_id) {
                info!(team_id, member_id, "removing unexpected team member");
                self.remove_member_from_team(team_id, member_id).await?;
            }
        }
        Ok(())
    }

    /// Ensure every identity referenced by any project is an organization
    /// member and, in team mode, materialize one converged team per
    /// (project, role-group).
    pub async fn populate(
        &mut self,
        projects: &Projects,
        use_teams: bool,
    ) -> Result<BTreeMap<String, ProjectTeams>> {
        let mut teams_per_project = BTreeMap::new();
        for (project_name, project_users) in projects.list_projects() {
            let mut project_teams = ProjectTeams::new();
            for (user_group, role, emails) in project_users.list_teams() {
                if use_teams {
                    let project_prefix = project_name
                        .strip_suffix("-project")
                        .unwrap_or(project_name);
                    let team_name = format!("{project_prefix}-{user_group}");
                    let team_id = self.ensure_team(&team_name).await?;
                    self.reconcile_team_membership(team_id, &emails).await?;
                    project_teams.push((team_id, role));
                } else {
                    for email in &emails {
                        self.ensure_member(email).await?;
                    }
                }
            }
            teams_per_project.insert(project_name.clone(), project_teams);
        }
        Ok(teams_per_project)
    }
}

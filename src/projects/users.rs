//! Role assignments extracted from project configurations
//!
//! Tower knows five workspace roles. A `Users` value holds the identities
//! (emails) assigned to each tier for one project.

use std::collections::BTreeSet;

use tracing::debug;

/// Workspace role tiers, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    View,
    Launch,
    Maintain,
    Admin,
    Owner,
}

impl Role {
    /// The role name used by the Tower API.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::View => "view",
            Role::Launch => "launch",
            Role::Maintain => "maintain",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Whether this role is capable of launching a workflow.
    pub fn can_launch(self) -> bool {
        self >= Role::Launch
    }

    /// The user-group name used for team naming.
    pub fn group_name(self) -> &'static str {
        match self {
            Role::View => "viewers",
            Role::Launch => "launchers",
            Role::Maintain => "maintainers",
            Role::Admin => "admins",
            Role::Owner => "owners",
        }
    }
}

/// Users and their Tower roles for one project.
///
/// All users are stored as emails. An email listed in more than one tier
/// resolves to its highest tier.
#[derive(Debug, Clone, Default)]
pub struct Users {
    pub owners: Vec<String>,
    pub admins: Vec<String>,
    pub maintainers: Vec<String>,
    pub launchers: Vec<String>,
    pub viewers: Vec<String>,
}

impl Users {
    /// Tiers in descending privilege order.
    fn tiers(&self) -> [(&[String], Role); 5] {
        [
            (&self.owners, Role::Owner),
            (&self.admins, Role::Admin),
            (&self.maintainers, Role::Maintain),
            (&self.launchers, Role::Launch),
            (&self.viewers, Role::View),
        ]
    }

    /// List all users and their Tower roles.
    ///
    /// Each email appears exactly once; if an email is listed in multiple
    /// tiers of the same project, the highest tier wins.
    pub fn list_users(&self) -> Vec<(String, Role)> {
        let mut seen = BTreeSet::new();
        let mut users = Vec::new();
        for (emails, role) in self.tiers() {
            for email in emails {
                if seen.insert(email.as_str()) {
                    users.push((email.clone(), role));
                } else {
                    debug!(%email, dropped_role = role.as_str(), "email listed in multiple tiers, keeping highest role");
                }
            }
        }
        users
    }

    /// List all users grouped by their Tower roles, skipping empty groups.
    pub fn list_teams(&self) -> Vec<(&'static str, Role, Vec<String>)> {
        let users = self.list_users();
        let mut groups = Vec::new();
        for (_, role) in self.tiers() {
            let emails: Vec<String> = users
                .iter()
                .filter(|(_, r)| *r == role)
                .map(|(email, _)| email.clone())
                .collect();
            if !emails.is_empty() {
                groups.push((role.group_name(), role, emails));
            }
        }
        groups
    }

    /// Whether at least one user is capable of launching a workflow.
    pub fn has_launchers(&self) -> bool {
        self.tiers()
            .iter()
            .any(|(emails, role)| role.can_launch() && !emails.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Maintain);
        assert!(Role::Maintain > Role::Launch);
        assert!(Role::Launch > Role::View);
    }

    #[test]
    fn test_viewers_only_has_no_launchers() {
        let users = Users {
            viewers: emails(&["a@example.org"]),
            ..Default::default()
        };
        assert!(!users.has_launchers());
    }

    #[test]
    fn test_single_launcher_flips_detection() {
        let users = Users {
            viewers: emails(&["a@example.org"]),
            launchers: emails(&["b@example.org"]),
            ..Default::default()
        };
        assert!(users.has_launchers());
    }

    #[test]
    fn test_maintainers_count_as_launchers() {
        let users = Users {
            maintainers: emails(&["a@example.org"]),
            ..Default::default()
        };
        assert!(users.has_launchers());
    }

    #[test]
    fn test_list_users_highest_role_wins() {
        let users = Users {
            maintainers: emails(&["dup@example.org"]),
            viewers: emails(&["dup@example.org", "v@example.org"]),
            ..Default::default()
        };
        let listed = users.list_users();
        assert_eq!(
            listed,
            vec![
                ("dup@example.org".to_string(), Role::Maintain),
                ("v@example.org".to_string(), Role::View),
            ]
        );
    }

    #[test]
    fn test_list_teams_skips_empty_groups() {
        let users = Users {
            maintainers: emails(&["m@example.org"]),
            viewers: emails(&["v@example.org"]),
            ..Default::default()
        };
        let teams = users.list_teams();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].0, "maintainers");
        assert_eq!(teams[0].1, Role::Maintain);
        assert_eq!(teams[0].2, emails(&["m@example.org"]));
        assert_eq!(teams[1].0, "viewers");
    }
}

//! Typed classification of Tower's free-text conflict messages
//!
//! Tower signals duplicate-resource and blocked-delete conditions only
//! through an ad hoc `message` field in the response body. The known
//! substrings are kept here as constants and translated into a typed
//! outcome, so the reconcilers never do string matching themselves.

use serde_json::Value;

/// Message fragment returned when a user/team is already in a workspace.
pub const ALREADY_A_PARTICIPANT: &str = "Already a participant";

/// Message fragment returned when a user is already an organization member.
pub const ALREADY_A_MEMBER: &str = "already a member";

/// Message fragment returned when a member is already in a team.
pub const ALREADY_IN_TEAM: &str = "already associated with the team";

/// Message fragment returned when a compute environment cannot be deleted.
pub const HAS_ACTIVE_JOBS: &str = "has active jobs";

/// The outcome of a Tower mutation, derived from the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome {
    /// The resource was created/applied; the body carries its record.
    Created(Value),
    /// The resource already exists. Carries the lookup hint Tower embeds in
    /// the message (a quoted username), when present.
    AlreadyExists(Option<String>),
    /// The operation is blocked by remote state (e.g. active jobs) and
    /// should be skipped, not failed.
    Blocked(String),
    /// Tower reported some other failure message.
    OtherFailure(String),
}

/// Classify a Tower response body into a typed outcome.
pub fn classify(response: &Value) -> ApiOutcome {
    let Some(message) = response.get("message").and_then(Value::as_str) else {
        return ApiOutcome::Created(response.clone());
    };
    if message.contains(HAS_ACTIVE_JOBS) {
        ApiOutcome::Blocked(message.to_string())
    } else if message.contains(ALREADY_A_PARTICIPANT)
        || message.contains(ALREADY_A_MEMBER)
        || message.contains(ALREADY_IN_TEAM)
    {
        ApiOutcome::AlreadyExists(quoted_hint(message))
    } else {
        ApiOutcome::OtherFailure(message.to_string())
    }
}

/// Extract the value between the first pair of single quotes, e.g. the
/// username in `User 'jdoe' is already a member`.
fn quoted_hint(message: &str) -> Option<String> {
    let mut parts = message.split('\'');
    parts.next()?;
    parts.next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_without_message_is_created() {
        let response = json!({"member": {"memberId": 7}});
        assert_eq!(classify(&response), ApiOutcome::Created(response.clone()));
    }

    #[test]
    fn test_already_a_member_carries_username_hint() {
        let response = json!({"message": "User 'jdoe' is already a member"});
        assert_eq!(
            classify(&response),
            ApiOutcome::AlreadyExists(Some("jdoe".to_string()))
        );
    }

    #[test]
    fn test_already_a_participant_has_no_hint() {
        let response = json!({"message": "Already a participant"});
        assert_eq!(classify(&response), ApiOutcome::AlreadyExists(None));
    }

    #[test]
    fn test_already_in_team_is_already_exists() {
        let response =
            json!({"message": "The member is already associated with the team"});
        assert!(matches!(classify(&response), ApiOutcome::AlreadyExists(_)));
    }

    #[test]
    fn test_active_jobs_is_blocked() {
        let response =
            json!({"message": "Compute environment 'x' has active jobs"});
        assert!(matches!(classify(&response), ApiOutcome::Blocked(_)));
    }

    #[test]
    fn test_unknown_message_is_other_failure() {
        let response = json!({"message": "Something went wrong"});
        assert_eq!(
            classify(&response),
            ApiOutcome::OtherFailure("Something went wrong".to_string())
        );
    }
}

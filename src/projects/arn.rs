//! Extraction of emails from assumed-role ARNs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static ROLE_ARN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^arn:aws:sts::(?P<account_id>[0-9]+):assumed-role/(?P<role_name>[^/]+)/(?P<session_name>[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})$",
    )
    .expect("Invalid regex pattern")
});

/// Extract role session names (emails) from assumed-role ARNs.
///
/// Extraction is strict: one malformed entry aborts the whole list with
/// `Error::ArnFormat` rather than skipping that entry.
pub fn extract_emails(arns: &[String]) -> Result<Vec<String>> {
    let mut emails = Vec::with_capacity(arns.len());
    for arn in arns {
        let captures = ROLE_ARN_REGEX.captures(arn).ok_or_else(|| {
            Error::ArnFormat(format!(
                "Listed ARN ({arn}) doesn't follow expected format: \
                 'arn:aws:sts::<account_id>:assumed-role/<role_name>/<email>'"
            ))
        })?;
        emails.push(captures["session_name"].to_string());
    }
    Ok(emails)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_valid_arn() {
        let arns = vec![
            "arn:aws:sts::111111111111:assumed-role/RoleName/jane.doe@example.org".to_string(),
        ];
        let emails = extract_emails(&arns).unwrap();
        assert_eq!(emails, vec!["jane.doe@example.org".to_string()]);
    }

    #[test]
    fn test_extract_multiple_arns() {
        let arns = vec![
            "arn:aws:sts::111111111111:assumed-role/RoleName/jane.doe@example.org".to_string(),
            "arn:aws:sts::222222222222:assumed-role/Other-Role/j.smith@example.com".to_string(),
        ];
        let emails = extract_emails(&arns).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[1], "j.smith@example.com");
    }

    #[test]
    fn test_missing_session_email_is_rejected() {
        let arns =
            vec!["arn:aws:sts::111111111111:assumed-role/RoleName".to_string()];
        let err = extract_emails(&arns).unwrap_err();
        assert!(matches!(err, Error::ArnFormat(_)));
    }

    #[test]
    fn test_one_malformed_entry_aborts_extraction() {
        let arns = vec![
            "arn:aws:sts::111111111111:assumed-role/RoleName/jane.doe@example.org".to_string(),
            "not-an-arn".to_string(),
        ];
        assert!(extract_emails(&arns).is_err());
    }

    #[test]
    fn test_iam_role_arn_is_rejected() {
        // Only assumed-role STS ARNs carry a session email
        let arns = vec!["arn:aws:iam::111111111111:role/RoleName".to_string()];
        assert!(extract_emails(&arns).is_err());
    }
}

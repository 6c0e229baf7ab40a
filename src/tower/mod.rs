//! Nextflow Tower API client and wire types

pub mod client;
pub mod models;
pub mod outcome;

pub use client::{TowerClient, TowerConfig};
pub use outcome::ApiOutcome;

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("Invalid regex pattern"));

/// Generate a Tower-friendly name from a full name, replacing every
/// character outside `[A-Za-z0-9_-]` one-for-one with `-`.
pub fn sanitize_name(full_name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(full_name, "-").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_replaces_punctuation() {
        assert_eq!(sanitize_name("My Project! #1"), "My-Project---1");
    }

    #[test]
    fn test_sanitize_name_keeps_valid_characters() {
        assert_eq!(sanitize_name("Sage Bionetworks"), "Sage-Bionetworks");
        assert_eq!(sanitize_name("example-project_2"), "example-project_2");
    }
}

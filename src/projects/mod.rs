//! Project configuration discovery and desired-state extraction
//!
//! Walks a directory tree for Tower project configurations (Sceptre stack
//! configs ending in `-project.yaml`), validates them, and extracts the
//! per-project role assignments that the reconcilers converge Tower toward.

pub mod arn;
pub mod users;

pub use arn::extract_emails;
pub use users::{Role, Users};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, error};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Filename suffix identifying Tower project configurations.
pub const CONFIG_SUFFIX: &str = "-project.yaml";

/// Expected `template_path` value for a Tower project stack.
pub const TEMPLATE_KIND: &str = "tower-project.yaml";

/// The desired state for one reconciliation run: every valid project
/// configuration found under a directory, with its role assignment.
#[derive(Debug, Default)]
pub struct Projects {
    /// Mapping between project/stack names and their users.
    pub users_per_project: BTreeMap<String, Users>,
    /// Config files that were discovered and confirmed to be valid.
    pub config_paths: Vec<PathBuf>,
}

impl Projects {
    /// Load all project configurations under `config_directory`.
    ///
    /// An invalid record or a malformed ARN is fatal for that project only:
    /// it is logged and skipped, and sibling projects still load. The load
    /// fails outright only when every discovered configuration is invalid.
    pub fn load(config_directory: &Path) -> Result<Self> {
        let mut projects = Projects::default();
        let mut failures = 0;
        for path in discover(config_directory) {
            match load_config(&path) {
                Ok((stack_name, users)) => {
                    debug!(path = %path.display(), %stack_name, "loaded project config");
                    projects.users_per_project.insert(stack_name, users);
                    projects.config_paths.push(path);
                }
                Err(err) => {
                    error!(path = %path.display(), %err, "skipping invalid project config");
                    failures += 1;
                }
            }
        }
        if projects.users_per_project.is_empty() && failures > 0 {
            return Err(Error::InvalidProject(format!(
                "no valid project configurations found under {}",
                config_directory.display()
            )));
        }
        Ok(projects)
    }

    /// Iterate over all projects and their users in configuration order.
    pub fn list_projects(&self) -> impl Iterator<Item = (&String, &Users)> {
        self.users_per_project.iter()
    }
}

/// List all project YAML configuration files under `config_directory`,
/// selected by the `-project.yaml` suffix, in a stable order.
pub fn discover(config_directory: &Path) -> Vec<PathBuf> {
    let mut config_paths: Vec<PathBuf> = WalkDir::new(config_directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(CONFIG_SUFFIX))
        })
        .map(|entry| entry.into_path())
        .collect();
    config_paths.sort();
    config_paths
}

/// Validate a parsed Tower project configuration.
///
/// A valid record carries a `stack_name`, the expected `template_path`
/// marker, and a `parameters` block with at least one of the read-write or
/// read-only access-list fields.
pub fn validate_config(config: &Value) -> Result<()> {
    let stack_name = config.get("stack_name").and_then(Value::as_str);
    let template_ok =
        config.get("template_path").and_then(Value::as_str) == Some(TEMPLATE_KIND);
    let has_access_lists = config.get("parameters").is_some_and(|params| {
        params.get("S3ReadWriteAccessArns").is_some()
            || params.get("S3ReadOnlyAccessArns").is_some()
    });
    match (stack_name, template_ok && has_access_lists) {
        (Some(_), true) => Ok(()),
        (Some(stack_name), false) => Err(Error::InvalidProject(format!(
            "{stack_name}.yaml is invalid"
        ))),
        (None, _) => Err(Error::InvalidProject(format!(
            "this config is invalid:\n{config:?}"
        ))),
    }
}

/// Parse, validate, and extract users from one configuration file.
fn load_config(path: &Path) -> Result<(String, Users)> {
    let content = std::fs::read_to_string(path)?;
    // Sceptre resolver tags (e.g. `!stack_output`) parse as tagged values
    // and are ignored; the fields read here are plain scalars/sequences.
    let config: Value = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    let stack_name = config
        .get("stack_name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidProject("missing stack_name".to_string()))?
        .to_string();
    let parameters = config
        .get("parameters")
        .ok_or_else(|| Error::InvalidProject(format!("{stack_name}.yaml is invalid")))?;
    let maintainers = extract_emails(&arn_list(parameters, "S3ReadWriteAccessArns")?)?;
    let viewers = extract_emails(&arn_list(parameters, "S3ReadOnlyAccessArns")?)?;
    let users = Users {
        maintainers,
        viewers,
        ..Default::default()
    };
    Ok((stack_name, users))
}

/// Read an access-list parameter as a list of ARN strings, tolerating its
/// absence but not non-string entries.
fn arn_list(parameters: &Value, key: &str) -> Result<Vec<String>> {
    let Some(value) = parameters.get(key) else {
        return Ok(Vec::new());
    };
    let entries = value.as_sequence().ok_or_else(|| {
        Error::InvalidProject(format!("parameter {key} is not a list"))
    })?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::ArnFormat(format!("non-string entry in {key}")))
        })
        .collect()
}

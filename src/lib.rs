//! # tower-sync
//!
//! Synchronizes a declared set of projects and their user/role assignments
//! into a Nextflow Tower instance: organization, workspaces, members, teams,
//! participants, credentials, and versioned AWS Batch compute environments.
//!
//! ## Usage
//!
//! ```bash
//! tower-sync sync <projects-dir> [--dry-run] [--debug] [--use-teams]
//! ```
//!
//! ## Modules
//!
//! - `aws` - Trait-based boundary for CloudFormation outputs and secrets
//! - `error` - Error taxonomy for the reconciliation engine
//! - `projects` - Project configuration discovery and desired-state extraction
//! - `reconcile` - Organization, workspace, and compute-environment reconcilers
//! - `tower` - Authenticated Tower API client, pagination, and wire types

pub mod aws;
pub mod error;
pub mod projects;
pub mod reconcile;
pub mod tower;

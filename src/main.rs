use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use tower_sync::aws::AwsCloudProvider;
use tower_sync::projects::Projects;
use tower_sync::reconcile::{self, SyncSettings, DEFAULT_ORG_NAME};
use tower_sync::tower::{TowerClient, TowerConfig};

/// Synchronize declared projects and user roles into Nextflow Tower
#[derive(Parser)]
#[command(name = "tower-sync")]
#[command(about = "Synchronize project configurations into Nextflow Tower", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile Tower projects from a configuration directory
    Sync {
        /// Directory containing project config files
        projects_dir: PathBuf,

        /// Only discover and validate configurations; no remote calls
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Echo every Tower API request and response
        #[arg(short, long)]
        debug: bool,

        /// Materialize one team per (project, role-group)
        #[arg(long)]
        use_teams: bool,

        /// Full name of the Tower organization
        #[arg(long, default_value = DEFAULT_ORG_NAME)]
        org_name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The API echo is emitted at debug level, so --debug implies -v.
    let Commands::Sync { debug, .. } = &cli.command;
    let log_level = match cli.verbose {
        0 if !debug => "info",
        0 | 1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("tower-sync started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Sync {
            projects_dir,
            dry_run,
            debug,
            use_teams,
            org_name,
        } => run_sync(projects_dir, dry_run, debug, use_teams, org_name).await,
    };

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run_sync(
    projects_dir: PathBuf,
    dry_run: bool,
    debug: bool,
    use_teams: bool,
    org_name: String,
) -> Result<()> {
    let projects = Projects::load(&projects_dir)?;

    if dry_run {
        println!(
            "The following Tower project configurations were \
             discovered and confirmed to be valid:"
        );
        for path in &projects.config_paths {
            println!("  - {}", path.display());
        }
        return Ok(());
    }

    let config = TowerConfig::from_env()?.with_debug(debug);
    let tower = TowerClient::new(config)?;
    let settings = SyncSettings {
        org_name,
        use_teams,
        ..Default::default()
    };
    let cloud = AwsCloudProvider::new(&settings.region).await;
    reconcile::run(&tower, &cloud, &projects, &settings).await?;
    Ok(())
}

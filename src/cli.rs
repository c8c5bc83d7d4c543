use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wpsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative sync for HCP Waypoint projects, templates, actions and applications", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/wpsync/wpsync.toml)
    #[arg(short, long, global = true, env = "WPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// API token
    #[arg(long, global = true, env = "HCP_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update everything in the config, and remove what was dropped from it
    Apply(ApplyArgs),

    /// Show drift between the config and what exists remotely
    Status(StatusArgs),

    /// Delete everything wpsync created
    Destroy(DestroyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Number of projects reconciled in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Overwrite remote changes instead of reporting them as drift
    #[arg(long)]
    pub correct_drift: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Parser)]
pub struct StatusArgs {
    /// Number of projects checked in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// ============================================================================
// Destroy
// ============================================================================

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run - show what would be deleted
    #[arg(short, long)]
    pub dry_run: bool,

    /// Number of projects destroyed in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from(["wpsync", "-vv", "apply", "--dry-run", "-j", "8"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.dry_run);
                assert_eq!(args.jobs, Some(8));
                assert!(!args.correct_drift);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["wpsync", "destroy", "--yes", "--config", "/tmp/w.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
        assert!(matches!(cli.command, Command::Destroy(DestroyArgs { yes: true, .. })));
    }
}

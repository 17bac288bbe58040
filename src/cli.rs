//! CLI argument parsing.
//!
//! The CLI stays thin: each subcommand maps onto one workflow entry point.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ocm-image-sync",
    version,
    about = "Reconcile deployed container images with OCM component constructors",
    after_help = "Commands:\n  sync --scan <file> --apps-dir <dir>  Match images and update component constructors\n  chains --rgd <file>                  Derive chain links from a KRO ResourceGraphDefinition\n  config                               Print the default configuration\n\nExamples:\n  ocm-image-sync sync --scan scan.yaml --apps-dir ocm/apps --dry-run\n  ocm-image-sync chains --rgd kro-rgd.yaml --out chains.yaml\n  ocm-image-sync chains --rgd kro-rgd.yaml --out helm_oci_resource_mappings.csv\n  ocm-image-sync sync --scan scan.yaml --apps-dir ocm/apps --chains chains.yaml --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Sync(SyncArgs),
    Chains(ChainsArgs),
    Config(ConfigArgs),
}

/// Sync command inputs.
#[derive(Parser, Debug)]
#[command(about = "Match deployed images to components and update their constructors")]
pub struct SyncArgs {
    /// Cluster scan (YAML mapping with an `images` list)
    #[arg(long, value_name = "FILE")]
    pub scan: PathBuf,

    /// Directory holding one subdirectory per app
    #[arg(long, value_name = "DIR")]
    pub apps_dir: PathBuf,

    /// Chain links produced by `chains` (YAML, JSON, or CSV by `.csv` extension)
    #[arg(long, value_name = "FILE")]
    pub chains: Option<PathBuf>,

    /// Matcher and mutator configuration (YAML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Compute and report changes without writing any document
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the machine-readable report on stdout
    #[arg(long)]
    pub json: bool,

    /// Also write the machine-readable report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Export one CSV row per scanned image with its match
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Remove image entries of an app that this run no longer produces
    #[arg(long)]
    pub prune: bool,

    /// Worker threads for per-document processing (default: available parallelism)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,
}

/// Chains command inputs.
#[derive(Parser, Debug)]
#[command(about = "Derive HelmRelease → OCIRepository → Resource chain links")]
pub struct ChainsArgs {
    /// KRO ResourceGraphDefinition (YAML)
    #[arg(long, value_name = "FILE")]
    pub rgd: PathBuf,

    /// Write the chain links here instead of stdout (CSV when it ends in `.csv`)
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Emit links and summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Config command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the default configuration as YAML")]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn verbose_is_accepted_after_subcommand() {
        let args = RootArgs::try_parse_from([
            "ocm-image-sync",
            "sync",
            "--scan",
            "scan.yaml",
            "--apps-dir",
            "apps",
            "--verbose",
            "--jobs",
            "2",
            "--csv",
            "correlations.csv",
        ])
        .expect("parse");
        assert!(args.verbose);
        match args.command {
            Command::Sync(sync) => {
                assert_eq!(sync.jobs, Some(2));
                assert!(!sync.dry_run);
                assert_eq!(sync.csv, Some(PathBuf::from("correlations.csv")));
            }
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn sync_requires_scan_and_apps_dir() {
        assert!(RootArgs::try_parse_from(["ocm-image-sync", "sync", "--scan", "s.yaml"]).is_err());
    }
}

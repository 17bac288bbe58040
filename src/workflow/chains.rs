//! Chain mapping step.
use crate::cli::ChainsArgs;
use crate::document::write_atomic;
use crate::inputs::{chain_links_csv, is_csv};
use crate::kro::{links_yaml, load_rgd, ChainSummary};
use anyhow::{Context, Result};
use std::io::{self, Write};

/// Map a resource graph and emit its chain links.
///
/// Links go to `--out` when given (as CSV for a `.csv` path), else to
/// stdout as YAML; the summary then moves to stderr so stdout stays loadable
/// by `sync --chains`.
pub fn run_chains(args: &ChainsArgs) -> Result<()> {
    let mapping = load_rgd(&args.rgd)?;
    let yaml = links_yaml(&mapping.links)?;
    if let Some(out) = &args.out {
        if is_csv(out) {
            write_atomic(out, &chain_links_csv(&mapping.links)?)?;
        } else {
            write_atomic(out, &yaml)?;
        }
    }

    if args.json {
        let text = serde_json::to_string_pretty(&mapping).context("serialize chain mapping")?;
        println!("{text}");
        return Ok(());
    }
    match &args.out {
        Some(out) => {
            print_summary(&mapping.summary, &mut io::stdout())?;
            println!("links: {}", out.display());
        }
        None => {
            print!("{yaml}");
            print_summary(&mapping.summary, &mut io::stderr())?;
        }
    }
    Ok(())
}

fn print_summary(summary: &ChainSummary, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "helm releases: {}", summary.helm_releases)?;
    writeln!(out, "oci repositories: {}", summary.oci_repositories)?;
    writeln!(out, "resources: {}", summary.resources)?;
    writeln!(out, "complete chains: {}", summary.complete)?;
    writeln!(out, "partial chains: {}", summary.partial)?;
    if summary.unmapped_releases.is_empty() {
        writeln!(out, "unmapped releases: 0")?;
    } else {
        writeln!(
            out,
            "unmapped releases: {} ({})",
            summary.unmapped_releases.len(),
            summary.unmapped_releases.join(", ")
        )?;
    }
    Ok(())
}

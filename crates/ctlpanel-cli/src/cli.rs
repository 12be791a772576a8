use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ctlpanel")]
#[command(bin_name = "ctlpanel")]
#[command(version)]
#[command(about = "Inspect and exercise declarative control panels")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write a diagnostics log under ~/.config/ctlpanel/diagnostics.
    #[arg(long, global = true)]
    pub diagnostics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Print the partitioned step and section tree")]
    Inspect(PanelArgs),
    #[command(about = "Apply edits and report controls that fail validation")]
    Check(PanelArgs),
    #[command(about = "Print the review summary")]
    Summary(PanelArgs),
    #[command(about = "Print the commit payload as TOML")]
    Snapshot(PanelArgs),
}

#[derive(Debug, Args)]
pub struct PanelArgs {
    /// Control data file with a [[controls]] array.
    pub file: PathBuf,

    /// Edit applied before the command runs, as path=value. Repeatable;
    /// group members use group.index.key paths.
    #[arg(long = "set", value_name = "PATH=VALUE", value_parser = parse_edit)]
    pub edits: Vec<(String, String)>,
}

fn parse_edit(raw: &str) -> Result<(String, String)> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected PATH=VALUE, got {raw}"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(anyhow!("edit path must be non-empty"));
    }
    Ok((path.to_string(), value.to_string()))
}

//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Granary - resource catalog aggregation and content signing
#[derive(Parser, Debug)]
#[command(name = "granary")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to granary.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the catalog from in-progress package records and publish it
    Aggregate(AggregateArgs),

    /// Sign unsigned package artifacts and attach signature metadata
    Sign(SignArgs),

    /// Show the published catalog status
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Print the aggregated catalog to stdout as JSON
    #[arg(long)]
    pub json: bool,

    /// Override the configured record table directory
    #[arg(long, value_name = "DIR")]
    pub records_dir: Option<Utf8PathBuf>,

    /// Use filesystem blob storage rooted at this directory
    #[arg(long, value_name = "DIR")]
    pub blob_root: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct SignArgs {}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

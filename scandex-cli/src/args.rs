use std::path::PathBuf;

use clap::Parser;

/// scandex: import vulnerability scanner reports into the engagement store
#[derive(Parser, Debug)]
#[command(
    name = "scandex",
    version,
    about = "Normalize scanner report files into host, service and vulnerability records"
)]
pub struct Args {
    /// Report file to import (XML report or CSV export)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Asset group to assign imported hosts to
    #[arg(long = "asset-group", value_name = "NAME")]
    pub asset_group: Option<String>,

    /// Engineer to attribute imported hosts to
    #[arg(long, value_name = "NAME")]
    pub engineer: Option<String>,

    /// Merge new attributes into hosts that already exist (default: skip them)
    #[arg(long = "update-hosts")]
    pub update_hosts: bool,

    // --- Address filters ---
    /// File with newline-delimited addresses to exclude from the import
    #[arg(long = "exclude-ips", value_name = "FILE")]
    pub exclude_ips: Option<PathBuf>,

    /// File with newline-delimited addresses to import exclusively
    #[arg(long = "include-ips", value_name = "FILE")]
    pub include_ips: Option<PathBuf>,

    // --- Plugin handling ---
    /// Comma-separated plugin ids to exempt from fact extraction
    /// (overrides the config file and built-in defaults)
    #[arg(long = "ignore-plugins", value_name = "IDS")]
    pub ignore_plugins: Option<String>,

    // --- Storage / config ---
    /// Database path (default: ~/.scandex/scandex.db)
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.scandex/scandex.toml if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity level (use -v or -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

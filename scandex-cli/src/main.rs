mod args;
mod config;

use std::collections::HashSet;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::Args;
use scandex_db::DataStore;
use scandex_ingest::{BulkImportConfig, IngestConfig, IngestEngine, DEFAULT_IGNORED_PLUGINS};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing based on verbosity
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Config file: explicit path must exist; the default path is optional
    let file_config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => {
            let path = config::default_config_path();
            if path.is_file() {
                config::load_config(&path)?
            } else {
                config::FileConfig::default()
            }
        }
    };

    let ingest_config = build_ingest_config(&args, &file_config)?;

    let store = match &args.db {
        Some(path) => DataStore::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?,
        None => DataStore::open_default().context("failed to open default database")?,
    };

    info!(file = %args.file.display(), "starting import");
    let engine = IngestEngine::new(&store, ingest_config);
    let summary = engine
        .run(&args.file)
        .with_context(|| format!("import of {} failed", args.file.display()))?;

    println!("{summary}");
    Ok(())
}

/// Merge CLI flags, the config file, and built-in defaults (in that
/// order of precedence) into the engine's run settings.
fn build_ingest_config(
    args: &Args,
    file_config: &config::FileConfig,
) -> Result<IngestConfig> {
    let ignored_plugins: HashSet<u32> = if let Some(spec) = &args.ignore_plugins {
        parse_plugin_ids(spec)?
    } else if let Some(ids) = &file_config.ignored_plugins {
        ids.iter().copied().collect()
    } else {
        DEFAULT_IGNORED_PLUGINS.iter().copied().collect()
    };

    let ip_exclude_list = args
        .exclude_ips
        .as_deref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read exclude list {}", path.display()))
        })
        .transpose()?;
    let ip_include_list = args
        .include_ips
        .as_deref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read include list {}", path.display()))
        })
        .transpose()?;

    let bulk_import = file_config.bulk_import.as_ref().map(|section| BulkImportConfig {
        url: section.url.clone(),
        api_key: section.api_key.clone(),
        workspace: section
            .workspace
            .clone()
            .unwrap_or_else(|| "default".to_string()),
    });

    Ok(IngestConfig {
        asset_group: args.asset_group.clone(),
        engineer: args.engineer.clone(),
        update_hosts: args.update_hosts,
        ip_exclude_list,
        ip_include_list,
        ignored_plugins,
        bulk_import,
    })
}

fn parse_plugin_ids(spec: &str) -> Result<HashSet<u32>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .with_context(|| format!("invalid plugin id '{s}' in --ignore-plugins"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Post-import bulk upload
// ---------------------------------------------------------------------------
//
// Ships the raw report to an external import API after the local pass
// completes. Best-effort only: the caller logs failures and the import
// result stands regardless. Feature-gated behind "bulk-import"
// (requires reqwest).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::engine::BulkImportConfig;

/// POST the report content, workspace id, and exclusion list to the
/// configured endpoint.
pub(crate) fn submit(config: &BulkImportConfig, path: &Path, exclude_list: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read report {} for upload", path.display()))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("scandex-ingest/0.2")
        .build()
        .context("failed to create HTTP client")?;

    let body = serde_json::json!({
        "workspace": config.workspace,
        "data": content,
        "blacklist_hosts": exclude_list,
    });

    let response = client
        .post(&config.url)
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .context("bulk import request failed")?;

    if !response.status().is_success() {
        bail!("bulk import endpoint returned {}", response.status());
    }

    info!(url = %config.url, workspace = %config.workspace, "report submitted for bulk import");
    Ok(())
}

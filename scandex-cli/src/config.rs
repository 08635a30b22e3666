use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Optional settings loaded from `scandex.toml`.
///
/// All fields are optional; `None` means "use the built-in default."
/// Command-line flags take precedence over anything set here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Plugin ids exempt from fact extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_plugins: Option<Vec<u32>>,

    /// Post-import bulk upload endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_import: Option<BulkImportSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkImportSection {
    pub url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("scandex").join("scandex.toml")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".scandex").join("scandex.toml")
    }
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: FileConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.ignored_plugins.is_none());
        assert!(config.bulk_import.is_none());
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
ignored_plugins = [19506, 10287]

[bulk_import]
url = "https://msf.lab.local/api/v1/pro/import"
api_key = "secret"
workspace = "external"
"#;
        let config: FileConfig = toml::from_str(text).unwrap();
        assert_eq!(config.ignored_plugins.unwrap(), vec![19506, 10287]);
        let bulk = config.bulk_import.unwrap();
        assert_eq!(bulk.workspace.as_deref(), Some("external"));
    }
}

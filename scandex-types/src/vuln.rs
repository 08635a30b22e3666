use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a service-vulnerability occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VulnStatus {
    /// Exploitable weakness on an identified service.
    Vulnerable,
    /// A public exploit is known to exist.
    VulnerableExploited,
    /// Informational: no identifiable service or zero severity.
    General,
}

impl fmt::Display for VulnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulnStatus::Vulnerable => write!(f, "vulnerable"),
            VulnStatus::VulnerableExploited => write!(f, "vulnerable-exploited"),
            VulnStatus::General => write!(f, "general"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown vulnerability status: {0}")]
pub struct VulnStatusParseError(String);

impl FromStr for VulnStatus {
    type Err = VulnStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vulnerable" => Ok(VulnStatus::Vulnerable),
            "vulnerable-exploited" => Ok(VulnStatus::VulnerableExploited),
            "general" => Ok(VulnStatus::General),
            other => Err(VulnStatusParseError(other.to_string())),
        }
    }
}

/// Canonical vulnerability attributes keyed by the scanner's plugin id.
///
/// Created once per plugin id; later findings for the same plugin reuse
/// the stored record without overwriting these attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnData {
    pub plugin_id: u32,
    pub title: String,
    /// Scanner severity on the 0 (informational) to 4 (critical) scale.
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cve_refs: Vec<String>,
}

/// A stored canonical vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnRecord {
    pub id: i64,
    pub plugin_id: u32,
    pub title: String,
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cve_refs: Vec<String>,
}

/// One occurrence of a vulnerability on a service, with proof text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceVuln {
    pub service_id: i64,
    pub vuln_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    pub status: VulnStatus,
}

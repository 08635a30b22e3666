use std::collections::HashMap;

use scandex_db::{DataStore, DbError};
use scandex_types::VulnData;
use tracing::debug;

use crate::report::RawFinding;

/// Per-run finding counters. `processed` counts every finding whose
/// plugin id parsed; `added` counts newly created service-vuln links and
/// is incremented by the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct VulnStats {
    pub processed: usize,
    pub added: usize,
}

/// Resolves findings to canonical vulnerability records, keyed by
/// plugin id. The first occurrence creates the record; later ones reuse
/// it without overwriting attributes.
#[derive(Default)]
pub(crate) struct VulnNormalizer {
    cache: HashMap<u32, i64>,
    pub stats: VulnStats,
}

impl VulnNormalizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Resolve a finding to `(plugin_id, vuln_id)`, or `None` when the
    /// plugin id does not parse (finding-level skip, not an error).
    pub(crate) fn resolve(
        &mut self,
        finding: &RawFinding,
        store: &DataStore,
    ) -> Result<Option<(u32, i64)>, DbError> {
        let plugin_id: u32 = match finding.plugin_id.trim().parse() {
            Ok(id) => id,
            Err(_) => {
                debug!(plugin = %finding.plugin_id, "finding skipped: unparsable plugin id");
                return Ok(None);
            }
        };

        self.stats.processed += 1;

        if let Some(&vuln_id) = self.cache.get(&plugin_id) {
            return Ok(Some((plugin_id, vuln_id)));
        }

        let vuln_id = match store.get_vuln_by_plugin(plugin_id)? {
            Some(existing) => existing.id,
            None => store.create_vuln(&VulnData {
                plugin_id,
                title: finding.plugin_name.clone(),
                severity: finding.severity,
                synopsis: finding.synopsis.clone(),
                description: finding.description.clone(),
                solution: finding.solution.clone(),
                cvss_score: finding.cvss_score,
                cve_refs: finding.cve_refs.clone(),
            })?,
        };

        self.cache.insert(plugin_id, vuln_id);
        Ok(Some((plugin_id, vuln_id)))
    }
}

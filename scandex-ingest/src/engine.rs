use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use scandex_db::DataStore;
use scandex_types::{PluginFact, Protocol, ServiceRecord};
use tracing::{info, warn};

use crate::hosts::{parse_address_list, HostNormalizer, HostStats};
use crate::report::{self, RawFinding, RawHostUnit};
use crate::rules::RuleTable;
use crate::services::{name_stem, resolve_service};
use crate::status::classify_status;
use crate::vulns::{VulnNormalizer, VulnStats};
use crate::IngestError;

/// Plugins whose findings are informational noise: vulnerability and
/// service records are still written, but no facts are mined from them.
pub const DEFAULT_IGNORED_PLUGINS: &[u32] = &[
    19506, // Scan information
    10287, // Traceroute information
    12053, // Host FQDN resolution
];

/// Certainty weight recorded for CPE-derived OS references.
const OS_REF_CERTAINTY: f64 = 0.90;

/// Endpoint settings for the optional post-import bulk upload.
#[derive(Debug, Clone)]
pub struct BulkImportConfig {
    pub url: String,
    pub api_key: String,
    pub workspace: String,
}

/// Run-level import settings.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Asset group stamped onto imported hosts.
    pub asset_group: Option<String>,
    /// Engineer stamped onto imported hosts.
    pub engineer: Option<String>,
    /// Merge new attributes into hosts that already exist. When false,
    /// existing hosts are left untouched (their findings still import).
    pub update_hosts: bool,
    /// Newline-delimited addresses to exclude. Exclusion wins over
    /// inclusion when both lists name an address.
    pub ip_exclude_list: Option<String>,
    /// Newline-delimited addresses to import exclusively.
    pub ip_include_list: Option<String>,
    /// Plugin ids exempt from fact extraction.
    pub ignored_plugins: HashSet<u32>,
    /// Best-effort upload of the raw report after the import completes.
    pub bulk_import: Option<BulkImportConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            asset_group: None,
            engineer: None,
            update_hosts: false,
            ip_exclude_list: None,
            ip_include_list: None,
            ignored_plugins: DEFAULT_IGNORED_PLUGINS.iter().copied().collect(),
            bulk_import: None,
        }
    }
}

/// Final counters for one import run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSummary {
    pub hosts: HostStats,
    pub vulns: VulnStats,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Import complete: hosts: {} added, {} updated, {} skipped - {} vulns processed, {} added",
            self.hosts.added,
            self.hosts.updated,
            self.hosts.skipped,
            self.vulns.processed,
            self.vulns.added
        )
    }
}

/// Drives one report file through detection, normalization, status
/// classification and fact extraction, one host and one finding at a
/// time.
pub struct IngestEngine<'a> {
    store: &'a DataStore,
    config: IngestConfig,
    rules: RuleTable,
}

impl<'a> IngestEngine<'a> {
    pub fn new(store: &'a DataStore, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            rules: RuleTable::new(),
        }
    }

    /// Process a report file and return the run summary.
    ///
    /// The only fatal error paths are an unreadable file, a malformed
    /// XML document, and database failures. Everything else degrades to
    /// a skipped host, a skipped finding, or a skipped fact.
    pub fn run(&self, path: &Path) -> Result<IngestSummary, IngestError> {
        info!(file = %path.display(), "processing scan report");

        let (format, reader) = report::open_report(path)?;
        info!(?format, "report dialect identified");

        let exclude = self
            .config
            .ip_exclude_list
            .as_deref()
            .map(parse_address_list)
            .unwrap_or_default();
        let include = self
            .config
            .ip_include_list
            .as_deref()
            .map(parse_address_list)
            .filter(|set| !set.is_empty());

        let mut hosts = HostNormalizer::new(
            self.config.engineer.clone(),
            self.config.asset_group.clone(),
            exclude,
            include,
            self.config.update_hosts,
        );
        let mut vulns = VulnNormalizer::new();

        for unit in reader {
            let unit = match unit {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(error = %e, "report row skipped");
                    continue;
                }
            };

            let Some(host_id) = hosts.resolve(&unit, self.store)? else {
                continue;
            };

            for finding in &unit.findings {
                if let Err(e) = self.process_finding(host_id, &unit, finding, &mut vulns) {
                    warn!(error = %e, plugin = %finding.plugin_id, "finding skipped");
                }
            }
        }

        // Post-import passes run exactly once for the whole file.
        self.store.correlate_exploits()?;
        self.store
            .recompute_host_status(self.config.asset_group.as_deref())?;

        if let Some(bulk) = &self.config.bulk_import {
            self.submit_bulk_import(bulk, path);
        }

        let summary = IngestSummary {
            hosts: hosts.stats,
            vulns: vulns.stats,
        };
        info!(%summary, "import finished");
        Ok(summary)
    }

    fn process_finding(
        &self,
        host_id: i64,
        unit: &RawHostUnit,
        finding: &RawFinding,
        vulns: &mut VulnNormalizer,
    ) -> Result<(), IngestError> {
        let Some((plugin_id, vuln_id)) = vulns.resolve(finding, self.store)? else {
            return Ok(());
        };

        let protocol: Protocol = finding.protocol.parse().map_err(|_| {
            IngestError::InvalidReport(format!("unknown protocol {:?}", finding.protocol))
        })?;

        let service = resolve_service(
            self.store,
            host_id,
            protocol,
            finding.port,
            &finding.svc_name,
        )?;

        let status = classify_status(
            finding.exploit_available,
            name_stem(&finding.svc_name),
            finding.severity,
        );
        let proof = (!finding.plugin_output.is_empty()).then_some(finding.plugin_output.as_str());
        if self
            .store
            .upsert_service_vuln(service.id, vuln_id, proof, status)?
        {
            vulns.stats.added += 1;
        }

        // Ignored plugins keep their vulnerability and service records;
        // only the fact extraction is suppressed.
        if self.config.ignored_plugins.contains(&plugin_id) {
            return Ok(());
        }

        for fact in self.rules.apply(plugin_id, &finding.plugin_output) {
            self.record_fact(host_id, &service, unit, fact)?;
        }
        Ok(())
    }

    /// Write one extracted fact through the store, honoring each fact's
    /// append-many vs upsert-replace cardinality.
    fn record_fact(
        &self,
        host_id: i64,
        service: &ServiceRecord,
        unit: &RawHostUnit,
        fact: PluginFact,
    ) -> Result<(), IngestError> {
        match fact {
            PluginFact::SnmpCommunity(community) => {
                self.store.add_snmp_community(host_id, &community)?;
            }
            PluginFact::SmbAccount {
                username,
                gid,
                source,
            } => {
                self.store
                    .upsert_account(service.id, &username, gid, source)?;
            }
            PluginFact::SmbPasswordPolicy {
                lockout_duration,
                lockout_limit,
            } => {
                self.store
                    .set_netbios_policy(host_id, lockout_duration, lockout_limit)?;
            }
            PluginFact::SmbShares(shares) => {
                self.store.set_netbios_shares(host_id, &shares)?;
            }
            PluginFact::NetbiosDomain(domain) => {
                self.store.set_netbios_domain(host_id, &domain)?;
            }
            PluginFact::ServiceBanner(banner) => {
                self.store.set_service_banner(service.id, &banner)?;
            }
            PluginFact::ServiceInfo { key, value } => {
                self.store.upsert_service_info(service.id, &key, &value)?;
            }
            PluginFact::OsReference(stem) => {
                // Only stems the OS catalog can resolve become references.
                // The device class comes from the XML host properties and
                // is absent on the CSV paths.
                match self.store.lookup_cpe_os(&stem)? {
                    Some(os_id) => {
                        self.store.upsert_host_os_ref(
                            host_id,
                            os_id,
                            OS_REF_CERTAINTY,
                            Some("Unknown"),
                            unit.system_type.as_deref(),
                        )?;
                    }
                    None => {
                        warn!(cpe = %stem, "no OS definition for CPE reference");
                    }
                }
            }
        }
        Ok(())
    }

    #[cfg(feature = "bulk-import")]
    fn submit_bulk_import(&self, bulk: &BulkImportConfig, path: &Path) {
        let exclude = self.config.ip_exclude_list.as_deref().unwrap_or("");
        if let Err(e) = crate::bulk::submit(bulk, path, exclude) {
            warn!(error = %e, "bulk import failed; import results are unaffected");
        }
    }

    #[cfg(not(feature = "bulk-import"))]
    fn submit_bulk_import(&self, _bulk: &BulkImportConfig, _path: &Path) {
        warn!("bulk import requires the 'bulk-import' feature (reqwest)");
    }
}

use std::collections::HashMap;

use regex::Regex;
use scandex_types::PluginFact;
use tracing::warn;

/// Error raised inside a single extraction rule. Never escapes the rule
/// table: `RuleTable::apply` logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RuleError {
    #[error("expected pattern not found: {0}")]
    PatternNotFound(&'static str),
    #[error("banner markers missing or out of order")]
    BadMarkers,
}

/// One plugin-output extraction rule.
///
/// Rules are pure: they read the free-text output and return facts. No
/// rule depends on another rule's output, and a failing rule must not
/// affect the finding it was invoked for.
trait PluginRule {
    fn name(&self) -> &'static str;
    fn extract(&self, plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError>;
}

/// Table mapping plugin id to its extraction rule.
pub(crate) struct RuleTable {
    rules: HashMap<u32, Box<dyn PluginRule>>,
}

impl RuleTable {
    pub(crate) fn new() -> Self {
        let mut rules: HashMap<u32, Box<dyn PluginRule>> = HashMap::new();

        // SNMP community string enumeration
        rules.insert(10264, Box::new(SnmpCommunities::new()));
        // SMB host SID (10860) / domain SID (10399) user enumeration
        rules.insert(10860, Box::new(SmbSidUsers::new()));
        rules.insert(10399, Box::new(SmbSidUsers::new()));
        // SMB password policy
        rules.insert(17651, Box::new(SmbPasswordPolicy::new()));
        // SMB share enumeration
        rules.insert(10395, Box::new(SmbShares::new()));
        // NetBIOS remote host information disclosure
        rules.insert(10150, Box::new(NetbiosDisclosure::new()));
        // FTP server detection
        rules.insert(10092, Box::new(FtpBanner::new()));
        // SSH server type and version
        rules.insert(10267, Box::new(SshBanner::new()));
        // SSH protocol versions supported
        rules.insert(10881, Box::new(SshVersionInfo::new()));
        // Telnet banner, two plugin variants
        rules.insert(10281, Box::new(TelnetBanner));
        rules.insert(42263, Box::new(TelnetBanner));
        // HTTP server type and version
        rules.insert(10107, Box::new(HttpBanner::new()));
        // Common Platform Enumeration OS identifiers
        rules.insert(45590, Box::new(CpeOsList::new()));

        Self { rules }
    }

    /// Run the rule registered for `plugin_id`, if any.
    ///
    /// This is the isolated fallible step: an extraction error is logged
    /// and yields no facts, never an error to the caller.
    pub(crate) fn apply(&self, plugin_id: u32, output: &str) -> Vec<PluginFact> {
        let Some(rule) = self.rules.get(&plugin_id) else {
            return Vec::new();
        };
        match rule.extract(plugin_id, output) {
            Ok(facts) => facts,
            Err(e) => {
                warn!(plugin_id, rule = rule.name(), error = %e, "plugin output extraction failed");
                Vec::new()
            }
        }
    }
}

/// Capture every ` - <item>` list entry, a layout shared by several
/// plugin outputs.
fn list_items(pattern: &Regex, output: &str) -> Vec<String> {
    pattern
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

// --- SNMP ---

struct SnmpCommunities {
    item: Regex,
}

impl SnmpCommunities {
    fn new() -> Self {
        Self {
            item: Regex::new(r" - (.*)").unwrap(),
        }
    }
}

impl PluginRule for SnmpCommunities {
    fn name(&self) -> &'static str {
        "snmp-communities"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        Ok(list_items(&self.item, output)
            .into_iter()
            .map(PluginFact::SnmpCommunity)
            .collect())
    }
}

// --- SMB / NetBIOS ---

struct SmbSidUsers {
    item: Regex,
    gid: Regex,
}

impl SmbSidUsers {
    fn new() -> Self {
        Self {
            item: Regex::new(r" - (.*)").unwrap(),
            gid: Regex::new(r"\(id (\d+)").unwrap(),
        }
    }
}

impl PluginRule for SmbSidUsers {
    fn name(&self) -> &'static str {
        "smb-sid-users"
    }

    fn extract(&self, plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let mut facts = Vec::new();
        for entry in list_items(&self.item, output) {
            // Entries look like "bob (id 1001)"; the group id defaults
            // to 0 when the suffix is absent or malformed.
            let username = match entry.find('(') {
                Some(pos) => entry[..pos].trim_end(),
                None => entry.trim_end(),
            };
            if username.is_empty() {
                continue;
            }
            let gid = self
                .gid
                .captures(&entry)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            facts.push(PluginFact::SmbAccount {
                username: username.to_string(),
                gid,
                source: plugin_id,
            });
        }
        Ok(facts)
    }
}

struct SmbPasswordPolicy {
    duration: Regex,
    limit: Regex,
}

impl SmbPasswordPolicy {
    fn new() -> Self {
        Self {
            duration: Regex::new(r"Locked account time \(s\): (\d+)").unwrap(),
            limit: Regex::new(r"Number of invalid logon before locked out \(s\): (\d+)").unwrap(),
        }
    }
}

impl PluginRule for SmbPasswordPolicy {
    fn name(&self) -> &'static str {
        "smb-password-policy"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let duration = self
            .duration
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        let limit = self
            .limit
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        // When either value is unparsable, fall back to the scanner's
        // documented defaults for both.
        let (lockout_duration, lockout_limit) = match (duration, limit) {
            (Some(d), Some(l)) => (d, l),
            _ => (1800, 0),
        };
        Ok(vec![PluginFact::SmbPasswordPolicy {
            lockout_duration,
            lockout_limit,
        }])
    }
}

struct SmbShares {
    item: Regex,
}

impl SmbShares {
    fn new() -> Self {
        Self {
            item: Regex::new(r" - (.*)").unwrap(),
        }
    }
}

impl PluginRule for SmbShares {
    fn name(&self) -> &'static str {
        "smb-shares"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let shares = list_items(&self.item, output);
        if shares.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![PluginFact::SmbShares(shares)])
    }
}

struct NetbiosDisclosure {
    domain: Regex,
}

impl NetbiosDisclosure {
    fn new() -> Self {
        Self {
            domain: Regex::new(r"(\w+)\s*= Workgroup / Domain name").unwrap(),
        }
    }
}

impl PluginRule for NetbiosDisclosure {
    fn name(&self) -> &'static str {
        "netbios-disclosure"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        // Absence of the workgroup line is normal and not an error.
        Ok(self
            .domain
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| vec![PluginFact::NetbiosDomain(m.as_str().to_string())])
            .unwrap_or_default())
    }
}

// --- Banners ---

struct FtpBanner {
    banner: Regex,
}

impl FtpBanner {
    fn new() -> Self {
        Self {
            banner: Regex::new(r"(?s)The remote FTP banner is :\n\n(.*)").unwrap(),
        }
    }
}

impl PluginRule for FtpBanner {
    fn name(&self) -> &'static str {
        "ftp-banner"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let banner = self
            .banner
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end().to_string())
            .ok_or(RuleError::PatternNotFound("FTP banner"))?;
        Ok(vec![
            PluginFact::ServiceBanner(banner.clone()),
            PluginFact::ServiceInfo {
                key: "ftp.banner".to_string(),
                value: banner,
            },
        ])
    }
}

struct SshBanner {
    pair: Regex,
}

impl SshBanner {
    fn new() -> Self {
        Self {
            pair: Regex::new(r"SSH version : (.*)\nSSH supported authentication : (.*)").unwrap(),
        }
    }
}

impl PluginRule for SshBanner {
    fn name(&self) -> &'static str {
        "ssh-banner"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let caps = self
            .pair
            .captures(output)
            .ok_or(RuleError::PatternNotFound("SSH version / authentication"))?;
        let banner = caps[1].trim_end().to_string();
        let auth = caps[2].trim_end().to_string();
        Ok(vec![
            PluginFact::ServiceBanner(banner.clone()),
            PluginFact::ServiceInfo {
                key: "ssh.banner".to_string(),
                value: banner,
            },
            PluginFact::ServiceInfo {
                key: "ssh.authentication".to_string(),
                value: auth,
            },
        ])
    }
}

struct SshVersionInfo {
    item: Regex,
    fingerprint: Regex,
}

impl SshVersionInfo {
    fn new() -> Self {
        Self {
            item: Regex::new(r" - (.*)").unwrap(),
            fingerprint: Regex::new(r"SSHv2 host key fingerprint : (.*)").unwrap(),
        }
    }
}

impl PluginRule for SshVersionInfo {
    fn name(&self) -> &'static str {
        "ssh-version-info"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let mut facts = Vec::new();
        let versions = list_items(&self.item, output);
        if !versions.is_empty() {
            facts.push(PluginFact::ServiceInfo {
                key: "ssh.versions".to_string(),
                value: versions.join(", "),
            });
        }
        if let Some(caps) = self.fingerprint.captures(output) {
            facts.push(PluginFact::ServiceInfo {
                key: "ssh.fingerprint".to_string(),
                value: caps[1].trim_end().to_string(),
            });
        }
        Ok(facts)
    }
}

/// Telnet banners are fenced between two identical `snip` marker lines.
struct TelnetBanner;

impl PluginRule for TelnetBanner {
    fn name(&self) -> &'static str {
        "telnet-banner"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let lines: Vec<&str> = output.lines().collect();
        let marker_indices: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains("snip ---"))
            .map(|(i, _)| i)
            .collect();

        let (first, last) = match (marker_indices.first(), marker_indices.last()) {
            (Some(&first), Some(&last)) if last > first => (first, last),
            _ => return Err(RuleError::BadMarkers),
        };

        let banner = lines[first + 1..last].join("\n");
        Ok(vec![PluginFact::ServiceBanner(banner)])
    }
}

struct HttpBanner {
    banner: Regex,
}

impl HttpBanner {
    fn new() -> Self {
        Self {
            banner: Regex::new(r"(?s)The remote web server type is :\n\n(.*)").unwrap(),
        }
    }
}

impl PluginRule for HttpBanner {
    fn name(&self) -> &'static str {
        "http-banner"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        let banner = self
            .banner
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end().to_string())
            .ok_or(RuleError::PatternNotFound("HTTP server banner"))?;
        Ok(vec![
            PluginFact::ServiceBanner(banner.clone()),
            PluginFact::ServiceInfo {
                key: "http.banner.server".to_string(),
                value: banner,
            },
        ])
    }
}

// --- Operating systems ---

struct CpeOsList {
    item: Regex,
}

impl CpeOsList {
    fn new() -> Self {
        Self {
            item: Regex::new(r"(cpe:/o:.*)").unwrap(),
        }
    }
}

impl PluginRule for CpeOsList {
    fn name(&self) -> &'static str {
        "cpe-os-list"
    }

    fn extract(&self, _plugin_id: u32, output: &str) -> Result<Vec<PluginFact>, RuleError> {
        Ok(self
            .item
            .captures_iter(output)
            .filter_map(|c| c.get(1))
            .map(|m| {
                let stem = m
                    .as_str()
                    .trim_start_matches("cpe:/o:")
                    .trim_end()
                    .to_string();
                PluginFact::OsReference(stem)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuleTable {
        RuleTable::new()
    }

    #[test]
    fn unknown_plugin_yields_nothing() {
        assert!(table().apply(99999, "anything").is_empty());
    }

    #[test]
    fn snmp_communities_extracted_per_line() {
        let output = "The remote SNMP server replies to the following communities :\n\n - public\n - private\n";
        let facts = table().apply(10264, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::SnmpCommunity("public".into()),
                PluginFact::SnmpCommunity("private".into()),
            ]
        );
    }

    #[test]
    fn smb_sid_users_with_group_ids() {
        let output = " - bob (id 1001)\n - alice (id 1002)";
        let facts = table().apply(10860, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::SmbAccount {
                    username: "bob".into(),
                    gid: 1001,
                    source: 10860,
                },
                PluginFact::SmbAccount {
                    username: "alice".into(),
                    gid: 1002,
                    source: 10860,
                },
            ]
        );
    }

    #[test]
    fn smb_sid_users_gid_defaults_to_zero() {
        let facts = table().apply(10399, " - guest\n");
        assert_eq!(
            facts,
            vec![PluginFact::SmbAccount {
                username: "guest".into(),
                gid: 0,
                source: 10399,
            }]
        );
    }

    #[test]
    fn password_policy_parses_both_values() {
        let output = "Locked account time (s): 900\nNumber of invalid logon before locked out (s): 5\n";
        let facts = table().apply(17651, output);
        assert_eq!(
            facts,
            vec![PluginFact::SmbPasswordPolicy {
                lockout_duration: 900,
                lockout_limit: 5,
            }]
        );
    }

    #[test]
    fn password_policy_defaults_when_unparsable() {
        let facts = table().apply(17651, "no policy lines here");
        assert_eq!(
            facts,
            vec![PluginFact::SmbPasswordPolicy {
                lockout_duration: 1800,
                lockout_limit: 0,
            }]
        );
    }

    #[test]
    fn smb_shares_collected_into_one_fact() {
        let output = "Here are the SMB shares :\n\n - ADMIN$\n - C$\n - backup\n";
        let facts = table().apply(10395, output);
        assert_eq!(
            facts,
            vec![PluginFact::SmbShares(vec![
                "ADMIN$".into(),
                "C$".into(),
                "backup".into(),
            ])]
        );
    }

    #[test]
    fn netbios_domain_extracted() {
        let output = "The following 2 NetBIOS names have been gathered :\n\n  WORKGROUP        = Workgroup / Domain name\n  WEB01            = Computer name\n";
        let facts = table().apply(10150, output);
        assert_eq!(facts, vec![PluginFact::NetbiosDomain("WORKGROUP".into())]);
    }

    #[test]
    fn netbios_domain_absent_is_silent() {
        assert!(table().apply(10150, "no names gathered").is_empty());
    }

    #[test]
    fn ftp_banner_captures_to_end_of_output() {
        let output = "The remote FTP banner is :\n\nvsFTPd 3.0.3";
        let facts = table().apply(10092, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::ServiceBanner("vsFTPd 3.0.3".into()),
                PluginFact::ServiceInfo {
                    key: "ftp.banner".into(),
                    value: "vsFTPd 3.0.3".into(),
                },
            ]
        );
    }

    #[test]
    fn ftp_banner_missing_yields_nothing() {
        assert!(table().apply(10092, "nothing of interest").is_empty());
    }

    #[test]
    fn ssh_banner_and_auth_methods() {
        let output = "SSH version : SSH-2.0-OpenSSH_8.9p1\nSSH supported authentication : publickey,password\n";
        let facts = table().apply(10267, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::ServiceBanner("SSH-2.0-OpenSSH_8.9p1".into()),
                PluginFact::ServiceInfo {
                    key: "ssh.banner".into(),
                    value: "SSH-2.0-OpenSSH_8.9p1".into(),
                },
                PluginFact::ServiceInfo {
                    key: "ssh.authentication".into(),
                    value: "publickey,password".into(),
                },
            ]
        );
    }

    #[test]
    fn ssh_versions_joined_and_fingerprint_captured() {
        let output = "The remote SSH daemon supports the following versions :\n\n - 1.99\n - 2.0\n\nSSHv2 host key fingerprint : ab:cd:ef:01:23:45\n";
        let facts = table().apply(10881, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::ServiceInfo {
                    key: "ssh.versions".into(),
                    value: "1.99, 2.0".into(),
                },
                PluginFact::ServiceInfo {
                    key: "ssh.fingerprint".into(),
                    value: "ab:cd:ef:01:23:45".into(),
                },
            ]
        );
    }

    #[test]
    fn ssh_version_info_partial_output_emits_partial_facts() {
        let facts = table().apply(10881, " - 2.0\n");
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0],
            PluginFact::ServiceInfo {
                key: "ssh.versions".into(),
                value: "2.0".into(),
            }
        );
    }

    #[test]
    fn telnet_banner_between_markers() {
        let output = "Here is the banner :\n\
                      ------------------------------ snip ------------------------------\n\
                      Ubuntu 22.04 LTS\n\
                      login:\n\
                      ------------------------------ snip ------------------------------\n";
        let facts = table().apply(10281, output);
        assert_eq!(
            facts,
            vec![PluginFact::ServiceBanner("Ubuntu 22.04 LTS\nlogin:".into())]
        );
    }

    #[test]
    fn telnet_missing_markers_yields_nothing() {
        // One marker or none is an extraction error; apply() swallows it.
        assert!(table()
            .apply(42263, "------------------------------ snip ------------------------------\n")
            .is_empty());
        assert!(table().apply(10281, "no markers at all").is_empty());
    }

    #[test]
    fn http_banner_extracted() {
        let output = "The remote web server type is :\n\nnginx/1.24.0";
        let facts = table().apply(10107, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::ServiceBanner("nginx/1.24.0".into()),
                PluginFact::ServiceInfo {
                    key: "http.banner.server".into(),
                    value: "nginx/1.24.0".into(),
                },
            ]
        );
    }

    #[test]
    fn cpe_os_entries_stripped_of_prefix() {
        let output = "The remote operating system matched the following CPE :\n\n  cpe:/o:linux:linux_kernel:5.15 \n  cpe:/o:canonical:ubuntu_linux:22.04\n";
        let facts = table().apply(45590, output);
        assert_eq!(
            facts,
            vec![
                PluginFact::OsReference("linux:linux_kernel:5.15".into()),
                PluginFact::OsReference("canonical:ubuntu_linux:22.04".into()),
            ]
        );
    }
}

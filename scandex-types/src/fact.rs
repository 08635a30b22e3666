use serde::{Deserialize, Serialize};

/// A structured fact mined from a finding's free-text plugin output.
///
/// Facts are heterogeneous: some are host-scoped, some service-scoped;
/// some accumulate across imports (SNMP communities, accounts) while
/// others replace the previous value (banners, NetBIOS metadata). The
/// coordinator interprets each variant and issues the matching store
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginFact {
    /// An SNMP community string. Host-scoped, append-many.
    SnmpCommunity(String),
    /// A user account enumerated over SMB. Service-scoped, append-many.
    /// `source` is the plugin id that produced the account.
    SmbAccount { username: String, gid: u32, source: u32 },
    /// SMB password lockout policy. Host-scoped NetBIOS singleton.
    SmbPasswordPolicy {
        lockout_duration: u32,
        lockout_limit: u32,
    },
    /// Enumerated SMB share names. Host-scoped NetBIOS singleton.
    SmbShares(Vec<String>),
    /// Workgroup / domain name disclosed over NetBIOS. Host-scoped singleton.
    NetbiosDomain(String),
    /// Raw banner for the service the finding was reported against.
    ServiceBanner(String),
    /// A named key/value service attribute (e.g., `ssh.fingerprint`).
    ServiceInfo { key: String, value: String },
    /// A CPE OS platform identifier (stem, `cpe:/o:` prefix stripped).
    /// Resolved to a stored OS definition by the coordinator.
    OsReference(String),
}

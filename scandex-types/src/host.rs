use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Host attributes as extracted from a report, before the store has
/// assigned an identity.
///
/// `engineer` and `asset_group` are run-level metadata stamped onto every
/// host in an import; the rest comes from the report itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostData {
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netbios_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<String>,
    /// Operating system guess as reported by the scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    /// Scanner's device-class guess (e.g., "general-purpose"). XML only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engineer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_group: Option<String>,
}

impl HostData {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            fqdn: None,
            netbios_name: None,
            mac_addr: None,
            os_name: None,
            system_type: None,
            engineer: None,
            asset_group: None,
        }
    }
}

/// A host as stored, keyed by its primary address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: i64,
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netbios_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engineer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn host_data_none_fields_skipped_in_json() {
        let host = HostData::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        let json = serde_json::to_string(&host).unwrap();
        assert!(!json.contains("fqdn"));
        assert!(!json.contains("netbios_name"));

        // Old JSON without the optional fields should deserialize cleanly
        let old_json = r#"{"ip":"10.0.0.5"}"#;
        let parsed: HostData = serde_json::from_str(old_json).unwrap();
        assert!(parsed.fqdn.is_none());
        assert!(parsed.asset_group.is_none());
    }

    #[test]
    fn host_record_serde_roundtrip() {
        let rec = HostRecord {
            id: 7,
            ip: "192.168.1.20".parse().unwrap(),
            fqdn: Some("web01.lab.local".into()),
            netbios_name: Some("WEB01".into()),
            mac_addr: None,
            os_name: Some("Linux Kernel 5.15".into()),
            system_type: Some("general-purpose".into()),
            engineer: Some("kgrutzm".into()),
            asset_group: Some("external".into()),
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: HostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.fqdn.as_deref(), Some("web01.lab.local"));
        assert_eq!(back.ip, rec.ip);
    }
}

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use scandex_db::{DataStore, DbError};
use scandex_types::HostData;
use tracing::{debug, warn};

use crate::report::RawHostUnit;

/// Per-run host counters, incremented at most once per unique host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Resolves raw host units against the store, applying the include /
/// exclude filters and the update-vs-skip policy.
pub(crate) struct HostNormalizer {
    engineer: Option<String>,
    asset_group: Option<String>,
    exclude: HashSet<IpAddr>,
    /// `Some` means only listed addresses are imported.
    include: Option<HashSet<IpAddr>>,
    update_hosts: bool,
    /// Hosts already resolved this run; repeated units (every CSV row
    /// repeats its host) reuse the id without touching the counters.
    seen: HashMap<IpAddr, i64>,
    pub stats: HostStats,
}

/// Parse a newline-delimited address list, ignoring unparsable entries.
pub(crate) fn parse_address_list(text: &str) -> HashSet<IpAddr> {
    let mut out = HashSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse() {
            Ok(ip) => {
                out.insert(ip);
            }
            Err(_) => warn!(entry = line, "ignoring unparsable address list entry"),
        }
    }
    out
}

impl HostNormalizer {
    pub(crate) fn new(
        engineer: Option<String>,
        asset_group: Option<String>,
        exclude: HashSet<IpAddr>,
        include: Option<HashSet<IpAddr>>,
        update_hosts: bool,
    ) -> Self {
        Self {
            engineer,
            asset_group,
            exclude,
            include,
            update_hosts,
            seen: HashMap::new(),
            stats: HostStats::default(),
        }
    }

    /// Resolve one raw unit to a stored host id.
    ///
    /// Returns `Ok(None)` when the host is skipped: unparsable address,
    /// excluded, or absent from a configured include list. None of those
    /// touch the counters or fail the run.
    pub(crate) fn resolve(
        &mut self,
        unit: &RawHostUnit,
        store: &DataStore,
    ) -> Result<Option<i64>, DbError> {
        let ip: IpAddr = match unit.address.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                debug!(address = %unit.address, "host skipped: unresolvable address");
                return Ok(None);
            }
        };

        if let Some(&id) = self.seen.get(&ip) {
            return Ok(Some(id));
        }

        // Exclusion wins over inclusion when both lists name the address.
        if self.exclude.contains(&ip) {
            debug!(%ip, "host skipped: excluded");
            return Ok(None);
        }
        if let Some(include) = &self.include {
            if !include.contains(&ip) {
                debug!(%ip, "host skipped: not on include list");
                return Ok(None);
            }
        }

        let data = self.host_data(ip, unit);
        let id = match store.get_host_by_ip(ip)? {
            None => {
                let id = store.create_host(&data)?;
                self.stats.added += 1;
                debug!(%ip, id, "host added");
                id
            }
            Some(existing) => {
                if self.update_hosts {
                    store.update_host(existing.id, &data)?;
                    self.stats.updated += 1;
                    debug!(%ip, id = existing.id, "host updated");
                } else {
                    self.stats.skipped += 1;
                    debug!(%ip, id = existing.id, "host already known, skipped");
                }
                existing.id
            }
        };

        self.seen.insert(ip, id);
        Ok(Some(id))
    }

    fn host_data(&self, ip: IpAddr, unit: &RawHostUnit) -> HostData {
        HostData {
            ip,
            fqdn: unit.fqdn.clone(),
            netbios_name: unit.netbios_name.clone(),
            mac_addr: unit.mac_addr.clone(),
            os_name: unit.os_name.clone(),
            system_type: unit.system_type.clone(),
            engineer: self.engineer.clone(),
            asset_group: self.asset_group.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(address: &str) -> RawHostUnit {
        RawHostUnit {
            address: address.to_string(),
            ..Default::default()
        }
    }

    fn normalizer(
        exclude: &[&str],
        include: Option<&[&str]>,
        update_hosts: bool,
    ) -> HostNormalizer {
        let exclude = exclude.iter().map(|s| s.parse().unwrap()).collect();
        let include =
            include.map(|list| list.iter().map(|s| s.parse().unwrap()).collect());
        HostNormalizer::new(None, None, exclude, include, update_hosts)
    }

    #[test]
    fn new_host_counts_added_once() {
        let store = DataStore::open_in_memory().unwrap();
        let mut hosts = normalizer(&[], None, false);

        let first = hosts.resolve(&unit("10.0.0.5"), &store).unwrap().unwrap();
        let second = hosts.resolve(&unit("10.0.0.5"), &store).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(hosts.stats.added, 1);
        assert_eq!(hosts.stats.skipped, 0);
    }

    #[test]
    fn known_host_skipped_without_update_flag() {
        let store = DataStore::open_in_memory().unwrap();
        let mut first_run = normalizer(&[], None, false);
        first_run.resolve(&unit("10.0.0.5"), &store).unwrap();

        let mut second_run = normalizer(&[], None, false);
        let id = second_run.resolve(&unit("10.0.0.5"), &store).unwrap();
        assert!(id.is_some());
        assert_eq!(second_run.stats.added, 0);
        assert_eq!(second_run.stats.skipped, 1);
    }

    #[test]
    fn known_host_updated_with_update_flag() {
        let store = DataStore::open_in_memory().unwrap();
        let mut first_run = normalizer(&[], None, false);
        first_run.resolve(&unit("10.0.0.5"), &store).unwrap();

        let mut second_run = normalizer(&[], None, true);
        let mut updated = unit("10.0.0.5");
        updated.os_name = Some("OpenBSD 7.4".into());
        second_run.resolve(&updated, &store).unwrap();
        assert_eq!(second_run.stats.updated, 1);

        let rec = store
            .get_host_by_ip("10.0.0.5".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(rec.os_name.as_deref(), Some("OpenBSD 7.4"));
    }

    #[test]
    fn excluded_host_skipped_silently() {
        let store = DataStore::open_in_memory().unwrap();
        let mut hosts = normalizer(&["10.0.0.5"], None, false);
        assert!(hosts.resolve(&unit("10.0.0.5"), &store).unwrap().is_none());
        assert_eq!(hosts.stats.added + hosts.stats.skipped, 0);
        assert_eq!(store.count_hosts().unwrap(), 0);
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let store = DataStore::open_in_memory().unwrap();
        let mut hosts = normalizer(&["10.0.0.5"], Some(&["10.0.0.5"]), false);
        assert!(hosts.resolve(&unit("10.0.0.5"), &store).unwrap().is_none());
    }

    #[test]
    fn include_list_drops_unlisted_hosts() {
        let store = DataStore::open_in_memory().unwrap();
        let mut hosts = normalizer(&[], Some(&["10.0.0.1"]), false);
        assert!(hosts.resolve(&unit("10.0.0.5"), &store).unwrap().is_none());
        assert!(hosts.resolve(&unit("10.0.0.1"), &store).unwrap().is_some());
    }

    #[test]
    fn unresolvable_address_skipped_without_counters() {
        let store = DataStore::open_in_memory().unwrap();
        let mut hosts = normalizer(&[], None, false);
        assert!(hosts.resolve(&unit("not-an-ip"), &store).unwrap().is_none());
        assert!(hosts.resolve(&unit(""), &store).unwrap().is_none());
        assert_eq!(hosts.stats.added, 0);
        assert_eq!(hosts.stats.skipped, 0);
    }

    #[test]
    fn address_list_parsing_handles_crlf_and_junk() {
        let set = parse_address_list("10.0.0.1\r\n10.0.0.2\n\nnot-an-ip\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"10.0.0.1".parse().unwrap()));
        assert!(set.contains(&"10.0.0.2".parse().unwrap()));
    }
}

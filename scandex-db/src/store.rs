use std::net::IpAddr;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use scandex_types::{HostData, HostRecord, Protocol, ServiceRecord, ServiceVuln, VulnData, VulnRecord, VulnStatus};
use tracing::debug;

use crate::error::DbError;
use crate::schema;

/// Persistent record store backed by SQLite.
///
/// All mutation entry points are keyed upserts, so re-importing the same
/// report converges instead of duplicating rows.
pub struct DataStore {
    conn: Connection,
}

/// NetBIOS metadata singleton for a host.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct NetbiosInfo {
    pub host_id: i64,
    pub domain: Option<String>,
    pub shares: Vec<String>,
    pub lockout_duration: Option<u32>,
    pub lockout_limit: Option<u32>,
}

/// An account enumerated from a service.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SmbAccount {
    pub service_id: i64,
    pub username: String,
    pub gid: u32,
    /// Plugin id that produced this account.
    pub source: u32,
}

/// A weighted OS reference for a host.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HostOsRef {
    pub host_id: i64,
    pub os_id: i64,
    pub certainty: f64,
    pub family: Option<String>,
    pub class: Option<String>,
}

fn default_db_path() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("scandex").join("scandex.db")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".scandex").join("scandex.db")
    }
}

fn host_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HostRecord> {
    let ip: String = row.get(1)?;
    let ip: IpAddr = ip.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(HostRecord {
        id: row.get(0)?,
        ip,
        fqdn: row.get(2)?,
        netbios_name: row.get(3)?,
        mac_addr: row.get(4)?,
        os_name: row.get(5)?,
        system_type: row.get(6)?,
        engineer: row.get(7)?,
        asset_group: row.get(8)?,
    })
}

fn service_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRecord> {
    let proto: String = row.get(2)?;
    let protocol: Protocol = proto.parse().map_err(|e: scandex_types::ProtocolParseError| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ServiceRecord {
        id: row.get(0)?,
        host_id: row.get(1)?,
        protocol,
        port: row.get(3)?,
        name: row.get(4)?,
        banner: row.get(5)?,
    })
}

fn vuln_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VulnRecord> {
    let cve_json: String = row.get(8)?;
    let cve_refs: Vec<String> = serde_json::from_str(&cve_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(VulnRecord {
        id: row.get(0)?,
        plugin_id: row.get(1)?,
        title: row.get(2)?,
        severity: row.get(3)?,
        synopsis: row.get(4)?,
        description: row.get(5)?,
        solution: row.get(6)?,
        cvss_score: row.get(7)?,
        cve_refs,
    })
}

impl DataStore {
    /// Open (or create) the database at the default location.
    pub fn open_default() -> Result<Self, DbError> {
        let path = default_db_path();
        Self::open(&path)
    }

    /// Open a database at a specific path.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Other(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "record store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // --- hosts ---

    /// Look up a host by its primary address.
    pub fn get_host_by_ip(&self, ip: IpAddr) -> Result<Option<HostRecord>, DbError> {
        let rec = self
            .conn
            .query_row(
                "SELECT id, ip, fqdn, netbios_name, mac_addr, os_name, system_type, \
                 engineer, asset_group FROM hosts WHERE ip = ?1",
                params![ip.to_string()],
                host_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// Create a new host row.
    pub fn create_host(&self, host: &HostData) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO hosts (ip, fqdn, netbios_name, mac_addr, os_name, system_type, \
             engineer, asset_group) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                host.ip.to_string(),
                host.fqdn,
                host.netbios_name,
                host.mac_addr,
                host.os_name,
                host.system_type,
                host.engineer,
                host.asset_group,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Merge new attributes into an existing host. Fields that are `None`
    /// in `host` keep their stored value.
    pub fn update_host(&self, id: i64, host: &HostData) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE hosts SET \
             fqdn         = COALESCE(?2, fqdn), \
             netbios_name = COALESCE(?3, netbios_name), \
             mac_addr     = COALESCE(?4, mac_addr), \
             os_name      = COALESCE(?5, os_name), \
             system_type  = COALESCE(?6, system_type), \
             engineer     = COALESCE(?7, engineer), \
             asset_group  = COALESCE(?8, asset_group) \
             WHERE id = ?1",
            params![
                id,
                host.fqdn,
                host.netbios_name,
                host.mac_addr,
                host.os_name,
                host.system_type,
                host.engineer,
                host.asset_group,
            ],
        )?;
        Ok(())
    }

    pub fn count_hosts(&self) -> Result<usize, DbError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hosts", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // --- services ---

    /// Look up the service on `(host, protocol, port)`, if any.
    pub fn get_service(
        &self,
        host_id: i64,
        protocol: Protocol,
        port: u16,
    ) -> Result<Option<ServiceRecord>, DbError> {
        let rec = self
            .conn
            .query_row(
                "SELECT id, host_id, protocol, port, name, banner FROM services \
                 WHERE host_id = ?1 AND protocol = ?2 AND port = ?3",
                params![host_id, protocol.to_string(), port],
                service_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// Create the service row for `(host, protocol, port)`.
    pub fn create_service(
        &self,
        host_id: i64,
        protocol: Protocol,
        port: u16,
        name: Option<&str>,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO services (host_id, protocol, port, name) VALUES (?1, ?2, ?3, ?4)",
            params![host_id, protocol.to_string(), port, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace a service's name label.
    pub fn rename_service(&self, service_id: i64, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE services SET name = ?2 WHERE id = ?1",
            params![service_id, name],
        )?;
        Ok(())
    }

    /// Replace a service's captured banner.
    pub fn set_service_banner(&self, service_id: i64, banner: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE services SET banner = ?2 WHERE id = ?1",
            params![service_id, banner],
        )?;
        Ok(())
    }

    pub fn list_services(&self, host_id: i64) -> Result<Vec<ServiceRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, host_id, protocol, port, name, banner FROM services \
             WHERE host_id = ?1 ORDER BY port",
        )?;
        let rows = stmt.query_map(params![host_id], service_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // --- vulnerabilities ---

    /// Look up the canonical vulnerability for a plugin id.
    pub fn get_vuln_by_plugin(&self, plugin_id: u32) -> Result<Option<VulnRecord>, DbError> {
        let rec = self
            .conn
            .query_row(
                "SELECT id, plugin_id, title, severity, synopsis, description, solution, \
                 cvss_score, cve_refs FROM vulns WHERE plugin_id = ?1",
                params![plugin_id],
                vuln_from_row,
            )
            .optional()?;
        Ok(rec)
    }

    /// Create the canonical vulnerability row for a plugin id.
    pub fn create_vuln(&self, vuln: &VulnData) -> Result<i64, DbError> {
        let cve_json = serde_json::to_string(&vuln.cve_refs)?;
        self.conn.execute(
            "INSERT INTO vulns (plugin_id, title, severity, synopsis, description, solution, \
             cvss_score, cve_refs) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                vuln.plugin_id,
                vuln.title,
                vuln.severity,
                vuln.synopsis,
                vuln.description,
                vuln.solution,
                vuln.cvss_score,
                cve_json,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Upsert the `(service, vuln)` occurrence. Returns `true` when a new
    /// row was inserted, `false` when an existing one was updated in place.
    pub fn upsert_service_vuln(
        &self,
        service_id: i64,
        vuln_id: i64,
        proof: Option<&str>,
        status: VulnStatus,
    ) -> Result<bool, DbError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM service_vulns WHERE service_id = ?1 AND vuln_id = ?2",
                params![service_id, vuln_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            self.conn.execute(
                "UPDATE service_vulns SET proof = ?3, status = ?4 \
                 WHERE service_id = ?1 AND vuln_id = ?2",
                params![service_id, vuln_id, proof, status.to_string()],
            )?;
            Ok(false)
        } else {
            self.conn.execute(
                "INSERT INTO service_vulns (service_id, vuln_id, proof, status) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![service_id, vuln_id, proof, status.to_string()],
            )?;
            Ok(true)
        }
    }

    pub fn get_service_vuln(
        &self,
        service_id: i64,
        vuln_id: i64,
    ) -> Result<Option<ServiceVuln>, DbError> {
        let rec = self
            .conn
            .query_row(
                "SELECT service_id, vuln_id, proof, status FROM service_vulns \
                 WHERE service_id = ?1 AND vuln_id = ?2",
                params![service_id, vuln_id],
                |row| {
                    let status: String = row.get(3)?;
                    let status: VulnStatus = status.parse().map_err(
                        |e: scandex_types::VulnStatusParseError| {
                            rusqlite::Error::FromSqlConversionFailure(
                                3,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        },
                    )?;
                    Ok(ServiceVuln {
                        service_id: row.get(0)?,
                        vuln_id: row.get(1)?,
                        proof: row.get(2)?,
                        status,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    pub fn count_service_vulns(&self) -> Result<usize, DbError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM service_vulns", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // --- plugin facts ---

    /// Record an SNMP community string. Returns `false` if it was already
    /// known for this host.
    pub fn add_snmp_community(&self, host_id: i64, community: &str) -> Result<bool, DbError> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO snmp_communities (host_id, community) VALUES (?1, ?2)",
            params![host_id, community],
        )?;
        Ok(n > 0)
    }

    pub fn list_snmp_communities(&self, host_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT community FROM snmp_communities WHERE host_id = ?1 ORDER BY community",
        )?;
        let rows = stmt.query_map(params![host_id], |r| r.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Upsert an enumerated account, keyed by `(service, username)`.
    pub fn upsert_account(
        &self,
        service_id: i64,
        username: &str,
        gid: u32,
        source: u32,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO accounts (service_id, username, gid, source) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(service_id, username) DO UPDATE SET gid = excluded.gid, \
             source = excluded.source",
            params![service_id, username, gid, source],
        )?;
        Ok(())
    }

    pub fn list_accounts(&self, service_id: i64) -> Result<Vec<SmbAccount>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT service_id, username, gid, source FROM accounts \
             WHERE service_id = ?1 ORDER BY username",
        )?;
        let rows = stmt.query_map(params![service_id], |row| {
            Ok(SmbAccount {
                service_id: row.get(0)?,
                username: row.get(1)?,
                gid: row.get(2)?,
                source: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Set the NetBIOS domain/workgroup for a host, creating the singleton
    /// row if needed. Other NetBIOS columns are left untouched.
    pub fn set_netbios_domain(&self, host_id: i64, domain: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO netbios (host_id, domain) VALUES (?1, ?2) \
             ON CONFLICT(host_id) DO UPDATE SET domain = excluded.domain",
            params![host_id, domain],
        )?;
        Ok(())
    }

    /// Set the SMB lockout policy for a host.
    pub fn set_netbios_policy(
        &self,
        host_id: i64,
        lockout_duration: u32,
        lockout_limit: u32,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO netbios (host_id, lockout_duration, lockout_limit) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(host_id) DO UPDATE SET lockout_duration = excluded.lockout_duration, \
             lockout_limit = excluded.lockout_limit",
            params![host_id, lockout_duration, lockout_limit],
        )?;
        Ok(())
    }

    /// Replace the enumerated share list for a host.
    pub fn set_netbios_shares(&self, host_id: i64, shares: &[String]) -> Result<(), DbError> {
        let json = serde_json::to_string(shares)?;
        self.conn.execute(
            "INSERT INTO netbios (host_id, shares) VALUES (?1, ?2) \
             ON CONFLICT(host_id) DO UPDATE SET shares = excluded.shares",
            params![host_id, json],
        )?;
        Ok(())
    }

    pub fn get_netbios(&self, host_id: i64) -> Result<Option<NetbiosInfo>, DbError> {
        let rec = self
            .conn
            .query_row(
                "SELECT host_id, domain, shares, lockout_duration, lockout_limit \
                 FROM netbios WHERE host_id = ?1",
                params![host_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<u32>>(3)?,
                        row.get::<_, Option<u32>>(4)?,
                    ))
                },
            )
            .optional()?;
        match rec {
            None => Ok(None),
            Some((host_id, domain, shares_json, lockout_duration, lockout_limit)) => {
                let shares = match shares_json {
                    Some(json) => serde_json::from_str(&json)?,
                    None => Vec::new(),
                };
                Ok(Some(NetbiosInfo {
                    host_id,
                    domain,
                    shares,
                    lockout_duration,
                    lockout_limit,
                }))
            }
        }
    }

    /// Upsert a named key/value fact on a service.
    pub fn upsert_service_info(
        &self,
        service_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO service_info (service_id, name, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(service_id, name) DO UPDATE SET value = excluded.value",
            params![service_id, key, value],
        )?;
        Ok(())
    }

    pub fn get_service_info(
        &self,
        service_id: i64,
        key: &str,
    ) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM service_info WHERE service_id = ?1 AND name = ?2",
                params![service_id, key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn count_service_info(&self) -> Result<usize, DbError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM service_info", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    // --- OS definitions / references ---

    /// Register an OS definition for a CPE identifier (idempotent).
    pub fn add_os_def(&self, cpe_name: &str, title: &str) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO os_defs (cpe_name, title) VALUES (?1, ?2) \
             ON CONFLICT(cpe_name) DO UPDATE SET title = excluded.title",
            params![cpe_name, title],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM os_defs WHERE cpe_name = ?1",
            params![cpe_name],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Resolve a CPE OS stem (no `cpe:/o:` prefix) to a stored OS id.
    pub fn lookup_cpe_os(&self, stem: &str) -> Result<Option<i64>, DbError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM os_defs WHERE cpe_name = ?1",
                params![stem],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Upsert a weighted OS reference for a host.
    pub fn upsert_host_os_ref(
        &self,
        host_id: i64,
        os_id: i64,
        certainty: f64,
        family: Option<&str>,
        class: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO host_os_refs (host_id, os_id, certainty, family, class) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(host_id, os_id) DO UPDATE SET certainty = excluded.certainty, \
             family = excluded.family, class = excluded.class",
            params![host_id, os_id, certainty, family, class],
        )?;
        Ok(())
    }

    pub fn list_host_os_refs(&self, host_id: i64) -> Result<Vec<HostOsRef>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT host_id, os_id, certainty, family, class FROM host_os_refs \
             WHERE host_id = ?1 ORDER BY os_id",
        )?;
        let rows = stmt.query_map(params![host_id], |row| {
            Ok(HostOsRef {
                host_id: row.get(0)?,
                os_id: row.get(1)?,
                certainty: row.get(2)?,
                family: row.get(3)?,
                class: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // --- post-import passes ---

    /// Register a known exploit (used by tests and external importers).
    pub fn add_exploit(&self, name: &str, cve_ref: &str) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO exploits (name, cve_ref) VALUES (?1, ?2)",
            params![name, cve_ref],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Link stored vulnerabilities to known exploits by CVE reference.
    /// Runs once per import; returns the number of new links.
    pub fn correlate_exploits(&self) -> Result<usize, DbError> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO vuln_exploits (vuln_id, exploit_id) \
             SELECT v.id, e.id FROM vulns v \
             JOIN json_each(v.cve_refs) refs \
             JOIN exploits e ON e.cve_ref = refs.value",
            [],
        )?;
        debug!(links = n, "exploit correlation complete");
        Ok(n)
    }

    pub fn count_vuln_exploits(&self) -> Result<usize, DbError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vuln_exploits", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Recompute the per-host vulnerable-finding counters, optionally
    /// restricted to one asset group. Runs once per import.
    pub fn recompute_host_status(&self, asset_group: Option<&str>) -> Result<usize, DbError> {
        let n = self.conn.execute(
            "UPDATE hosts SET vuln_count = ( \
                 SELECT COUNT(*) FROM service_vulns sv \
                 JOIN services s ON sv.service_id = s.id \
                 WHERE s.host_id = hosts.id \
                   AND sv.status IN ('vulnerable', 'vulnerable-exploited') \
             ) WHERE ?1 IS NULL OR asset_group = ?1",
            params![asset_group],
        )?;
        debug!(hosts = n, "host status recomputed");
        Ok(n)
    }

    pub fn host_vuln_count(&self, host_id: i64) -> Result<u64, DbError> {
        let n: i64 = self.conn.query_row(
            "SELECT vuln_count FROM hosts WHERE id = ?1",
            params![host_id],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}

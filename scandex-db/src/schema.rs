use crate::error::DbError;

const SCHEMA_SQL: &str = r#"
-- Hosts, keyed by primary address (one row per unique address)
CREATE TABLE IF NOT EXISTS hosts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ip          TEXT NOT NULL UNIQUE,
    fqdn        TEXT,
    netbios_name TEXT,
    mac_addr    TEXT,
    os_name     TEXT,
    system_type TEXT,
    engineer    TEXT,
    asset_group TEXT,
    vuln_count  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_hosts_asset_group ON hosts(asset_group);

-- Services: at most one live row per (host, protocol, port)
CREATE TABLE IF NOT EXISTS services (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id  INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
    protocol TEXT NOT NULL,
    port     INTEGER NOT NULL,
    name     TEXT,
    banner   TEXT,
    UNIQUE(host_id, protocol, port)
);
CREATE INDEX IF NOT EXISTS idx_services_host ON services(host_id);

-- Canonical vulnerabilities, keyed by scanner plugin id
CREATE TABLE IF NOT EXISTS vulns (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    plugin_id   INTEGER NOT NULL UNIQUE,
    title       TEXT NOT NULL,
    severity    INTEGER NOT NULL,
    synopsis    TEXT,
    description TEXT,
    solution    TEXT,
    cvss_score  REAL,
    cve_refs    TEXT NOT NULL DEFAULT '[]'
);

-- One row per (service, vulnerability) occurrence; re-import updates in place
CREATE TABLE IF NOT EXISTS service_vulns (
    service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    vuln_id    INTEGER NOT NULL REFERENCES vulns(id) ON DELETE CASCADE,
    proof      TEXT,
    status     TEXT NOT NULL,
    PRIMARY KEY (service_id, vuln_id)
);

-- Named key/value facts attached to a service (banners, fingerprints, ...)
CREATE TABLE IF NOT EXISTS service_info (
    service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (service_id, name)
);

-- SNMP community strings (append-many, deduplicated)
CREATE TABLE IF NOT EXISTS snmp_communities (
    host_id   INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
    community TEXT NOT NULL,
    PRIMARY KEY (host_id, community)
);

-- Accounts enumerated from a service (append-many, keyed by username)
CREATE TABLE IF NOT EXISTS accounts (
    service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    username   TEXT NOT NULL,
    gid        INTEGER NOT NULL DEFAULT 0,
    source     INTEGER NOT NULL,
    PRIMARY KEY (service_id, username)
);

-- NetBIOS metadata singleton per host (domain, shares, lockout policy)
CREATE TABLE IF NOT EXISTS netbios (
    host_id          INTEGER PRIMARY KEY REFERENCES hosts(id) ON DELETE CASCADE,
    domain           TEXT,
    shares           TEXT,
    lockout_duration INTEGER,
    lockout_limit    INTEGER
);

-- OS definitions resolvable from CPE identifiers
CREATE TABLE IF NOT EXISTS os_defs (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    cpe_name TEXT NOT NULL UNIQUE,
    title    TEXT NOT NULL
);

-- OS references per host, weighted by detection certainty
CREATE TABLE IF NOT EXISTS host_os_refs (
    host_id   INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
    os_id     INTEGER NOT NULL REFERENCES os_defs(id) ON DELETE CASCADE,
    certainty REAL NOT NULL,
    family    TEXT,
    class     TEXT,
    PRIMARY KEY (host_id, os_id)
);

-- Known exploits and their CVE references
CREATE TABLE IF NOT EXISTS exploits (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT NOT NULL,
    cve_ref TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_exploits_cve ON exploits(cve_ref);

-- Exploit-to-vulnerability correlation results
CREATE TABLE IF NOT EXISTS vuln_exploits (
    vuln_id    INTEGER NOT NULL REFERENCES vulns(id) ON DELETE CASCADE,
    exploit_id INTEGER NOT NULL REFERENCES exploits(id) ON DELETE CASCADE,
    PRIMARY KEY (vuln_id, exploit_id)
);
"#;

pub fn initialize(conn: &rusqlite::Connection) -> Result<(), DbError> {
    // Set WAL mode and foreign keys BEFORE schema creation for crash safety
    // and foreign key enforcement during initial DDL.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

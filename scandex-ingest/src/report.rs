use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::format::{self, ReportFormat};
use crate::IngestError;

/// One finding as it appears in the report, before normalization.
///
/// `plugin_id` stays a string here; the vulnerability normalizer decides
/// whether it parses (and skips the finding when it does not).
#[derive(Debug, Clone, Default)]
pub struct RawFinding {
    pub plugin_id: String,
    pub plugin_name: String,
    pub port: u16,
    pub protocol: String,
    pub svc_name: String,
    pub severity: u8,
    pub plugin_output: String,
    pub exploit_available: bool,
    pub synopsis: Option<String>,
    pub description: Option<String>,
    pub solution: Option<String>,
    pub cvss_score: Option<f64>,
    pub cve_refs: Vec<String>,
}

/// One host's worth of report data, uniform across dialects.
///
/// XML report-host blocks carry many findings; a CSV row carries exactly
/// one. Either way the coordinator sees a host plus its findings.
#[derive(Debug, Clone, Default)]
pub struct RawHostUnit {
    /// Primary address text as reported (validated by the host normalizer).
    pub address: String,
    pub fqdn: Option<String>,
    pub netbios_name: Option<String>,
    pub mac_addr: Option<String>,
    pub os_name: Option<String>,
    pub system_type: Option<String>,
    pub findings: Vec<RawFinding>,
}

/// Forward-only sequence of host units for one report file.
pub(crate) enum ReportReader {
    Xml(std::vec::IntoIter<RawHostUnit>),
    Csv {
        records: csv::StringRecordsIntoIter<File>,
        headers: HashMap<String, usize>,
    },
}

/// Sniff the dialect and open the per-host iterator.
///
/// The XML dialect is parsed up front so that a malformed document fails
/// the whole run before anything is ingested; CSV rows stream lazily and
/// fail row by row. The `csv` reader imposes no field-size ceiling, which
/// the large free-text output columns require.
pub(crate) fn open_report(path: &Path) -> Result<(ReportFormat, ReportReader), IngestError> {
    let fmt = format::sniff_file(path)?;
    match fmt {
        ReportFormat::Xml => {
            let content = std::fs::read_to_string(path)?;
            let units = parse_xml(&content)?;
            Ok((fmt, ReportReader::Xml(units.into_iter())))
        }
        ReportFormat::StandaloneCsv | ReportFormat::SecurityCenterCsv => {
            let file = File::open(path)?;
            // Trim headers only: field bodies keep their whitespace, which
            // the list-style plugin outputs rely on.
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .trim(csv::Trim::Headers)
                .from_reader(file);
            let headers: HashMap<String, usize> = reader
                .headers()?
                .iter()
                .enumerate()
                .map(|(i, h)| (h.to_lowercase(), i))
                .collect();
            Ok((
                fmt,
                ReportReader::Csv {
                    records: reader.into_records(),
                    headers,
                },
            ))
        }
    }
}

impl Iterator for ReportReader {
    type Item = Result<RawHostUnit, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ReportReader::Xml(units) => units.next().map(Ok),
            ReportReader::Csv { records, headers } => {
                let record = match records.next()? {
                    Ok(r) => r,
                    Err(e) => return Some(Err(e.into())),
                };
                Some(Ok(row_to_unit(&record, headers)))
            }
        }
    }
}

// --- XML dialect ---

/// Parse the XML report into host units. Any well-formedness error is
/// fatal for the run.
pub(crate) fn parse_xml(xml: &str) -> Result<Vec<RawHostUnit>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut units = Vec::new();
    let mut current_host: Option<RawHostUnit> = None;
    let mut current_item: Option<RawFinding> = None;
    let mut current_element = String::new();
    let mut current_tag_name: Option<String> = None;
    let mut in_host_properties = false;
    let mut saw_element = false;
    let mut depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                saw_element = true;
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "ReportHost" => {
                        let mut host = RawHostUnit::default();
                        for attr in e.attributes().filter_map(|a| a.ok()) {
                            if attr.key.as_ref() == b"name" {
                                if let Ok(value) = attr.unescape_value() {
                                    host.address = value.to_string();
                                }
                            }
                        }
                        current_host = Some(host);
                    }
                    "HostProperties" => in_host_properties = true,
                    "tag" if in_host_properties => {
                        for attr in e.attributes().filter_map(|a| a.ok()) {
                            if attr.key.as_ref() == b"name" {
                                if let Ok(value) = attr.unescape_value() {
                                    current_tag_name = Some(value.to_string());
                                }
                            }
                        }
                    }
                    "ReportItem" if current_host.is_some() => {
                        current_item = Some(item_from_attributes(&e));
                    }
                    other => {
                        current_element.clear();
                        current_element.push_str(other);
                    }
                }
            }
            Event::Empty(e) => {
                saw_element = true;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                // A self-closing <ReportItem .../> still carries a finding
                // in its attributes.
                if name == "ReportItem" {
                    if let Some(host) = current_host.as_mut() {
                        host.findings.push(item_from_attributes(&e));
                    }
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "ReportHost" => {
                        if let Some(host) = current_host.take() {
                            units.push(host);
                        }
                    }
                    "HostProperties" => in_host_properties = false,
                    "tag" => current_tag_name = None,
                    "ReportItem" => {
                        if let (Some(host), Some(item)) = (current_host.as_mut(), current_item.take())
                        {
                            host.findings.push(item);
                        }
                    }
                    _ => current_element.clear(),
                }
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default().to_string();
                apply_text(
                    &text,
                    current_host.as_mut(),
                    current_item.as_mut(),
                    in_host_properties,
                    current_tag_name.as_deref(),
                    &current_element,
                );
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                apply_text(
                    &text,
                    current_host.as_mut(),
                    current_item.as_mut(),
                    in_host_properties,
                    current_tag_name.as_deref(),
                    &current_element,
                );
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_element {
        return Err(IngestError::InvalidReport(
            "no XML document element found".to_string(),
        ));
    }
    if depth != 0 {
        return Err(IngestError::InvalidReport(
            "unexpected end of file inside an open element".to_string(),
        ));
    }
    Ok(units)
}

fn item_from_attributes(e: &quick_xml::events::BytesStart<'_>) -> RawFinding {
    let mut item = RawFinding::default();
    for attr in e.attributes().filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if let Ok(value) = attr.unescape_value() {
            match key.as_str() {
                "port" => item.port = value.parse().unwrap_or(0),
                "protocol" => item.protocol = value.to_string(),
                "svc_name" => item.svc_name = value.to_string(),
                "severity" => item.severity = value.parse().unwrap_or(0),
                "pluginID" => item.plugin_id = value.to_string(),
                "pluginName" => item.plugin_name = value.to_string(),
                _ => {}
            }
        }
    }
    item
}

fn apply_text(
    text: &str,
    host: Option<&mut RawHostUnit>,
    item: Option<&mut RawFinding>,
    in_host_properties: bool,
    tag_name: Option<&str>,
    current_element: &str,
) {
    if in_host_properties {
        if let (Some(host), Some(tag)) = (host, tag_name) {
            let value = text.trim();
            if value.is_empty() {
                return;
            }
            match tag {
                "host-ip" => host.address = value.to_string(),
                "host-fqdn" => host.fqdn = Some(value.to_string()),
                "netbios-name" => host.netbios_name = Some(value.to_string()),
                "mac-address" => host.mac_addr = Some(value.to_string()),
                "operating-system" => host.os_name = Some(value.to_string()),
                "system-type" => host.system_type = Some(value.to_string()),
                _ => {}
            }
        }
        return;
    }

    if let Some(item) = item {
        match current_element {
            "description" => append(&mut item.description, text),
            "synopsis" => append(&mut item.synopsis, text),
            "solution" => append(&mut item.solution, text),
            "plugin_output" => item.plugin_output.push_str(text),
            "cve" => {
                let cve = text.trim();
                if !cve.is_empty() {
                    item.cve_refs.push(cve.to_string());
                }
            }
            "exploit_available" => {
                item.exploit_available = matches!(text.trim(), "true" | "1");
            }
            "cvss_base_score" => item.cvss_score = text.trim().parse().ok(),
            _ => {}
        }
    }
}

fn append(field: &mut Option<String>, text: &str) {
    match field {
        Some(existing) => existing.push_str(text),
        None => *field = Some(text.to_string()),
    }
}

// --- CSV dialects ---

/// Pull a field by any of its known header names, empty when absent.
fn field<'r>(
    record: &'r csv::StringRecord,
    headers: &HashMap<String, usize>,
    aliases: &[&str],
) -> &'r str {
    for alias in aliases {
        if let Some(&idx) = headers.get(*alias) {
            if let Some(value) = record.get(idx) {
                if !value.is_empty() {
                    return value;
                }
            }
        }
    }
    ""
}

/// Map a severity cell onto the 0-4 scale. Standalone exports use risk
/// labels, SecurityCenter uses labels or plain numbers.
fn parse_severity(value: &str) -> u8 {
    if let Ok(n) = value.trim().parse::<u8>() {
        return n.min(4);
    }
    match value.trim().to_ascii_lowercase().as_str() {
        "critical" => 4,
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1"
    )
}

/// One CSV row is one host unit carrying its single embedded finding.
fn row_to_unit(record: &csv::StringRecord, headers: &HashMap<String, usize>) -> RawHostUnit {
    let optional = |aliases: &[&str]| -> Option<String> {
        let value = field(record, headers, aliases);
        (!value.is_empty()).then(|| value.to_string())
    };

    let svc_name = field(record, headers, &["service name", "service", "svc name"]);
    let finding = RawFinding {
        plugin_id: field(record, headers, &["plugin id", "plugin"]).to_string(),
        plugin_name: field(record, headers, &["plugin name", "name"]).to_string(),
        port: field(record, headers, &["port"]).parse().unwrap_or(0),
        protocol: field(record, headers, &["protocol"]).to_string(),
        svc_name: if svc_name.is_empty() {
            "general".to_string()
        } else {
            svc_name.to_string()
        },
        severity: parse_severity(field(record, headers, &["severity", "risk"])),
        plugin_output: field(record, headers, &["plugin output", "plugin text"]).to_string(),
        exploit_available: parse_flag(field(record, headers, &["exploit?", "exploit available"])),
        synopsis: optional(&["synopsis"]),
        description: optional(&["description"]),
        solution: optional(&["solution"]),
        cvss_score: field(record, headers, &["cvss", "cvss base score"]).parse().ok(),
        cve_refs: field(record, headers, &["cve"])
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    };

    RawHostUnit {
        address: field(record, headers, &["host", "ip address", "ip"]).to_string(),
        fqdn: optional(&["dns name", "fqdn"]),
        netbios_name: optional(&["netbios name"]),
        mac_addr: optional(&["mac address"]),
        os_name: optional(&["operating system", "os"]),
        // Device class is an XML-only host property; CSV rows have no
        // equivalent column.
        system_type: None,
        findings: vec![finding],
    }
}

#[cfg(feature = "bulk-import")]
mod bulk;
mod engine;
mod format;
mod hosts;
mod report;
mod rules;
mod services;
mod status;
mod vulns;

pub use engine::{BulkImportConfig, IngestConfig, IngestEngine, IngestSummary, DEFAULT_IGNORED_PLUGINS};
pub use format::ReportFormat;
pub use hosts::HostStats;
pub use report::{RawFinding, RawHostUnit};
pub use status::classify_status;
pub use vulns::VulnStats;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid report file: {0}")]
    InvalidReport(String),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Db(#[from] scandex_db::DbError),
}

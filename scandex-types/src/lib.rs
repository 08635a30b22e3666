pub mod fact;
pub mod host;
pub mod service;
pub mod vuln;

pub use fact::PluginFact;
pub use host::{HostData, HostRecord};
pub use service::{Protocol, ProtocolParseError, ServiceRecord};
pub use vuln::{ServiceVuln, VulnData, VulnRecord, VulnStatus, VulnStatusParseError};

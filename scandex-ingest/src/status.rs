use scandex_types::VulnStatus;

/// Service name scanners emit when they cannot identify a service.
pub(crate) const GENERIC_SERVICE: &str = "general";

/// Classify a finding against its resolved service.
///
/// Precedence is fixed: a known exploit always wins, then the generic
/// placeholder service, then zero severity; everything else is a real
/// vulnerability.
pub fn classify_status(exploit_available: bool, svc_name: &str, severity: u8) -> VulnStatus {
    if exploit_available {
        VulnStatus::VulnerableExploited
    } else if svc_name == GENERIC_SERVICE {
        VulnStatus::General
    } else if severity == 0 {
        VulnStatus::General
    } else {
        VulnStatus::Vulnerable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exploit_wins_over_everything() {
        // Zero severity on the generic service still classifies as
        // exploited when an exploit exists.
        assert_eq!(
            classify_status(true, GENERIC_SERVICE, 0),
            VulnStatus::VulnerableExploited
        );
        assert_eq!(classify_status(true, "ssh", 3), VulnStatus::VulnerableExploited);
    }

    #[test]
    fn generic_service_is_general() {
        assert_eq!(classify_status(false, "general", 4), VulnStatus::General);
    }

    #[test]
    fn zero_severity_is_general() {
        assert_eq!(classify_status(false, "ftp", 0), VulnStatus::General);
    }

    #[test]
    fn identified_service_with_severity_is_vulnerable() {
        assert_eq!(classify_status(false, "ftp", 1), VulnStatus::Vulnerable);
        assert_eq!(classify_status(false, "cifs", 4), VulnStatus::Vulnerable);
    }
}

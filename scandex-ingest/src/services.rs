use scandex_db::{DataStore, DbError};
use scandex_types::{Protocol, ServiceRecord};
use tracing::debug;

/// Strip the scanner's low-confidence marker from a service name guess.
/// `"http?"` and `"http"` both yield the stem `"http"`.
pub(crate) fn name_stem(guess: &str) -> &str {
    guess.split('?').next().unwrap_or("").trim()
}

/// Fetch or create the service for `(host, protocol, port)`, merging the
/// new name guess into the stored label.
///
/// Distinct guesses accumulate as `"<stored> | <stem>"`; a stem the label
/// already contains is dropped, so repeated imports converge on one
/// combined label instead of growing or flapping.
pub(crate) fn resolve_service(
    store: &DataStore,
    host_id: i64,
    protocol: Protocol,
    port: u16,
    name_guess: &str,
) -> Result<ServiceRecord, DbError> {
    let stem = name_stem(name_guess);

    match store.get_service(host_id, protocol, port)? {
        Some(mut existing) => {
            if !stem.is_empty() {
                let new_name = match existing.name.as_deref() {
                    // A stem the stored label already carries is dropped
                    Some(stored) if stored != stem && !stored.contains(stem) => {
                        Some(format!("{stored} | {stem}"))
                    }
                    Some(_) => None,
                    None => Some(stem.to_string()),
                };
                if let Some(name) = new_name {
                    store.rename_service(existing.id, &name)?;
                    debug!(service = existing.id, name = %name, "service name updated");
                    existing.name = Some(name);
                }
            }
            Ok(existing)
        }
        None => {
            let name = (!stem.is_empty()).then_some(stem);
            let id = store.create_service(host_id, protocol, port, name)?;
            Ok(ServiceRecord {
                id,
                host_id,
                protocol,
                port,
                name: name.map(String::from),
                banner: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scandex_types::HostData;

    fn store_with_host() -> (DataStore, i64) {
        let store = DataStore::open_in_memory().unwrap();
        let host_id = store
            .create_host(&HostData::new("10.0.0.5".parse().unwrap()))
            .unwrap();
        (store, host_id)
    }

    #[test]
    fn stem_strips_confidence_marker() {
        assert_eq!(name_stem("http?"), "http");
        assert_eq!(name_stem("http"), "http");
        assert_eq!(name_stem("?"), "");
        assert_eq!(name_stem(""), "");
    }

    #[test]
    fn first_guess_stores_bare_stem() {
        let (store, host_id) = store_with_host();
        let svc = resolve_service(&store, host_id, Protocol::Tcp, 80, "http?").unwrap();
        assert_eq!(svc.name.as_deref(), Some("http"));
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        // "http?" then "www?" in either order yields a label containing
        // both stems exactly once.
        for (first, second) in [("http?", "www?"), ("www?", "http?")] {
            let (store, host_id) = store_with_host();
            resolve_service(&store, host_id, Protocol::Tcp, 80, first).unwrap();
            let merged = resolve_service(&store, host_id, Protocol::Tcp, 80, second).unwrap();

            let name = merged.name.unwrap();
            assert_eq!(name.matches("http").count(), 1, "label was {name:?}");
            assert_eq!(name.matches("www").count(), 1, "label was {name:?}");

            // Re-importing either guess leaves the label unchanged
            let again = resolve_service(&store, host_id, Protocol::Tcp, 80, first).unwrap();
            assert_eq!(again.name.as_deref(), Some(name.as_str()));
        }
    }

    #[test]
    fn repeated_identical_guess_keeps_name() {
        let (store, host_id) = store_with_host();
        resolve_service(&store, host_id, Protocol::Tcp, 22, "ssh").unwrap();
        let svc = resolve_service(&store, host_id, Protocol::Tcp, 22, "ssh?").unwrap();
        assert_eq!(svc.name.as_deref(), Some("ssh"));
    }

    #[test]
    fn same_port_different_protocol_is_distinct() {
        let (store, host_id) = store_with_host();
        let tcp = resolve_service(&store, host_id, Protocol::Tcp, 53, "domain").unwrap();
        let udp = resolve_service(&store, host_id, Protocol::Udp, 53, "domain").unwrap();
        assert_ne!(tcp.id, udp.id);
    }

    #[test]
    fn empty_guess_leaves_name_unset() {
        let (store, host_id) = store_with_host();
        let svc = resolve_service(&store, host_id, Protocol::Tcp, 9999, "").unwrap();
        assert!(svc.name.is_none());

        // A later real guess fills the empty name in
        let svc = resolve_service(&store, host_id, Protocol::Tcp, 9999, "ftp?").unwrap();
        assert_eq!(svc.name.as_deref(), Some("ftp"));
    }
}

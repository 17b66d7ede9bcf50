use super::record::{CanonicalRecord, IdentityScope};
use log::debug;
use std::collections::HashSet;

/// Keeps the first record seen for each identity key. Callers pass records
/// already ordered by source priority, so the higher-priority copy wins and
/// the output keeps first-appearance order.
pub fn dedupe(records: Vec<CanonicalRecord>, scope: IdentityScope) -> Vec<CanonicalRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        match record.identity_key(scope) {
            Some(key) => {
                if seen.insert(key) {
                    out.push(record);
                } else {
                    debug!("Dropping duplicate {} from {}", record.kind, record.source);
                }
            }
            // normalization guarantees a key; keep anything that slipped through
            None => out.push(record),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::record::KindFields;
    use crate::aggregate::{ResourceKind, SourceId};

    fn vm(source: &str, name: &str, container: &str, cpu: Option<i64>) -> CanonicalRecord {
        CanonicalRecord {
            kind: ResourceKind::VirtualMachine,
            source: SourceId::from(source),
            id: None,
            name: Some(name.into()),
            status: None,
            container_name: Some(container.into()),
            container_id: None,
            timestamp: None,
            fields: KindFields::VirtualMachine {
                cpu_count: cpu,
                memory_mb: None,
                guest_os: None,
                deployed: None,
            },
        }
    }

    #[test]
    fn test_first_seen_wins_and_order_is_stable() {
        let records = vec![
            vm("a", "web-01", "shop", Some(2)),
            vm("a", "db-01", "shop", None),
            vm("b", "web-01", "shop", Some(8)),
            vm("b", "cache-01", "shop", None),
        ];
        let out = dedupe(records, IdentityScope::Name);
        let names: Vec<_> = out.iter().map(|r| r.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["web-01", "db-01", "cache-01"]);
        assert_eq!(out[0].source.as_str(), "a");
        assert_eq!(out[0].cpu_count(), Some(2));
    }

    #[test]
    fn test_name_is_case_preserved() {
        let out = dedupe(
            vec![vm("a", "Web-01", "shop", None), vm("b", "web-01", "shop", None)],
            IdentityScope::Name,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_container_scope_keeps_same_name_apart() {
        let records = vec![vm("a", "web-01", "shop", None), vm("b", "web-01", "blog", None)];
        assert_eq!(dedupe(records.clone(), IdentityScope::Name).len(), 1);
        assert_eq!(dedupe(records, IdentityScope::NameAndContainer).len(), 2);
    }
}

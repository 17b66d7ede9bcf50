use super::record::CanonicalRecord;
use super::ResourceFilter;

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Client-side predicate check. Every active predicate must hold, and a record
/// missing the field a predicate targets does not match it.
pub fn matches(record: &CanonicalRecord, filter: &ResourceFilter) -> bool {
    if let Some(name) = &filter.name {
        match &record.name {
            Some(n) if contains_ci(n, name) => {}
            _ => return false,
        }
    }

    if let Some(container) = &filter.container {
        let by_name = record
            .container_name
            .as_deref()
            .is_some_and(|n| contains_ci(n, container));
        let by_id = record
            .container_id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(container));
        if !by_name && !by_id {
            return false;
        }
    }

    if let Some(status) = &filter.status {
        if record.status.as_deref() != Some(status.as_str()) {
            return false;
        }
    }

    if let Some(since) = filter.since {
        match record.timestamp {
            Some(ts) if ts >= since => {}
            _ => return false,
        }
    }

    true
}

use super::error::NormalizeError;
use super::record::{CanonicalRecord, KindFields};
use super::source::{AttributeRecord, RawRecord, SourceId};
use super::ResourceKind;
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::{Map, Value};

/// Uniform field access over both raw encodings. Each getter takes the aliases
/// a field goes by across backends and returns the first usable value; a
/// missing or malformed value is `None`.
trait Fields {
    fn text(&self, keys: &[&str]) -> Option<String>;
    fn int(&self, keys: &[&str]) -> Option<i64>;
    fn flag(&self, keys: &[&str]) -> Option<bool>;
}

impl Fields for Map<String, Value> {
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match lookup(self, k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    fn int(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|k| match lookup(self, k)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => parse_int(s),
            _ => None,
        })
    }

    fn flag(&self, keys: &[&str]) -> Option<bool> {
        keys.iter().find_map(|k| match lookup(self, k)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_flag(s),
            _ => None,
        })
    }
}

impl Fields for AttributeRecord {
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
            .map(str::to_string)
    }

    fn int(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().filter_map(|k| self.get(k)).find_map(parse_int)
    }

    fn flag(&self, keys: &[&str]) -> Option<bool> {
        keys.iter().filter_map(|k| self.get(k)).find_map(parse_flag)
    }
}

/// Dotted paths walk nested objects (`vApp.name`).
fn lookup<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim() {
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Final path segment of a resource locator, ignoring query and trailing slash.
pub fn id_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?.trim_end_matches('/');
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

struct Aliases {
    name: &'static [&'static str],
    status: &'static [&'static str],
    container_name: &'static [&'static str],
    container_id: &'static [&'static str],
    container_href: &'static [&'static str],
    timestamp: &'static [&'static str],
}

fn aliases(kind: ResourceKind) -> Aliases {
    match kind {
        ResourceKind::VirtualMachine => Aliases {
            name: &["name"],
            status: &["status"],
            container_name: &["vApp.name", "containerName"],
            container_id: &["vApp.id"],
            container_href: &["container"],
            timestamp: &["creationDate", "dateCreated"],
        },
        ResourceKind::Task => Aliases {
            name: &["name", "operationName"],
            status: &["status"],
            container_name: &["object.name", "objectName"],
            container_id: &["object.id"],
            container_href: &["object"],
            timestamp: &["startDate", "startTime"],
        },
        ResourceKind::Event => Aliases {
            name: &["entity.name", "entityName"],
            status: &["eventStatus"],
            container_name: &["tenant.name", "orgName"],
            container_id: &["tenant.id"],
            container_href: &["org"],
            timestamp: &["timestamp", "timeStamp"],
        },
        ResourceKind::StorageProfile => Aliases {
            name: &["name"],
            status: &[],
            container_name: &["vdc.name", "vdcName"],
            container_id: &["vdc.id"],
            container_href: &["vdc"],
            timestamp: &[],
        },
        ResourceKind::Catalog => Aliases {
            name: &["name"],
            status: &["status"],
            container_name: &["org.name", "orgName"],
            container_id: &["org.id"],
            container_href: &["org"],
            timestamp: &["creationDate"],
        },
    }
}

fn kind_fields(kind: ResourceKind, f: &dyn Fields) -> KindFields {
    match kind {
        ResourceKind::VirtualMachine => KindFields::VirtualMachine {
            cpu_count: f.int(&["cpuCount", "numberOfCpus"]),
            memory_mb: f.int(&["memoryMB", "memoryMb"]),
            guest_os: f.text(&["guestOs"]),
            deployed: f.flag(&["deployed", "isDeployed"]),
        },
        ResourceKind::Task => KindFields::Task {
            operation: f.text(&["operationFull", "operation"]),
            owner_name: f.text(&["owner.name", "ownerName"]),
            end_time: f.text(&["endDate", "endTime"]).as_deref().and_then(parse_timestamp),
        },
        ResourceKind::Event => KindFields::Event {
            event_type: f.text(&["eventType"]),
            user_name: f.text(&["user.name", "userName"]),
        },
        ResourceKind::StorageProfile => KindFields::StorageProfile {
            enabled: f.flag(&["isEnabled"]),
            is_default: f.flag(&["isDefaultStoragePolicy", "isDefaultStorageProfile"]),
            limit_mb: f.int(&["storageLimitMb", "storageLimitMB"]),
            used_mb: f.int(&["storageUsedMb", "storageUsedMB"]),
        },
        ResourceKind::Catalog => KindFields::Catalog {
            owner_name: f.text(&["owner.name", "ownerName"]),
            published: f.flag(&["isPublished"]),
            shared: f.flag(&["isShared"]),
            template_count: f.int(&["numberOfVAppTemplates", "numberOfTemplates"]),
            media_count: f.int(&["numberOfMedia"]),
        },
    }
}

fn build(kind: ResourceKind, source: &SourceId, f: &dyn Fields) -> Result<CanonicalRecord, NormalizeError> {
    let a = aliases(kind);

    let id = f
        .text(&["id", "eventId"])
        .or_else(|| f.text(&["href"]).as_deref().and_then(id_from_href));
    let name = f.text(a.name).map(|n| n.trim().to_string());

    if kind.keys_on_id() {
        if id.is_none() {
            return Err(NormalizeError::MissingKey("id"));
        }
    } else if name.is_none() {
        return Err(NormalizeError::MissingKey("name"));
    }

    let fields = kind_fields(kind, f);
    let status = match &fields {
        KindFields::StorageProfile { enabled, .. } => enabled.map(|e| {
            if e {
                "ENABLED".to_string()
            } else {
                "DISABLED".to_string()
            }
        }),
        _ => f.text(a.status),
    };

    Ok(CanonicalRecord {
        kind,
        source: source.clone(),
        id,
        name,
        status,
        container_name: f.text(a.container_name),
        container_id: f
            .text(a.container_id)
            .or_else(|| f.text(a.container_href).as_deref().and_then(id_from_href)),
        timestamp: f.text(a.timestamp).as_deref().and_then(parse_timestamp),
        fields,
    })
}

pub fn normalize(kind: ResourceKind, source: &SourceId, raw: &RawRecord) -> Result<CanonicalRecord, NormalizeError> {
    match raw {
        RawRecord::Structured(Value::Object(map)) => build(kind, source, map),
        RawRecord::Structured(_) => Err(NormalizeError::NotAnObject),
        RawRecord::Attributes(attrs) => build(kind, source, attrs),
    }
}

/// Normalizes a source's batch, dropping records that fail. Returns the
/// survivors in input order and the number dropped.
pub fn normalize_batch(kind: ResourceKind, source: &SourceId, raws: &[RawRecord]) -> (Vec<CanonicalRecord>, usize) {
    let mut records = Vec::with_capacity(raws.len());
    let mut dropped = 0;
    for (idx, raw) in raws.iter().enumerate() {
        match normalize(kind, source, raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("{}: dropping {} record #{}: {}", source, kind, idx, e);
                dropped += 1;
            }
        }
    }
    (records, dropped)
}

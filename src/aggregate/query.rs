use super::source::{fiql_safe, AttributeRecord, RawRecord, SourceAdapter, SourceFailure, SourceId};
use super::{ResourceFilter, ResourceKind};
use crate::vcloud::error::{Result as VcdResult, VcdError};
use crate::vcloud::VcdClient;
use async_trait::async_trait;
use chrono::SecondsFormat;
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

const PAGE_SIZE: u32 = 128;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    Tenant,
    Admin,
}

/// The legacy query service (`api/query?format=records`), which answers with
/// XML records whose fields are all attributes.
pub struct QuerySource {
    scope: QueryScope,
}

/// Attribute names used by the query service for the filterable predicates.
struct FilterAttrs {
    status: Option<&'static str>,
    timestamp: Option<&'static str>,
}

impl QuerySource {
    pub fn tenant() -> Self {
        Self {
            scope: QueryScope::Tenant,
        }
    }

    pub fn admin() -> Self {
        Self {
            scope: QueryScope::Admin,
        }
    }

    pub fn query_type(&self, kind: ResourceKind) -> &'static str {
        match (self.scope, kind) {
            (QueryScope::Tenant, ResourceKind::VirtualMachine) => "vm",
            (QueryScope::Tenant, ResourceKind::Task) => "task",
            (QueryScope::Tenant, ResourceKind::Event) => "event",
            (QueryScope::Tenant, ResourceKind::StorageProfile) => "orgVdcStorageProfile",
            (QueryScope::Tenant, ResourceKind::Catalog) => "catalog",
            (QueryScope::Admin, ResourceKind::VirtualMachine) => "adminVM",
            (QueryScope::Admin, ResourceKind::Task) => "adminTask",
            (QueryScope::Admin, ResourceKind::Event) => "adminEvent",
            (QueryScope::Admin, ResourceKind::StorageProfile) => "adminOrgVdcStorageProfile",
            (QueryScope::Admin, ResourceKind::Catalog) => "adminCatalog",
        }
    }

    fn filter_attrs(kind: ResourceKind) -> FilterAttrs {
        match kind {
            ResourceKind::VirtualMachine => FilterAttrs {
                status: Some("status"),
                timestamp: Some("dateCreated"),
            },
            ResourceKind::Task => FilterAttrs {
                status: Some("status"),
                timestamp: Some("startDate"),
            },
            ResourceKind::Event => FilterAttrs {
                status: None,
                timestamp: Some("timeStamp"),
            },
            ResourceKind::StorageProfile => FilterAttrs {
                status: None,
                timestamp: None,
            },
            ResourceKind::Catalog => FilterAttrs {
                status: None,
                timestamp: Some("creationDate"),
            },
        }
    }

    /// Builds the `filter=` expression for the predicates the query service can
    /// evaluate exactly: status and the timestamp bound. Name and container
    /// matching is case-insensitive and accepts container ids, so both are left
    /// to the client-side pass. Returns `None` when nothing can be pushed down.
    pub fn filter_expression(kind: ResourceKind, filter: &ResourceFilter) -> Option<String> {
        let attrs = Self::filter_attrs(kind);
        let mut terms = Vec::new();

        if kind == ResourceKind::VirtualMachine {
            terms.push("isVAppTemplate==false".to_string());
        }
        if let (Some(attr), Some(status)) = (attrs.status, filter.status.as_deref()) {
            if fiql_safe(status) {
                terms.push(format!("{}=={}", attr, status));
            }
        }
        if let (Some(attr), Some(since)) = (attrs.timestamp, filter.since) {
            terms.push(format!(
                "{}=ge={}",
                attr,
                since.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));
        }

        if terms.is_empty() {
            None
        } else {
            Some(terms.join(";"))
        }
    }
}

#[async_trait]
impl SourceAdapter for QuerySource {
    fn id(&self) -> SourceId {
        match self.scope {
            QueryScope::Tenant => SourceId::from("query"),
            QueryScope::Admin => SourceId::from("admin-query"),
        }
    }

    fn supports(&self, _kind: ResourceKind) -> bool {
        true
    }

    async fn query(
        &self,
        client: &VcdClient,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Vec<RawRecord>, SourceFailure> {
        let query_type = self.query_type(kind);
        let expression = Self::filter_expression(kind, filter);
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let mut params = vec![
                ("type", query_type.to_string()),
                ("format", "records".to_string()),
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(expr) = &expression {
                params.push(("filter", expr.clone()));
            }

            let body = client.get_xml("api/query", &params).await?;
            let parsed = parse_query_records(&body)?;
            let fetched = parsed.records.len();
            records.extend(parsed.records.into_iter().map(RawRecord::Attributes));

            let total = parsed.total.unwrap_or(records.len() as u64);
            if fetched == 0 || records.len() as u64 >= total {
                break;
            }
            if page >= MAX_PAGES {
                warn!(
                    "{}: stopping after {} pages, {} of {} records fetched, result is partial",
                    query_type,
                    page,
                    records.len(),
                    total
                );
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct QueryPage {
    pub total: Option<u64>,
    pub records: Vec<AttributeRecord>,
}

/// Parses a `QueryResultRecords` document. Namespace prefixes are dropped from
/// element and attribute names; namespace declarations are skipped.
pub fn parse_query_records(xml: &str) -> VcdResult<QueryPage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = QueryPage::default();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name();
                let element = std::str::from_utf8(local.as_ref())
                    .map_err(|err| VcdError::Xml(err.to_string()))?
                    .to_string();

                if element == "QueryResultRecords" {
                    saw_root = true;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"total" {
                            page.total = attr
                                .unescape_value()
                                .ok()
                                .and_then(|v| v.trim().parse().ok());
                        }
                    }
                    continue;
                }
                if !element.ends_with("Record") {
                    continue;
                }

                let mut record = AttributeRecord::new(element);
                for attr in e.attributes() {
                    let attr = match attr {
                        Ok(a) => a,
                        Err(err) => {
                            debug!("Skipping malformed attribute in {}: {}", record.element, err);
                            continue;
                        }
                    };
                    if attr.key.as_namespace_binding().is_some() {
                        continue;
                    }
                    let key = match std::str::from_utf8(attr.key.local_name().as_ref()) {
                        Ok(k) => k.to_string(),
                        Err(_) => continue,
                    };
                    match attr.unescape_value() {
                        Ok(value) => {
                            record.attributes.insert(key, value.into_owned());
                        }
                        Err(err) => debug!("Skipping undecodable attribute {}: {}", key, err),
                    }
                }
                page.records.push(record);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(VcdError::Xml(e.to_string())),
            _ => {}
        }
    }

    if !saw_root {
        return Err(VcdError::Xml("missing QueryResultRecords element".to_string()));
    }
    Ok(page)
}

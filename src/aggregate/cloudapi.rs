use super::source::{fiql_safe, FailureCause, RawRecord, SourceAdapter, SourceFailure, SourceId};
use super::{ResourceFilter, ResourceKind};
use crate::vcloud::VcdClient;
use async_trait::async_trait;
use chrono::SecondsFormat;
use log::warn;
use serde_json::Value;

const PAGE_SIZE: u32 = 128;
const MAX_PAGES: u64 = 50;

struct Endpoint {
    path: &'static str,
    status: Option<&'static str>,
    timestamp: Option<&'static str>,
}

/// The structured CloudAPI list endpoints (`cloudapi/1.0.0/...`). Pages are
/// `{ "pageCount": n, "values": [...] }` with native JSON values.
#[derive(Default)]
pub struct CloudApiSource;

impl CloudApiSource {
    pub fn new() -> Self {
        Self
    }

    fn endpoint(kind: ResourceKind) -> Option<Endpoint> {
        match kind {
            ResourceKind::VirtualMachine => Some(Endpoint {
                path: "cloudapi/1.0.0/vms",
                status: Some("status"),
                timestamp: Some("creationDate"),
            }),
            ResourceKind::Event => Some(Endpoint {
                path: "cloudapi/1.0.0/auditTrail",
                status: Some("eventStatus"),
                timestamp: Some("timestamp"),
            }),
            ResourceKind::StorageProfile => Some(Endpoint {
                path: "cloudapi/1.0.0/orgVdcStoragePolicies",
                status: None,
                timestamp: None,
            }),
            ResourceKind::Catalog => Some(Endpoint {
                path: "cloudapi/1.0.0/catalogs",
                status: None,
                timestamp: Some("creationDate"),
            }),
            ResourceKind::Task => None,
        }
    }

    /// FIQL for the predicates the endpoint can evaluate without narrowing below
    /// [`matches`](super::filter::matches). Name and container stay client-side:
    /// both are case-insensitive there, and a container may be given as an id.
    pub fn filter_expression(kind: ResourceKind, filter: &ResourceFilter) -> Option<String> {
        let endpoint = Self::endpoint(kind)?;
        let mut terms = Vec::new();

        if let (Some(attr), Some(status)) = (endpoint.status, filter.status.as_deref()) {
            if fiql_safe(status) {
                terms.push(format!("{}=={}", attr, status));
            }
        }
        if let (Some(attr), Some(since)) = (endpoint.timestamp, filter.since) {
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
impl SourceAdapter for CloudApiSource {
    fn id(&self) -> SourceId {
        SourceId::from("cloudapi")
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        Self::endpoint(kind).is_some()
    }

    async fn query(
        &self,
        client: &VcdClient,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Vec<RawRecord>, SourceFailure> {
        let endpoint = Self::endpoint(kind).ok_or_else(|| {
            SourceFailure::new(FailureCause::NotFound, format!("No CloudAPI endpoint for {}", kind))
        })?;
        let expression = Self::filter_expression(kind, filter);
        let mut records = Vec::new();
        let mut page: u64 = 1;

        loop {
            let mut params = vec![("page", page.to_string()), ("pageSize", PAGE_SIZE.to_string())];
            if let Some(expr) = &expression {
                params.push(("filter", expr.clone()));
            }

            let mut body = client.get_json(endpoint.path, &params).await?;
            let values = match body.get_mut("values").map(Value::take) {
                Some(Value::Array(values)) => values,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(SourceFailure::new(
                        FailureCause::Decode,
                        format!("{}: 'values' is not a list", endpoint.path),
                    ))
                }
            };
            let fetched = values.len();
            records.extend(values.into_iter().map(RawRecord::Structured));

            let page_count = body.get("pageCount").and_then(Value::as_u64).unwrap_or(page);
            if fetched == 0 || page >= page_count {
                break;
            }
            if page >= MAX_PAGES {
                warn!(
                    "{}: stopping after {} of {} pages, result is partial",
                    endpoint.path, page, page_count
                );
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

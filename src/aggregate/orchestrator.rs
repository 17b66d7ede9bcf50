use super::cloudapi::CloudApiSource;
use super::dedupe::dedupe;
use super::error::AggregateError;
use super::filter::matches;
use super::normalize::normalize_batch;
use super::query::QuerySource;
use super::record::{CanonicalRecord, IdentityScope};
use super::source::{FailureCause, RawRecord, SourceAdapter, SourceFailure, SourceId};
use super::{ResourceFilter, ResourceKind};
use crate::vcloud::VcdClient;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success { count: usize },
    Failure(SourceFailure),
}

/// What happened when one source was asked. `count` is the number of raw
/// records the source returned, before normalization and filtering.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: SourceId,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn failure(&self) -> Option<&SourceFailure> {
        match &self.status {
            OutcomeStatus::Failure(f) => Some(f),
            OutcomeStatus::Success { .. } => None,
        }
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Success { count } => write!(f, "{}: {} records", self.source, count),
            OutcomeStatus::Failure(failure) => write!(f, "{}: {}", self.source, failure),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub kind: ResourceKind,
    pub records: Vec<CanonicalRecord>,
    pub outcomes: Vec<SourceOutcome>,
}

impl AggregationResult {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Sources to ask, highest priority first. `None` uses registration order.
    pub priority: Option<Vec<SourceId>>,
    /// Fail with [`AggregateError::NoSourcesAvailable`] unless at least one source succeeds.
    pub require_success: bool,
    pub identity: IdentityScope,
    pub concurrent: bool,
    pub source_timeout: Option<Duration>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            priority: None,
            require_success: true,
            identity: IdentityScope::default(),
            concurrent: true,
            source_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Registry of source adapters plus the fan-out/normalize/filter/dedupe pipeline.
pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::with_default_sources()
    }
}

impl Aggregator {
    pub fn empty() -> Self {
        Self { adapters: Vec::new() }
    }

    /// CloudAPI first, then the admin and tenant query services.
    pub fn with_default_sources() -> Self {
        let mut aggregator = Self::empty();
        aggregator
            .register(Arc::new(CloudApiSource::new()))
            .register(Arc::new(QuerySource::admin()))
            .register(Arc::new(QuerySource::tenant()));
        aggregator
    }

    /// Adds an adapter at the lowest priority, replacing one with the same id.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        let id = adapter.id();
        match self.adapters.iter().position(|a| a.id() == id) {
            Some(idx) => self.adapters[idx] = adapter,
            None => self.adapters.push(adapter),
        }
        self
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn sources_for(&self, kind: ResourceKind) -> Vec<SourceId> {
        self.adapters
            .iter()
            .filter(|a| a.supports(kind))
            .map(|a| a.id())
            .collect()
    }

    fn plan(
        &self,
        kind: ResourceKind,
        priority: Option<&[SourceId]>,
    ) -> Result<Vec<Arc<dyn SourceAdapter>>, AggregateError> {
        let ordered: Vec<Arc<dyn SourceAdapter>> = match priority {
            None => self.adapters.clone(),
            Some(ids) => {
                let mut ordered: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(ids.len());
                for id in ids {
                    if ordered.iter().any(|a| &a.id() == id) {
                        continue;
                    }
                    let adapter = self
                        .adapters
                        .iter()
                        .find(|a| &a.id() == id)
                        .ok_or_else(|| AggregateError::UnknownSource(id.to_string()))?;
                    ordered.push(Arc::clone(adapter));
                }
                ordered
            }
        };

        Ok(ordered
            .into_iter()
            .filter(|a| {
                let applies = a.supports(kind);
                if !applies {
                    debug!("Skipping {} for {}: not applicable", a.id(), kind);
                }
                applies
            })
            .collect())
    }

    async fn invoke(
        adapter: &dyn SourceAdapter,
        client: &VcdClient,
        kind: ResourceKind,
        filter: &ResourceFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<RawRecord>, SourceFailure> {
        let fut = adapter.query(client, kind, filter);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(SourceFailure::new(
                    FailureCause::Timeout,
                    format!("no response within {}ms", limit.as_millis()),
                )),
            },
            None => fut.await,
        }
    }

    pub async fn aggregate(
        &self,
        client: &VcdClient,
        kind: ResourceKind,
        filter: &ResourceFilter,
        options: &AggregateOptions,
    ) -> Result<AggregationResult, AggregateError> {
        let plan = self.plan(kind, options.priority.as_deref())?;
        debug!(
            "Aggregating {} from [{}]",
            kind,
            plan.iter().map(|a| a.id().to_string()).collect::<Vec<_>>().join(", ")
        );

        // join_all yields results in input order, so priority order survives concurrent fan-out
        let responses = if options.concurrent {
            join_all(
                plan.iter()
                    .map(|a| Self::invoke(a.as_ref(), client, kind, filter, options.source_timeout)),
            )
            .await
        } else {
            let mut responses = Vec::with_capacity(plan.len());
            for adapter in &plan {
                responses.push(Self::invoke(adapter.as_ref(), client, kind, filter, options.source_timeout).await);
            }
            responses
        };

        let mut outcomes = Vec::with_capacity(plan.len());
        let mut merged = Vec::new();

        for (adapter, response) in plan.iter().zip(responses) {
            let source = adapter.id();
            match response {
                Ok(raws) => {
                    outcomes.push(SourceOutcome {
                        source: source.clone(),
                        status: OutcomeStatus::Success { count: raws.len() },
                    });
                    let (records, dropped) = normalize_batch(kind, &source, &raws);
                    if dropped > 0 {
                        warn!("{}: {} of {} {} records could not be normalized", source, dropped, raws.len(), kind);
                    }
                    merged.extend(records.into_iter().filter(|r| matches(r, filter)));
                }
                Err(failure) => {
                    warn!("{}: {} query failed: {}", source, kind, failure);
                    outcomes.push(SourceOutcome {
                        source,
                        status: OutcomeStatus::Failure(failure),
                    });
                }
            }
        }

        if options.require_success && !outcomes.iter().any(SourceOutcome::is_success) {
            return Err(AggregateError::NoSourcesAvailable { kind, outcomes });
        }

        let mut records = dedupe(merged, options.identity);
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }

        info!(
            "Aggregated {} {} records from {} sources ({} failed)",
            records.len(),
            kind,
            outcomes.len(),
            outcomes.iter().filter(|o| !o.is_success()).count()
        );

        Ok(AggregationResult {
            kind,
            records,
            outcomes,
        })
    }
}

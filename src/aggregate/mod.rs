//! Multi-backend resource queries.
//!
//! The same logical resource is visible through the structured CloudAPI and
//! through the legacy query service (tenant and admin flavours). Each of those
//! is a [`SourceAdapter`]; the [`Aggregator`] fans out to every adapter that
//! applies to a [`ResourceKind`], normalizes whatever came back into
//! [`CanonicalRecord`]s, filters them client-side, deduplicates by identity
//! key, and reports a [`SourceOutcome`] per attempted source.

pub mod cloudapi;
pub mod dedupe;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod orchestrator;
pub mod query;
pub mod record;
pub mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{AggregateError, NormalizeError};
pub use orchestrator::{AggregateOptions, AggregationResult, Aggregator, OutcomeStatus, SourceOutcome};
pub use record::{CanonicalRecord, IdentityScope, KindFields};
pub use source::{AttributeRecord, FailureCause, RawRecord, SourceAdapter, SourceFailure, SourceId};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VirtualMachine,
    Task,
    Event,
    StorageProfile,
    Catalog,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::VirtualMachine,
        ResourceKind::Task,
        ResourceKind::Event,
        ResourceKind::StorageProfile,
        ResourceKind::Catalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "virtual_machine",
            ResourceKind::Task => "task",
            ResourceKind::Event => "event",
            ResourceKind::StorageProfile => "storage_profile",
            ResourceKind::Catalog => "catalog",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "virtual_machine" | "vm" | "vms" => Ok(ResourceKind::VirtualMachine),
            "task" | "tasks" => Ok(ResourceKind::Task),
            "event" | "events" => Ok(ResourceKind::Event),
            "storage_profile" | "storage_profiles" => Ok(ResourceKind::StorageProfile),
            "catalog" | "catalogs" => Ok(ResourceKind::Catalog),
            other => Err(format!("Unknown resource kind: {}", other)),
        }
    }
}

/// Logical predicates shared by the adapters (server-side, best effort) and the
/// filter evaluator (client-side, authoritative).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    /// Case-insensitive substring of the record name.
    pub name: Option<String>,
    /// Case-insensitive substring of the container name, or an exact container id.
    pub container: Option<String>,
    /// Exact status value.
    pub status: Option<String>,
    /// Inclusive lower bound on the record timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of merged records returned.
    pub limit: Option<usize>,
}

impl ResourceFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.container.is_none() && self.status.is_none() && self.since.is_none()
    }
}

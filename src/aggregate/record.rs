use super::source::SourceId;
use super::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logical entity after normalization. Fields a source did not report stay `None`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub kind: ResourceKind,
    pub source: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: KindFields,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum KindFields {
    VirtualMachine {
        #[serde(skip_serializing_if = "Option::is_none")]
        cpu_count: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        memory_mb: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        guest_os: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        deployed: Option<bool>,
    },
    Task {
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<DateTime<Utc>>,
    },
    Event {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    StorageProfile {
        #[serde(skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_default: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit_mb: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        used_mb: Option<i64>,
    },
    Catalog {
        #[serde(skip_serializing_if = "Option::is_none")]
        owner_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        published: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shared: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        template_count: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_count: Option<i64>,
    },
}

/// How the deduplicator scopes identity. `Name` merges same-named entities even
/// across containers; `NameAndContainer` keeps them apart.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityScope {
    #[default]
    Name,
    NameAndContainer,
}

impl std::str::FromStr for IdentityScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "name" => Ok(IdentityScope::Name),
            "name_and_container" => Ok(IdentityScope::NameAndContainer),
            other => Err(format!("Unknown identity scope: {}", other)),
        }
    }
}

impl ResourceKind {
    /// Tasks and events share names across instances, so they key on the id.
    pub fn keys_on_id(&self) -> bool {
        matches!(self, ResourceKind::Task | ResourceKind::Event)
    }
}

impl CanonicalRecord {
    pub fn natural_key(&self) -> Option<&str> {
        if self.kind.keys_on_id() {
            self.id.as_deref()
        } else {
            self.name.as_deref()
        }
    }

    pub fn identity_key(&self, scope: IdentityScope) -> Option<String> {
        let key = self.natural_key()?.trim();
        match scope {
            IdentityScope::Name => Some(key.to_string()),
            IdentityScope::NameAndContainer => {
                let container = self
                    .container_name
                    .as_deref()
                    .or(self.container_id.as_deref())
                    .unwrap_or("");
                Some(format!("{}/{}", container, key))
            }
        }
    }

    pub fn cpu_count(&self) -> Option<i64> {
        match &self.fields {
            KindFields::VirtualMachine { cpu_count, .. } => *cpu_count,
            _ => None,
        }
    }

    pub fn memory_mb(&self) -> Option<i64> {
        match &self.fields {
            KindFields::VirtualMachine { memory_mb, .. } => *memory_mb,
            _ => None,
        }
    }
}

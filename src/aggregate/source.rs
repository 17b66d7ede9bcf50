use super::{ResourceFilter, ResourceKind};
use crate::vcloud::{VcdClient, VcdError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A legacy query record: the element name plus every attribute as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRecord {
    pub element: String,
    pub attributes: BTreeMap<String, String>,
}

impl AttributeRecord {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Payload as it came off the wire, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Structured(Value),
    Attributes(AttributeRecord),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    Unauthorized,
    Forbidden,
    NotFound,
    Unavailable,
    Timeout,
    Transport,
    Decode,
    Other,
}

impl FailureCause {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => FailureCause::Unauthorized,
            403 => FailureCause::Forbidden,
            404 => FailureCause::NotFound,
            408 => FailureCause::Timeout,
            500..=599 => FailureCause::Unavailable,
            _ => FailureCause::Other,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCause::Unauthorized => "unauthorized",
            FailureCause::Forbidden => "forbidden",
            FailureCause::NotFound => "not-found",
            FailureCause::Unavailable => "unavailable",
            FailureCause::Timeout => "timeout",
            FailureCause::Transport => "transport",
            FailureCause::Decode => "decode",
            FailureCause::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub cause: FailureCause,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl SourceFailure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} ({}): {}", self.cause, code, self.message),
            None => write!(f, "{}: {}", self.cause, self.message),
        }
    }
}

impl From<VcdError> for SourceFailure {
    fn from(err: VcdError) -> Self {
        let cause = match &err {
            VcdError::Api(status, _) => FailureCause::from_status(status.as_u16()),
            VcdError::Auth(_) => FailureCause::Unauthorized,
            VcdError::Json(_) | VcdError::Xml(_) => FailureCause::Decode,
            VcdError::Request(e) if e.is_decode() => FailureCause::Decode,
            VcdError::Request(e) if e.is_timeout() => FailureCause::Timeout,
            VcdError::Request(e) => e
                .status()
                .map(|s| FailureCause::from_status(s.as_u16()))
                .unwrap_or(FailureCause::Transport),
            VcdError::Url(_) => FailureCause::Other,
            VcdError::Timeout(_) => FailureCause::Timeout,
        };
        Self {
            cause,
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// One backend query interface.
///
/// `query` returns every raw record the backend matched. Predicates the
/// backend cannot express are left to the filter evaluator, so an adapter may
/// return more than the filter asks for but never less. A valid empty response
/// is `Ok(vec![])`; an error status is a [`SourceFailure`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    fn supports(&self, kind: ResourceKind) -> bool;

    async fn query(
        &self,
        client: &VcdClient,
        kind: ResourceKind,
        filter: &ResourceFilter,
    ) -> Result<Vec<RawRecord>, SourceFailure>;
}

/// Characters that carry meaning in FIQL filter expressions. Values containing
/// any of them are not sent server-side.
const FIQL_RESERVED: &[char] = &[';', ',', '(', ')', '=', '*', '!', '<', '>', '"', '\''];

pub(crate) fn fiql_safe(value: &str) -> bool {
    !value.is_empty() && !value.contains(FIQL_RESERVED)
}

use super::orchestrator::SourceOutcome;
use super::ResourceKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("raw record is not an object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingKey(&'static str),
}

#[derive(Error, Debug, Clone)]
pub enum AggregateError {
    #[error("No source produced a result for {kind}: {}", summarize(.outcomes))]
    NoSourcesAvailable {
        kind: ResourceKind,
        outcomes: Vec<SourceOutcome>,
    },

    #[error("Unknown source in priority order: {0}")]
    UnknownSource(String),
}

fn summarize(outcomes: &[SourceOutcome]) -> String {
    if outcomes.is_empty() {
        return "no applicable sources".to_string();
    }
    outcomes
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

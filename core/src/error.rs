use std::path::PathBuf;

use crate::decision::Action;
use crate::generator::GeneratorError;

/// Every failure the decision graph, its codec, or the orchestration step can surface.
#[derive(Debug, thiserror::Error)]
pub enum LoomError {
    #[error("node '{id}' does not exist")]
    NodeNotFound { id: String },

    #[error("decision event '{id}' does not exist")]
    EventNotFound { id: String },

    /// The chosen (or in-tension) node is not one of the event's candidates.
    #[error("node '{node_id}' is not a candidate of decision '{event_id}'")]
    NotACandidate { event_id: String, node_id: String },

    #[error("decision '{event_id}' is already resolved as '{action}'")]
    AlreadyResolved { event_id: String, action: Action },

    #[error("decision '{event_id}' is not awaiting clarification")]
    NotAwaitingClarification { event_id: String },

    #[error("decision '{event_id}' is still pending")]
    Unresolved { event_id: String },

    #[error("a decision needs at least one candidate")]
    NoCandidates,

    /// A candidate id is already in the graph or repeats within one batch.
    #[error("node '{id}' is already part of the loom")]
    DuplicateNode { id: String },

    /// NaN and infinities have no JSON representation, so they never enter the graph.
    #[error("{field} must be a finite number")]
    NonFiniteValue { field: String },

    #[error("the loom has no tip to extend")]
    EmptyPath,

    /// Committing this choice would append a node whose parent is not the current tip.
    #[error("decision '{event_id}' branches from '{parent_node_id}', but the current tip is '{tip}'")]
    DetachedDecision {
        event_id: String,
        parent_node_id: String,
        tip: String,
    },

    #[error("generator returned {actual} candidates, expected {expected}")]
    CandidateCountMismatch { expected: usize, actual: usize },

    #[error("unknown engine type '{0}'")]
    UnknownEngine(String),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record at {}:{line}: {source}", path.display())]
    ManifestLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("malformed brief '{}': {source}", path.display())]
    MalformedBrief {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl LoomError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoomError::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code for reporting (see [`codes`]).
    pub fn code(&self) -> &'static str {
        match self {
            LoomError::NodeNotFound { .. } | LoomError::EventNotFound { .. } => codes::NOT_FOUND,
            LoomError::NotACandidate { .. }
            | LoomError::DetachedDecision { .. }
            | LoomError::NoCandidates
            | LoomError::DuplicateNode { .. }
            | LoomError::UnknownEngine(_) => codes::INVALID_TARGET,
            LoomError::NonFiniteValue { .. } => codes::INVALID_VALUE,
            LoomError::AlreadyResolved { .. }
            | LoomError::NotAwaitingClarification { .. }
            | LoomError::Unresolved { .. } => codes::STATE_CONFLICT,
            LoomError::EmptyPath => codes::EMPTY_PATH,
            LoomError::CandidateCountMismatch { .. } | LoomError::Generator(_) => {
                codes::GENERATOR_FAILED
            }
            LoomError::Io { .. } => codes::IO_ERROR,
            LoomError::Json { .. }
            | LoomError::ManifestLine { .. }
            | LoomError::MalformedSnapshot(_)
            | LoomError::MalformedBrief { .. } => codes::MALFORMED_INPUT,
        }
    }
}

/// Error codes used across the core and the CLI
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_TARGET: &str = "invalid_target";
    pub const INVALID_VALUE: &str = "invalid_value";
    pub const STATE_CONFLICT: &str = "state_conflict";
    pub const EMPTY_PATH: &str = "empty_path";
    pub const GENERATOR_FAILED: &str = "generator_failed";
    pub const IO_ERROR: &str = "io_error";
    pub const MALFORMED_INPUT: &str = "malformed_input";
}

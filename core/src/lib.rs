pub mod brief;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod generator;
pub mod graph;
pub mod ids;
pub mod manifest;
pub mod node;
pub mod orchestrator;
pub mod prompt;
pub mod snapshot;
pub mod value;

pub use brief::{Brief, load_brief};
pub use config::{BaseEngineConfig, EngineType, SelectorConfig, SelectorMode, SessionConfig};
pub use decision::{Action, Choice, Clarification, DecisionEvent, LogprobDivergence, Outcome};
pub use error::LoomError;
pub use generator::{FakeGenerator, GeneratedCandidate, GenerationRequest, Generator, GeneratorError};
pub use graph::Loom;
pub use manifest::{ManifestRecord, append_decision, read_manifest};
pub use node::{ChosenBy, Node};
pub use orchestrator::Orchestrator;
pub use snapshot::{load_loom, save_loom};
pub use value::{MetaValue, Metadata, Scores};

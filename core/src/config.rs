use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoomError;
use crate::ids::new_id;
use crate::value::Metadata;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_OUTPUT_DIR: &str = "loom_sessions";
pub const SNAPSHOT_FILE: &str = "loom.json";
pub const MANIFEST_FILE: &str = "manifest.ndjson";

/// Which generator backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// Messages API prompted to act as a terminal printing the draft. No logprobs.
    #[default]
    ClaudeCliSim,
    /// Deterministic offline candidates.
    Fake,
}

impl EngineType {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineType::ClaudeCliSim => "claude_cli_sim",
            EngineType::Fake => "fake",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = LoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude_cli_sim" => Ok(EngineType::ClaudeCliSim),
            "fake" => Ok(EngineType::Fake),
            other => Err(LoomError::UnknownEngine(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMode {
    #[default]
    Agentic,
    Stateless,
    Human,
}

impl SelectorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectorMode::Agentic => "agentic",
            SelectorMode::Stateless => "stateless",
            SelectorMode::Human => "human",
        }
    }
}

/// Base text generation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseEngineConfig {
    pub engine_type: EngineType,
    pub model_name: String,
    /// Max tokens per candidate segment
    pub segment_tokens: u32,
    /// Candidates per decision
    pub branching_factor: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub max_logprobs: u32,
}

impl Default for BaseEngineConfig {
    fn default() -> Self {
        Self {
            engine_type: EngineType::default(),
            model_name: DEFAULT_MODEL.to_string(),
            segment_tokens: 6,
            branching_factor: 8,
            temperature: 1.0,
            top_p: 1.0,
            max_logprobs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub model_name: String,
    pub mode: SelectorMode,
    pub show_logprobs: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            mode: SelectorMode::default(),
            show_logprobs: true,
        }
    }
}

/// Configuration for a complete session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub id: String,
    pub base_engine: BaseEngineConfig,
    pub selector: SelectorConfig,
    /// Rough token budget for the whole piece
    pub max_tokens_total: u32,
    pub output_dir: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: new_id(),
            base_engine: BaseEngineConfig::default(),
            selector: SelectorConfig::default(),
            max_tokens_total: 1500,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            manifest_path: None,
        }
    }
}

impl SessionConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(SNAPSHOT_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(MANIFEST_FILE))
    }

    /// Flat view stored as the loom's `config`, so a snapshot records how it was produced.
    pub fn to_metadata(&self) -> Metadata {
        let engine = &self.base_engine;
        Metadata::from([
            ("session_config_id".to_string(), self.id.clone().into()),
            ("engine_type".to_string(), engine.engine_type.as_str().into()),
            ("model_name".to_string(), engine.model_name.clone().into()),
            ("segment_tokens".to_string(), engine.segment_tokens.into()),
            ("branching_factor".to_string(), engine.branching_factor.into()),
            ("temperature".to_string(), engine.temperature.into()),
            ("top_p".to_string(), engine.top_p.into()),
            ("max_logprobs".to_string(), engine.max_logprobs.into()),
            ("selector_mode".to_string(), self.selector.mode.as_str().into()),
            ("max_tokens_total".to_string(), self.max_tokens_total.into()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{EngineType, SelectorMode, SessionConfig};
    use crate::error::LoomError;
    use crate::value::MetaValue;

    #[test]
    fn defaults_match_session_conventions() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.base_engine.engine_type, EngineType::ClaudeCliSim);
        assert_eq!(cfg.base_engine.segment_tokens, 6);
        assert_eq!(cfg.base_engine.branching_factor, 8);
        assert_eq!(cfg.base_engine.max_logprobs, 0);
        assert_eq!(cfg.selector.mode, SelectorMode::Agentic);
        assert!(cfg.selector.show_logprobs);
        assert_eq!(cfg.max_tokens_total, 1500);
        assert_eq!(cfg.manifest_path, None);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionConfig::default().id, SessionConfig::default().id);
    }

    #[test]
    fn paths_derive_from_output_dir() {
        let mut cfg = SessionConfig {
            output_dir: PathBuf::from("out"),
            ..SessionConfig::default()
        };
        assert_eq!(cfg.snapshot_path(), PathBuf::from("out/loom.json"));
        assert_eq!(cfg.manifest_path(), PathBuf::from("out/manifest.ndjson"));

        cfg.manifest_path = Some(PathBuf::from("logs/decisions.ndjson"));
        assert_eq!(cfg.manifest_path(), PathBuf::from("logs/decisions.ndjson"));
    }

    #[test]
    fn engine_type_parses_wire_names() {
        assert_eq!("fake".parse::<EngineType>().unwrap(), EngineType::Fake);
        assert_eq!(
            "claude_cli_sim".parse::<EngineType>().unwrap(),
            EngineType::ClaudeCliSim
        );
        assert!(matches!(
            "vllm".parse::<EngineType>(),
            Err(LoomError::UnknownEngine(name)) if name == "vllm"
        ));
    }

    #[test]
    fn metadata_records_engine_settings() {
        let cfg = SessionConfig::default();
        let meta = cfg.to_metadata();
        assert_eq!(meta["engine_type"], MetaValue::from("claude_cli_sim"));
        assert_eq!(meta["branching_factor"], MetaValue::Int(8));
        assert_eq!(meta["temperature"], MetaValue::Float(1.0));
        assert_eq!(meta["session_config_id"].as_str(), Some(cfg.id.as_str()));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: SessionConfig = serde_json::from_value(serde_json::json!({
            "base_engine": {"branching_factor": 3, "engine_type": "fake"}
        }))
        .unwrap();
        assert_eq!(cfg.base_engine.branching_factor, 3);
        assert_eq!(cfg.base_engine.engine_type, EngineType::Fake);
        assert_eq!(cfg.base_engine.segment_tokens, 6);
    }
}

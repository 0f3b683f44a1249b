use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decision::{Action, DecisionEvent};
use crate::error::LoomError;
use crate::node::ChosenBy;

/// One line of the append-only decision audit log.
/// Self-contained: it can be read without the snapshot it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub session_id: String,
    pub decision_id: String,
    pub parent_node_id: String,
    pub candidate_node_ids: Vec<String>,
    pub action: Action,
    pub chosen_node_id: Option<String>,
    pub chosen_by: Option<ChosenBy>,
    pub reason: String,
    pub max_logprob: Option<f64>,
    pub chosen_logprob: Option<f64>,
    pub logprob_gap: Option<f64>,
    pub timestamp: f64,
}

impl ManifestRecord {
    pub fn from_event(event: &DecisionEvent, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            decision_id: event.id().to_string(),
            parent_node_id: event.parent_node_id().to_string(),
            candidate_node_ids: event.candidate_node_ids().to_vec(),
            action: event.action(),
            chosen_node_id: event.chosen_node_id().map(str::to_string),
            chosen_by: event.chosen_by(),
            reason: event.reason().to_string(),
            max_logprob: event.max_logprob(),
            chosen_logprob: event.chosen_logprob(),
            logprob_gap: event.logprob_gap(),
            timestamp: event.timestamp(),
        }
    }
}

/// Append a resolved decision to an NDJSON audit log, creating it (and its directory) if needed.
///
/// Each call writes exactly one line and never reads the existing file.
pub fn append_decision(
    path: impl AsRef<Path>,
    event: &DecisionEvent,
    session_id: &str,
) -> Result<(), LoomError> {
    let path = path.as_ref();
    if !event.is_resolved() {
        return Err(LoomError::Unresolved {
            event_id: event.id().to_string(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LoomError::io(parent, e))?;
    }

    let record = ManifestRecord::from_event(event, session_id);
    let mut line = serde_json::to_string(&record).map_err(|source| LoomError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoomError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| LoomError::io(path, e))?;

    tracing::debug!(
        session_id,
        decision_id = event.id(),
        action = %event.action(),
        path = %path.display(),
        "decision appended to manifest"
    );
    Ok(())
}

/// Read every record in file order. A missing log reads as empty; blank lines are skipped.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestRecord>, LoomError> {
    let path = path.as_ref();
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LoomError::io(path, e)),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| LoomError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ManifestRecord =
            serde_json::from_str(line).map_err(|source| LoomError::ManifestLine {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

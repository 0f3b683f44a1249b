use std::fs;
use std::path::Path;

use crate::error::LoomError;
use crate::graph::Loom;

/// Snapshot document for a loom. Keys are ordered, absent optionals are explicit nulls.
pub fn to_value(loom: &Loom) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(loom)
}

/// Inverse of [`to_value`]. Shape errors only; see [`Loom::validate`] for invariants.
pub fn from_value(value: serde_json::Value) -> Result<Loom, serde_json::Error> {
    serde_json::from_value(value)
}

pub fn to_json_string(loom: &Loom) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(loom)
}

/// Save a loom to a JSON file, replacing any previous snapshot.
///
/// The loom is validated first, so only a document [`load_loom`] accepts is ever written.
/// It goes to a sibling `.tmp` file and is then renamed over `path`, so a reader never
/// sees a half-written snapshot.
pub fn save_loom(loom: &Loom, path: impl AsRef<Path>) -> Result<(), LoomError> {
    let path = path.as_ref();
    loom.validate()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LoomError::io(parent, e))?;
    }

    let data = to_json_string(loom).map_err(|source| LoomError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    fs::write(&staging, data).map_err(|e| LoomError::io(&staging, e))?;
    fs::rename(&staging, path).map_err(|e| LoomError::io(path, e))?;

    tracing::debug!(
        session_id = loom.session_id(),
        path = %path.display(),
        nodes = loom.nodes().len(),
        "snapshot saved"
    );
    Ok(())
}

/// Load and validate a loom snapshot.
pub fn load_loom(path: impl AsRef<Path>) -> Result<Loom, LoomError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| LoomError::io(path, e))?;
    let loom: Loom = serde_json::from_str(&data).map_err(|source| LoomError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    loom.validate()?;
    tracing::debug!(session_id = loom.session_id(), path = %path.display(), "snapshot loaded");
    Ok(loom)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{from_value, load_loom, save_loom, to_value};
    use crate::error::LoomError;
    use crate::graph::Loom;
    use crate::node::{ChosenBy, Node};
    use crate::value::{MetaValue, Metadata};

    fn loom_with_history() -> (Loom, String) {
        let config = Metadata::from([
            ("branching_factor".to_string(), MetaValue::Int(3)),
            ("temperature".to_string(), MetaValue::Float(0.9)),
            ("engine_type".to_string(), MetaValue::from("fake")),
        ]);
        let mut loom = Loom::create("The ", "write about speed", Some(config));
        let root = loom.tip().unwrap().clone();
        let nodes = vec![
            Node::from_candidate(&root, "quick", vec![11], Some(vec![-2.0]), Some(-2.0)),
            Node::from_candidate(&root, "slow", vec![12], Some(vec![-1.0]), Some(-1.0)),
            Node::from_candidate(&root, "fast", Vec::new(), None, None),
        ];
        let chosen = nodes[0].id().to_string();
        let event_id = loom.add_candidates(root.id(), nodes).unwrap().id().to_string();
        loom.commit_choice(&event_id, &chosen, ChosenBy::Human, "better rhythm")
            .unwrap();

        let tip = loom.tip().unwrap().clone();
        let next = vec![
            Node::from_candidate(&tip, " fox", Vec::new(), None, None),
            Node::from_candidate(&tip, " hare", Vec::new(), None, None),
        ];
        let tension: Vec<String> = next.iter().map(|n| n.id().to_string()).collect();
        let pending = loom.add_candidates(tip.id(), next).unwrap().id().to_string();
        loom.commit_clarify(&pending, "Which animal?", tension, "the fable's moral")
            .unwrap();
        (loom, chosen)
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("loom.json");
        let (loom, _) = loom_with_history();

        save_loom(&loom, &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested/deeper/loom.json.tmp").exists());
    }

    #[test]
    fn snapshot_has_expected_top_level_keys() {
        let (loom, _) = loom_with_history();
        let value = to_value(&loom).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "brief",
                "config",
                "created_at",
                "current_path",
                "decision_events",
                "held_paths",
                "nodes",
                "root_id",
                "session_id",
            ]
        );
        assert_eq!(value["config"]["branching_factor"], json!(3));
        assert_eq!(value["held_paths"], json!([]));
    }

    #[test]
    fn file_round_trip_reproduces_the_loom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        let (loom, chosen) = loom_with_history();

        save_loom(&loom, &path).unwrap();
        let loaded = load_loom(&path).unwrap();

        assert_eq!(loaded, loom);
        assert_eq!(loaded.current_text(), "The quick");
        assert_eq!(loaded.rejected_at(&chosen).unwrap().len(), 2);
        assert_eq!(loaded.find_clarifications().len(), 1);
        assert_eq!(loaded.find_divergences(-0.5).len(), 1);
    }

    #[test]
    fn absent_logprobs_stay_absent() {
        let (loom, _) = loom_with_history();
        let value = to_value(&loom).unwrap();
        let fast = value["nodes"]
            .as_object()
            .unwrap()
            .values()
            .find(|n| n["text"] == json!("fast"))
            .unwrap()
            .clone();
        assert_eq!(fast["token_logprobs"], json!(null));
        assert_eq!(fast["step_logprob"], json!(null));
        assert_eq!(fast["token_ids"], json!([]));

        let back = from_value(value).unwrap();
        let node = back.nodes().values().find(|n| n.text() == "fast").unwrap();
        assert_eq!(node.token_logprobs(), None);
        assert_eq!(node.step_logprob(), None);
    }

    #[test]
    fn present_logprobs_are_preserved() {
        let (loom, chosen) = loom_with_history();
        let back = from_value(to_value(&loom).unwrap()).unwrap();
        let node = back.node(&chosen).unwrap();
        assert_eq!(node.token_logprobs(), Some(&[-2.0][..]));
        assert_eq!(node.step_logprob(), Some(-2.0));
    }

    #[test]
    fn missing_optional_top_level_keys_default() {
        let (loom, _) = loom_with_history();
        let mut value = to_value(&loom).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("held_paths");
        object.remove("config");

        let back = from_value(value).unwrap();
        assert!(back.held_paths().is_empty());
        assert!(back.config().is_empty());
    }

    #[test]
    fn load_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_loom(&path), Err(LoomError::Json { .. })));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_loom(dir.path().join("absent.json")),
            Err(LoomError::Io { .. })
        ));
    }

    #[test]
    fn load_rejects_broken_path_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        let (loom, _) = loom_with_history();
        let mut value = to_value(&loom).unwrap();
        value["current_path"].as_array_mut().unwrap().reverse();
        std::fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(
            load_loom(&path),
            Err(LoomError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn load_rejects_stale_full_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        let (loom, chosen) = loom_with_history();
        let mut value = to_value(&loom).unwrap();
        value["nodes"][chosen.as_str()]["full_text"] = json!("tampered");
        std::fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(
            load_loom(&path),
            Err(LoomError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn save_refuses_non_finite_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        let config = Metadata::from([("temperature".to_string(), MetaValue::Float(f64::NAN))]);
        let loom = Loom::create("x", "", Some(config));

        assert!(matches!(
            save_loom(&loom, &path),
            Err(LoomError::NonFiniteValue { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn extreme_finite_values_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.json");
        let config = Metadata::from([
            ("tiny".to_string(), MetaValue::Float(f64::MIN_POSITIVE)),
            ("huge".to_string(), MetaValue::Float(f64::MAX)),
        ]);
        let mut loom = Loom::create("x", "", Some(config));
        let root = loom.tip().unwrap().clone();
        let node = Node::from_candidate(&root, "y", vec![1], Some(vec![-1e-300]), Some(-745.13));
        loom.add_candidates(root.id(), vec![node]).unwrap();

        save_loom(&loom, &path).unwrap();
        assert_eq!(load_loom(&path).unwrap(), loom);
    }
}

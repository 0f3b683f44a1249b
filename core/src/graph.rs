use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::clock::now_timestamp;
use crate::decision::{Action, DecisionEvent, Outcome};
use crate::error::LoomError;
use crate::ids::new_id;
use crate::node::{ChosenBy, Node};
use crate::value::{Metadata, Scores, non_finite_meta_key, non_finite_score_key};

/// The complete branching text structure for one session.
///
/// Nodes and decision events live in id-keyed maps and reference each other by id only.
/// Nothing is ever removed: rejected candidates stay in `nodes` for later analysis.
/// `current_path` runs from the root to the active tip and only grows through
/// [`Loom::commit_choice`].
///
/// The struct is also the snapshot document: its serde shape is the persisted JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loom {
    session_id: String,
    root_id: Option<String>,
    current_path: Vec<String>,
    /// Parked alternate paths. Not advanced by any operation here.
    #[serde(default)]
    held_paths: Vec<Vec<String>>,
    brief: String,
    #[serde(default)]
    config: Metadata,
    #[serde(default = "now_timestamp")]
    created_at: f64,
    nodes: BTreeMap<String, Node>,
    decision_events: BTreeMap<String, DecisionEvent>,
}

impl Default for Loom {
    /// The root-less zero state. Path queries answer "empty" rather than failing.
    fn default() -> Self {
        Self {
            session_id: new_id(),
            root_id: None,
            current_path: Vec::new(),
            held_paths: Vec::new(),
            brief: String::new(),
            config: Metadata::new(),
            created_at: now_timestamp(),
            nodes: BTreeMap::new(),
            decision_events: BTreeMap::new(),
        }
    }
}

impl Loom {
    /// Initialize a new loom with a single root node made from `seed_text`.
    pub fn create(
        seed_text: impl Into<String>,
        brief: impl Into<String>,
        config: Option<Metadata>,
    ) -> Self {
        let root = Node::create_root(seed_text);
        let root_id = root.id().to_string();
        let loom = Self {
            root_id: Some(root_id.clone()),
            current_path: vec![root_id.clone()],
            brief: brief.into(),
            config: config.unwrap_or_default(),
            nodes: BTreeMap::from([(root_id, root)]),
            ..Self::default()
        };
        tracing::debug!(session_id = %loom.session_id, "loom created");
        loom
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn current_path(&self) -> &[String] {
        &self.current_path
    }

    pub fn held_paths(&self) -> &[Vec<String>] {
        &self.held_paths
    }

    pub fn brief(&self) -> &str {
        &self.brief
    }

    pub fn config(&self) -> &Metadata {
        &self.config
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub fn decision_events(&self) -> &BTreeMap<String, DecisionEvent> {
        &self.decision_events
    }

    pub fn node(&self, id: &str) -> Result<&Node, LoomError> {
        self.nodes
            .get(id)
            .ok_or_else(|| LoomError::NodeNotFound { id: id.to_string() })
    }

    pub fn event(&self, id: &str) -> Result<&DecisionEvent, LoomError> {
        self.decision_events
            .get(id)
            .ok_or_else(|| LoomError::EventNotFound { id: id.to_string() })
    }

    fn event_mut(&mut self, id: &str) -> Result<&mut DecisionEvent, LoomError> {
        self.decision_events
            .get_mut(id)
            .ok_or_else(|| LoomError::EventNotFound { id: id.to_string() })
    }

    /// Full text of the current path; empty for a root-less loom.
    pub fn current_text(&self) -> &str {
        self.tip().map(Node::full_text).unwrap_or("")
    }

    pub fn tip(&self) -> Option<&Node> {
        self.current_path.last().and_then(|id| self.nodes.get(id))
    }

    /// Nodes along the current path, root first.
    pub fn path_nodes(&self) -> Result<Vec<&Node>, LoomError> {
        self.current_path.iter().map(|id| self.node(id)).collect()
    }

    /// Add candidate nodes under `parent_id` and open a pending decision over them.
    ///
    /// Each node is re-parented (and its cached full text recomputed) under `parent_id`,
    /// then back-linked to the new event. `parent_id` should be the current tip; anything
    /// else builds a branch disconnected from the active path.
    pub fn add_candidates(
        &mut self,
        parent_id: &str,
        candidates: Vec<Node>,
    ) -> Result<&DecisionEvent, LoomError> {
        let parent = self.node(parent_id)?.clone();
        if candidates.is_empty() {
            return Err(LoomError::NoCandidates);
        }
        let mut seen = HashSet::new();
        for node in &candidates {
            if self.nodes.contains_key(node.id()) || !seen.insert(node.id()) {
                return Err(LoomError::DuplicateNode {
                    id: node.id().to_string(),
                });
            }
            check_node_finite(node)?;
        }
        if self.current_path.last().map(String::as_str) != Some(parent_id) {
            tracing::warn!(
                session_id = %self.session_id,
                parent_id,
                "adding candidates under a node that is not the current tip"
            );
        }

        let candidate_ids: Vec<String> = candidates.iter().map(|n| n.id().to_string()).collect();
        let event = DecisionEvent::create(parent_id, candidate_ids)?;
        let event_id = event.id().to_string();

        for mut node in candidates {
            node.attach_to(&parent);
            node.link_decision(&event_id);
            self.nodes.insert(node.id().to_string(), node);
        }
        tracing::debug!(
            session_id = %self.session_id,
            decision_id = %event_id,
            candidates = event.candidate_node_ids().len(),
            "decision opened"
        );

        let event = self.decision_events.entry(event_id).or_insert(event);
        Ok(&*event)
    }

    /// Resolve `event_id` as a choice of `chosen_node_id` and extend the current path.
    pub fn commit_choice(
        &mut self,
        event_id: &str,
        chosen_node_id: &str,
        chosen_by: ChosenBy,
        reason: &str,
    ) -> Result<(), LoomError> {
        self.commit(event_id, chosen_node_id, chosen_by, reason, None)
    }

    /// Like [`Loom::commit_choice`], also recording selector scores on the event and on
    /// each scored candidate node.
    pub fn commit_scored_choice(
        &mut self,
        event_id: &str,
        chosen_node_id: &str,
        chosen_by: ChosenBy,
        reason: &str,
        candidate_scores: BTreeMap<String, Scores>,
    ) -> Result<(), LoomError> {
        self.commit(
            event_id,
            chosen_node_id,
            chosen_by,
            reason,
            Some(candidate_scores),
        )
    }

    fn commit(
        &mut self,
        event_id: &str,
        chosen_node_id: &str,
        chosen_by: ChosenBy,
        reason: &str,
        candidate_scores: Option<BTreeMap<String, Scores>>,
    ) -> Result<(), LoomError> {
        self.node(chosen_node_id)?;
        let event = self.event(event_id)?;
        if matches!(event.action(), Action::Choose | Action::Stop) {
            return Err(LoomError::AlreadyResolved {
                event_id: event_id.to_string(),
                action: event.action(),
            });
        }
        if let Some(scores) = &candidate_scores {
            for (node_id, node_scores) in scores {
                if let Some(metric) = non_finite_score_key(node_scores) {
                    return Err(LoomError::NonFiniteValue {
                        field: format!("score '{metric}' of node '{node_id}'"),
                    });
                }
            }
        }
        let parent_node_id = event.parent_node_id().to_string();
        let tip = self.current_path.last().cloned().unwrap_or_default();
        if parent_node_id != tip {
            return Err(LoomError::DetachedDecision {
                event_id: event_id.to_string(),
                parent_node_id,
                tip,
            });
        }

        let event = self
            .decision_events
            .get_mut(event_id)
            .ok_or_else(|| LoomError::EventNotFound {
                id: event_id.to_string(),
            })?;
        event.resolve_choose(
            chosen_node_id,
            chosen_by,
            reason,
            candidate_scores.clone(),
            Some(&self.nodes),
        )?;
        let gap = event.logprob_gap();

        for (node_id, scores) in candidate_scores.unwrap_or_default() {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.set_scores(scores);
            }
        }
        if let Some(node) = self.nodes.get_mut(chosen_node_id) {
            node.mark_chosen(chosen_by, reason);
        }
        self.current_path.push(chosen_node_id.to_string());

        tracing::debug!(
            session_id = %self.session_id,
            decision_id = event_id,
            chosen_node_id,
            %chosen_by,
            logprob_gap = ?gap,
            path_len = self.current_path.len(),
            "choice committed"
        );
        Ok(())
    }

    /// Resolve `event_id` as a stop. The current path is unchanged.
    pub fn commit_stop(&mut self, event_id: &str, reason: &str) -> Result<(), LoomError> {
        self.event_mut(event_id)?.resolve_stop(reason)?;
        tracing::debug!(session_id = %self.session_id, decision_id = event_id, "stop committed");
        Ok(())
    }

    /// Pause `event_id` for a human answer. The current path is unchanged.
    pub fn commit_clarify(
        &mut self,
        event_id: &str,
        question: &str,
        candidates_in_tension: Vec<String>,
        what_hinges_on_it: &str,
    ) -> Result<(), LoomError> {
        self.event_mut(event_id)?
            .resolve_clarify(question, candidates_in_tension, what_hinges_on_it)?;
        tracing::debug!(
            session_id = %self.session_id,
            decision_id = event_id,
            "clarification requested"
        );
        Ok(())
    }

    pub fn record_clarification_response(
        &mut self,
        event_id: &str,
        response: &str,
    ) -> Result<(), LoomError> {
        self.event_mut(event_id)?.record_human_response(response)
    }

    // === Queries ===

    /// Sibling candidates offered alongside `node_id`, minus the chosen one.
    /// Empty for nodes that were never part of a decision, such as the root.
    pub fn rejected_at(&self, node_id: &str) -> Result<Vec<&Node>, LoomError> {
        let node = self.node(node_id)?;
        let Some(decision_id) = node.decision_id() else {
            return Ok(Vec::new());
        };
        let event = self.event(decision_id)?;
        event
            .candidate_node_ids()
            .iter()
            .filter(|id| Some(id.as_str()) != event.chosen_node_id())
            .map(|id| self.node(id))
            .collect()
    }

    /// Most recent `n` decisions, newest first.
    pub fn last_n_decisions(&self, n: usize) -> Vec<&DecisionEvent> {
        let mut events: Vec<&DecisionEvent> = self.decision_events.values().collect();
        events.sort_by(|a, b| b.timestamp().total_cmp(&a.timestamp()));
        events.truncate(n);
        events
    }

    /// Decisions where the chosen candidate trailed the generator's best by more than
    /// `|threshold|`, i.e. `logprob_gap < threshold`. Events without logprob data never match.
    pub fn find_divergences(&self, threshold: f64) -> Vec<&DecisionEvent> {
        self.decision_events
            .values()
            .filter(|event| event.logprob_gap().is_some_and(|gap| gap < threshold))
            .collect()
    }

    pub fn find_clarifications(&self) -> Vec<&DecisionEvent> {
        self.decision_events
            .values()
            .filter(|event| event.action() == Action::Clarify)
            .collect()
    }

    /// Check the structural invariants. Used when saving and loading snapshots.
    pub fn validate(&self) -> Result<(), LoomError> {
        let malformed = |message: String| Err(LoomError::MalformedSnapshot(message));

        if let Some(key) = non_finite_meta_key(&self.config) {
            return Err(LoomError::NonFiniteValue {
                field: format!("config '{key}'"),
            });
        }
        for node in self.nodes.values() {
            check_node_finite(node)?;
        }
        for event in self.decision_events.values() {
            if let Outcome::Choose(choice) = event.outcome() {
                for (node_id, scores) in &choice.candidate_scores {
                    if let Some(metric) = non_finite_score_key(scores) {
                        return Err(LoomError::NonFiniteValue {
                            field: format!(
                                "score '{metric}' of node '{node_id}' in decision '{}'",
                                event.id()
                            ),
                        });
                    }
                }
            }
        }

        for (key, node) in &self.nodes {
            if key != node.id() {
                return malformed(format!("node stored under '{key}' has id '{}'", node.id()));
            }
            match node.parent_id() {
                None if self.root_id.as_deref() != Some(key.as_str()) => {
                    return malformed(format!("node '{key}' has no parent but is not the root"));
                }
                None => {}
                Some(parent_id) => {
                    let Some(parent) = self.nodes.get(parent_id) else {
                        return malformed(format!(
                            "node '{key}' references missing parent '{parent_id}'"
                        ));
                    };
                    if node.full_text() != format!("{}{}", parent.full_text(), node.text()) {
                        return malformed(format!("node '{key}' has a stale full_text"));
                    }
                }
            }
            if let Some(decision_id) = node.decision_id() {
                let linked = self
                    .decision_events
                    .get(decision_id)
                    .is_some_and(|event| event.is_candidate(key));
                if !linked {
                    return malformed(format!(
                        "node '{key}' links to decision '{decision_id}' that does not list it"
                    ));
                }
            }
        }

        for (key, event) in &self.decision_events {
            if key != event.id() {
                return malformed(format!("decision stored under '{key}' has id '{}'", event.id()));
            }
            if !self.nodes.contains_key(event.parent_node_id()) {
                return malformed(format!(
                    "decision '{key}' references missing parent '{}'",
                    event.parent_node_id()
                ));
            }
            let mut seen = HashSet::new();
            for id in event.candidate_node_ids() {
                if !self.nodes.contains_key(id) {
                    return malformed(format!("decision '{key}' references missing node '{id}'"));
                }
                if !seen.insert(id) {
                    return malformed(format!("decision '{key}' lists '{id}' twice"));
                }
            }
        }

        match (self.root_id.as_deref(), self.current_path.first()) {
            (None, None) => {}
            (Some(root_id), Some(first)) if root_id == first => {
                if !self.nodes.contains_key(root_id) {
                    return malformed(format!("root '{root_id}' is missing"));
                }
            }
            _ => return malformed("current_path does not start at root_id".to_string()),
        }
        for pair in self.current_path.windows(2) {
            let Some(child) = self.nodes.get(&pair[1]) else {
                return malformed(format!("current_path references missing node '{}'", pair[1]));
            };
            if child.parent_id() != Some(pair[0].as_str()) {
                return malformed(format!(
                    "current_path breaks between '{}' and '{}'",
                    pair[0], pair[1]
                ));
            }
        }
        Ok(())
    }
}

/// Reject NaN or infinite logprobs, scores and metadata on a node.
fn check_node_finite(node: &Node) -> Result<(), LoomError> {
    let field = |name: &str| LoomError::NonFiniteValue {
        field: format!("{name} of node '{}'", node.id()),
    };
    if !node.step_logprob().is_none_or(f64::is_finite) {
        return Err(field("step_logprob"));
    }
    if !node
        .token_logprobs()
        .unwrap_or_default()
        .iter()
        .all(|lp| lp.is_finite())
    {
        return Err(field("token_logprobs"));
    }
    if let Some(metric) = non_finite_score_key(node.scores()) {
        return Err(field(&format!("score '{metric}'")));
    }
    if let Some(key) = non_finite_meta_key(node.meta()) {
        return Err(field(&format!("meta '{key}'")));
    }
    Ok(())
}

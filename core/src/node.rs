use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::now_timestamp;
use crate::ids::new_id;
use crate::value::{MetaValue, Metadata, Scores};

/// Who made the choice that selected a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChosenBy {
    #[serde(alias = "selector_llm")]
    Selector,
    Human,
}

impl ChosenBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ChosenBy::Selector => "selector",
            ChosenBy::Human => "human",
        }
    }
}

impl fmt::Display for ChosenBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A segment of text in the loom. Every candidate becomes a Node, chosen or rejected.
///
/// Only two constructors exist: [`Node::create_root`] and [`Node::from_candidate`].
/// Text and token data are fixed at creation; decision-outcome fields are written by the
/// [`Loom`](crate::graph::Loom) when a choice is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: String,
    parent_id: Option<String>,

    text: String,
    /// Ancestors' text plus this segment, cached to avoid walking to the root on reads.
    full_text: String,
    #[serde(default)]
    token_ids: Vec<u32>,

    /// `None` when the generator does not expose probabilities. Never coerced to empty.
    token_logprobs: Option<Vec<f64>>,
    step_logprob: Option<f64>,

    decision_id: Option<String>,
    #[serde(default)]
    was_chosen: bool,
    chosen_by: Option<ChosenBy>,
    selection_reason: Option<String>,
    #[serde(default)]
    scores: Scores,

    created_at: f64,

    #[serde(default)]
    meta: Metadata,
}

impl Node {
    /// Root node from seed text. Seed tokens are not tracked.
    pub fn create_root(seed_text: impl Into<String>) -> Self {
        let seed_text = seed_text.into();
        Self {
            id: new_id(),
            parent_id: None,
            full_text: seed_text.clone(),
            text: seed_text,
            token_ids: Vec::new(),
            token_logprobs: None,
            step_logprob: None,
            decision_id: None,
            was_chosen: true,
            chosen_by: None,
            selection_reason: None,
            scores: Scores::new(),
            created_at: now_timestamp(),
            meta: Metadata::new(),
        }
    }

    /// Candidate node extending `parent`. Token and logprob data are stored verbatim.
    pub fn from_candidate(
        parent: &Node,
        text: impl Into<String>,
        token_ids: Vec<u32>,
        token_logprobs: Option<Vec<f64>>,
        step_logprob: Option<f64>,
    ) -> Self {
        let text = text.into();
        Self {
            id: new_id(),
            parent_id: Some(parent.id.clone()),
            full_text: format!("{}{}", parent.full_text, text),
            text,
            token_ids,
            token_logprobs,
            step_logprob,
            decision_id: None,
            was_chosen: false,
            chosen_by: None,
            selection_reason: None,
            scores: Scores::new(),
            created_at: now_timestamp(),
            meta: Metadata::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn token_ids(&self) -> &[u32] {
        &self.token_ids
    }

    pub fn token_logprobs(&self) -> Option<&[f64]> {
        self.token_logprobs.as_deref()
    }

    pub fn step_logprob(&self) -> Option<f64> {
        self.step_logprob
    }

    pub fn decision_id(&self) -> Option<&str> {
        self.decision_id.as_deref()
    }

    pub fn was_chosen(&self) -> bool {
        self.was_chosen
    }

    pub fn chosen_by(&self) -> Option<ChosenBy> {
        self.chosen_by
    }

    pub fn selection_reason(&self) -> Option<&str> {
        self.selection_reason.as_deref()
    }

    pub fn scores(&self) -> &Scores {
        &self.scores
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Attach extension data. Returns the previous value for `key`, if any.
    pub fn insert_meta(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> Option<MetaValue> {
        self.meta.insert(key.into(), value.into())
    }

    /// Re-parent under `parent`, recomputing the cached full text.
    pub(crate) fn attach_to(&mut self, parent: &Node) {
        self.parent_id = Some(parent.id.clone());
        self.full_text = format!("{}{}", parent.full_text, self.text);
    }

    pub(crate) fn link_decision(&mut self, decision_id: &str) {
        self.decision_id = Some(decision_id.to_string());
    }

    pub(crate) fn mark_chosen(&mut self, chosen_by: ChosenBy, reason: &str) {
        self.was_chosen = true;
        self.chosen_by = Some(chosen_by);
        self.selection_reason = Some(reason.to_string());
    }

    pub(crate) fn set_scores(&mut self, scores: Scores) {
        self.scores = scores;
    }
}

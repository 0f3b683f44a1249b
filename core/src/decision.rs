use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::now_timestamp;
use crate::error::LoomError;
use crate::ids::new_id;
use crate::node::{ChosenBy, Node};
use crate::value::Scores;

/// How a decision event was resolved. The wire value of `Pending` is the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    #[serde(rename = "")]
    Pending,
    #[serde(rename = "choose")]
    Choose,
    #[serde(rename = "clarify")]
    Clarify,
    #[serde(rename = "stop")]
    Stop,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pending => "",
            Action::Choose => "choose",
            Action::Clarify => "clarify",
            Action::Stop => "stop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pending => f.write_str("pending"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Chosen-versus-best comparison of aggregate step logprobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogprobDivergence {
    /// Best `step_logprob` among candidates that have one.
    pub max_logprob: f64,
    pub chosen_logprob: f64,
    /// `chosen_logprob - max_logprob`. Zero: the generator's top pick. Negative: an override.
    pub logprob_gap: f64,
}

impl LogprobDivergence {
    /// `None` when the chosen node has no logprob or no candidate exposes one.
    fn compute(
        candidate_node_ids: &[String],
        chosen_node_id: &str,
        nodes: &BTreeMap<String, Node>,
    ) -> Result<Option<Self>, LoomError> {
        let mut max_logprob: Option<f64> = None;
        for id in candidate_node_ids {
            let node = nodes
                .get(id)
                .ok_or_else(|| LoomError::NodeNotFound { id: id.clone() })?;
            if let Some(lp) = node.step_logprob() {
                max_logprob = Some(max_logprob.map_or(lp, |best| best.max(lp)));
            }
        }
        let chosen_logprob = nodes
            .get(chosen_node_id)
            .ok_or_else(|| LoomError::NodeNotFound {
                id: chosen_node_id.to_string(),
            })?
            .step_logprob();

        Ok(match (max_logprob, chosen_logprob) {
            (Some(max_logprob), Some(chosen_logprob)) => Some(Self {
                max_logprob,
                chosen_logprob,
                logprob_gap: chosen_logprob - max_logprob,
            }),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub chosen_node_id: String,
    pub chosen_by: ChosenBy,
    pub reason: String,
    /// Selector metrics per candidate, keyed by node id.
    pub candidate_scores: BTreeMap<String, Scores>,
    pub divergence: Option<LogprobDivergence>,
}

/// A decision paused for human input. May later be re-driven to choose or stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Clarification {
    pub question: String,
    pub candidates_in_tension: Vec<String>,
    pub what_hinges_on_it: String,
    pub human_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Choose(Choice),
    Clarify(Clarification),
    Stop { reason: String },
}

impl Outcome {
    pub fn action(&self) -> Action {
        match self {
            Outcome::Pending => Action::Pending,
            Outcome::Choose(_) => Action::Choose,
            Outcome::Clarify(_) => Action::Clarify,
            Outcome::Stop { .. } => Action::Stop,
        }
    }
}

/// Record of a single branch point: the candidates offered and how the choice was resolved.
///
/// Resolution is a one-way state machine: pending -> choose | clarify | stop, with clarify
/// allowed to move on to choose or stop. Choose and stop are terminal; attempting another
/// transition fails with [`LoomError::AlreadyResolved`] and leaves the event unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "DecisionRecord", try_from = "DecisionRecord")]
pub struct DecisionEvent {
    id: String,
    parent_node_id: String,
    candidate_node_ids: Vec<String>,
    outcome: Outcome,
    timestamp: f64,
}

impl DecisionEvent {
    /// New pending event. Candidate existence is the graph's concern.
    pub fn create(
        parent_node_id: impl Into<String>,
        candidate_node_ids: Vec<String>,
    ) -> Result<Self, LoomError> {
        if candidate_node_ids.is_empty() {
            return Err(LoomError::NoCandidates);
        }
        Ok(Self {
            id: new_id(),
            parent_node_id: parent_node_id.into(),
            candidate_node_ids,
            outcome: Outcome::Pending,
            timestamp: now_timestamp(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_node_id(&self) -> &str {
        &self.parent_node_id
    }

    pub fn candidate_node_ids(&self) -> &[String] {
        &self.candidate_node_ids
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn action(&self) -> Action {
        self.outcome.action()
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.outcome, Outcome::Pending)
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn chosen_node_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Choose(choice) => Some(&choice.chosen_node_id),
            _ => None,
        }
    }

    pub fn chosen_by(&self) -> Option<ChosenBy> {
        match &self.outcome {
            Outcome::Choose(choice) => Some(choice.chosen_by),
            _ => None,
        }
    }

    /// Rationale of a choose or stop resolution; empty otherwise.
    pub fn reason(&self) -> &str {
        match &self.outcome {
            Outcome::Choose(choice) => &choice.reason,
            Outcome::Stop { reason } => reason,
            Outcome::Pending | Outcome::Clarify(_) => "",
        }
    }

    pub fn divergence(&self) -> Option<LogprobDivergence> {
        match &self.outcome {
            Outcome::Choose(choice) => choice.divergence,
            _ => None,
        }
    }

    pub fn max_logprob(&self) -> Option<f64> {
        self.divergence().map(|d| d.max_logprob)
    }

    pub fn chosen_logprob(&self) -> Option<f64> {
        self.divergence().map(|d| d.chosen_logprob)
    }

    pub fn logprob_gap(&self) -> Option<f64> {
        self.divergence().map(|d| d.logprob_gap)
    }

    pub fn clarification(&self) -> Option<&Clarification> {
        match &self.outcome {
            Outcome::Clarify(clarification) => Some(clarification),
            _ => None,
        }
    }

    pub fn is_candidate(&self, node_id: &str) -> bool {
        self.candidate_node_ids.iter().any(|id| id == node_id)
    }

    fn ensure_resolvable(&self, target: Action) -> Result<(), LoomError> {
        match (self.action(), target) {
            (Action::Pending, _) => Ok(()),
            (Action::Clarify, Action::Choose | Action::Stop) => Ok(()),
            (action, _) => Err(LoomError::AlreadyResolved {
                event_id: self.id.clone(),
                action,
            }),
        }
    }

    fn ensure_candidate(&self, node_id: &str) -> Result<(), LoomError> {
        if self.is_candidate(node_id) {
            Ok(())
        } else {
            Err(LoomError::NotACandidate {
                event_id: self.id.clone(),
                node_id: node_id.to_string(),
            })
        }
    }

    /// Resolve as a choice. With a node lookup, logprob divergence analytics are computed.
    pub fn resolve_choose(
        &mut self,
        chosen_node_id: &str,
        chosen_by: ChosenBy,
        reason: impl Into<String>,
        candidate_scores: Option<BTreeMap<String, Scores>>,
        nodes: Option<&BTreeMap<String, Node>>,
    ) -> Result<(), LoomError> {
        self.ensure_resolvable(Action::Choose)?;
        self.ensure_candidate(chosen_node_id)?;
        if let Some(scores) = &candidate_scores {
            for node_id in scores.keys() {
                self.ensure_candidate(node_id)?;
            }
        }
        let divergence = match nodes {
            Some(nodes) => LogprobDivergence::compute(&self.candidate_node_ids, chosen_node_id, nodes)?,
            None => None,
        };

        if let Outcome::Clarify(clarification) = &self.outcome {
            tracing::debug!(
                decision_id = %self.id,
                question = %clarification.question,
                "clarification superseded by choice"
            );
        }
        self.outcome = Outcome::Choose(Choice {
            chosen_node_id: chosen_node_id.to_string(),
            chosen_by,
            reason: reason.into(),
            candidate_scores: candidate_scores.unwrap_or_default(),
            divergence,
        });
        Ok(())
    }

    /// Pause the decision pending a human answer.
    pub fn resolve_clarify(
        &mut self,
        question: impl Into<String>,
        candidates_in_tension: Vec<String>,
        what_hinges_on_it: impl Into<String>,
    ) -> Result<(), LoomError> {
        self.ensure_resolvable(Action::Clarify)?;
        for node_id in &candidates_in_tension {
            self.ensure_candidate(node_id)?;
        }
        self.outcome = Outcome::Clarify(Clarification {
            question: question.into(),
            candidates_in_tension,
            what_hinges_on_it: what_hinges_on_it.into(),
            human_response: None,
        });
        Ok(())
    }

    /// End of the path. No node is chosen.
    pub fn resolve_stop(&mut self, reason: impl Into<String>) -> Result<(), LoomError> {
        self.ensure_resolvable(Action::Stop)?;
        self.outcome = Outcome::Stop {
            reason: reason.into(),
        };
        Ok(())
    }

    /// Record the human's answer to an open clarification.
    pub fn record_human_response(&mut self, response: impl Into<String>) -> Result<(), LoomError> {
        match &mut self.outcome {
            Outcome::Clarify(clarification) => {
                clarification.human_response = Some(response.into());
                Ok(())
            }
            _ => Err(LoomError::NotAwaitingClarification {
                event_id: self.id.clone(),
            }),
        }
    }
}

/// Flat wire shape of a [`DecisionEvent`]. Every optional field is written, as null when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionRecord {
    id: String,
    parent_node_id: String,
    candidate_node_ids: Vec<String>,
    #[serde(default)]
    action: Action,
    chosen_node_id: Option<String>,
    chosen_by: Option<ChosenBy>,
    #[serde(default)]
    reason: String,
    clarification_question: Option<String>,
    candidates_in_tension: Option<Vec<String>>,
    what_hinges_on_it: Option<String>,
    human_response: Option<String>,
    #[serde(default)]
    candidate_scores: BTreeMap<String, Scores>,
    max_logprob: Option<f64>,
    chosen_logprob: Option<f64>,
    logprob_gap: Option<f64>,
    timestamp: f64,
}

impl From<DecisionEvent> for DecisionRecord {
    fn from(event: DecisionEvent) -> Self {
        let mut record = DecisionRecord {
            id: event.id,
            parent_node_id: event.parent_node_id,
            candidate_node_ids: event.candidate_node_ids,
            action: event.outcome.action(),
            chosen_node_id: None,
            chosen_by: None,
            reason: String::new(),
            clarification_question: None,
            candidates_in_tension: None,
            what_hinges_on_it: None,
            human_response: None,
            candidate_scores: BTreeMap::new(),
            max_logprob: None,
            chosen_logprob: None,
            logprob_gap: None,
            timestamp: event.timestamp,
        };
        match event.outcome {
            Outcome::Pending => {}
            Outcome::Choose(choice) => {
                record.chosen_node_id = Some(choice.chosen_node_id);
                record.chosen_by = Some(choice.chosen_by);
                record.reason = choice.reason;
                record.candidate_scores = choice.candidate_scores;
                if let Some(d) = choice.divergence {
                    record.max_logprob = Some(d.max_logprob);
                    record.chosen_logprob = Some(d.chosen_logprob);
                    record.logprob_gap = Some(d.logprob_gap);
                }
            }
            Outcome::Clarify(clarification) => {
                record.clarification_question = Some(clarification.question);
                record.candidates_in_tension = Some(clarification.candidates_in_tension);
                record.what_hinges_on_it = Some(clarification.what_hinges_on_it);
                record.human_response = clarification.human_response;
            }
            Outcome::Stop { reason } => record.reason = reason,
        }
        record
    }
}

impl TryFrom<DecisionRecord> for DecisionEvent {
    type Error = String;

    fn try_from(record: DecisionRecord) -> Result<Self, Self::Error> {
        let id = record.id;
        let has_clarify_fields = record.clarification_question.is_some()
            || record.candidates_in_tension.is_some()
            || record.what_hinges_on_it.is_some()
            || record.human_response.is_some();
        let has_choose_fields = record.chosen_node_id.is_some()
            || record.chosen_by.is_some()
            || !record.candidate_scores.is_empty();
        let divergence = match (record.max_logprob, record.chosen_logprob, record.logprob_gap) {
            (None, None, None) => None,
            (Some(max_logprob), Some(chosen_logprob), Some(logprob_gap)) => {
                Some(LogprobDivergence {
                    max_logprob,
                    chosen_logprob,
                    logprob_gap,
                })
            }
            _ => return Err(format!("decision '{id}' has partial logprob analytics")),
        };
        if record.action != Action::Clarify && has_clarify_fields {
            return Err(format!(
                "decision '{id}' carries clarification fields but action is '{}'",
                record.action
            ));
        }
        if record.action != Action::Choose && (has_choose_fields || divergence.is_some()) {
            return Err(format!(
                "decision '{id}' carries choice fields but action is '{}'",
                record.action
            ));
        }

        if matches!(record.action, Action::Pending | Action::Clarify) && !record.reason.is_empty() {
            return Err(format!(
                "decision '{id}' carries a reason but action is '{}'",
                record.action
            ));
        }

        let outcome = match record.action {
            Action::Pending => Outcome::Pending,
            Action::Stop => Outcome::Stop {
                reason: record.reason,
            },
            Action::Choose => {
                let chosen_node_id = record
                    .chosen_node_id
                    .ok_or_else(|| format!("decision '{id}' is 'choose' without chosen_node_id"))?;
                let chosen_by = record
                    .chosen_by
                    .ok_or_else(|| format!("decision '{id}' is 'choose' without chosen_by"))?;
                Outcome::Choose(Choice {
                    chosen_node_id,
                    chosen_by,
                    reason: record.reason,
                    candidate_scores: record.candidate_scores,
                    divergence,
                })
            }
            Action::Clarify => Outcome::Clarify(Clarification {
                question: record.clarification_question.unwrap_or_default(),
                candidates_in_tension: record.candidates_in_tension.unwrap_or_default(),
                what_hinges_on_it: record.what_hinges_on_it.unwrap_or_default(),
                human_response: record.human_response,
            }),
        };

        Ok(DecisionEvent {
            id,
            parent_node_id: record.parent_node_id,
            candidate_node_ids: record.candidate_node_ids,
            outcome,
            timestamp: record.timestamp,
        })
    }
}

use std::path::PathBuf;

use clap::Args;
use loom_core::clock::to_datetime;
use loom_core::decision::DecisionEvent;
use loom_core::graph::Loom;
use loom_core::snapshot::load_loom;
use serde_json::json;

use crate::util::{print_json, report_error};

#[derive(Args)]
pub struct InspectArgs {
    /// Snapshot file written by `loom run`
    snapshot: PathBuf,
    /// Number of recent decisions to include
    #[arg(long, default_value_t = 5)]
    last: usize,
    /// Report choices whose logprob gap is below this value
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    threshold: f64,
}

pub fn run(args: InspectArgs) -> i32 {
    match load_loom(&args.snapshot) {
        Ok(loom) => print_json(&summary(&loom, args.last, args.threshold)),
        Err(e) => report_error(&e),
    }
}

fn decision_json(event: &DecisionEvent) -> serde_json::Value {
    let mut value = json!({
        "decision_id": event.id(),
        "parent_node_id": event.parent_node_id(),
        "action": event.action(),
        "candidates": event.candidate_node_ids().len(),
        "chosen_node_id": event.chosen_node_id(),
        "chosen_by": event.chosen_by(),
        "reason": event.reason(),
        "logprob_gap": event.logprob_gap(),
    });
    if let Some(clarification) = event.clarification() {
        value["clarification"] = json!({
            "question": clarification.question,
            "candidates_in_tension": clarification.candidates_in_tension,
            "what_hinges_on_it": clarification.what_hinges_on_it,
            "human_response": clarification.human_response,
        });
    }
    value
}

/// JSON overview of a session: where the path stands and which decisions stand out.
pub fn summary(loom: &Loom, last: usize, threshold: f64) -> serde_json::Value {
    json!({
        "session_id": loom.session_id(),
        "brief": loom.brief(),
        "created_at": to_datetime(loom.created_at()).map(|at| at.to_rfc3339()),
        "current_text": loom.current_text(),
        "path_length": loom.current_path().len(),
        "node_count": loom.nodes().len(),
        "decision_count": loom.decision_events().len(),
        "last_decisions": loom.last_n_decisions(last).into_iter().map(decision_json).collect::<Vec<_>>(),
        "divergence_threshold": threshold,
        "divergences": loom.find_divergences(threshold).into_iter().map(decision_json).collect::<Vec<_>>(),
        "clarifications": loom.find_clarifications().into_iter().map(decision_json).collect::<Vec<_>>(),
    })
}

use crate::brief::Brief;
use crate::config::SessionConfig;
use crate::decision::DecisionEvent;
use crate::error::LoomError;
use crate::generator::{GenerationRequest, Generator};
use crate::graph::Loom;
use crate::node::{ChosenBy, Node};

/// Minimal orchestrator for human-in-the-loop generation.
///
/// Calls the generator with the brief and the current text, materializes the candidates
/// as nodes on the loom, and commits human choices or stops.
pub struct Orchestrator<G> {
    loom: Loom,
    generator: G,
    brief: Brief,
    config: SessionConfig,
}

impl<G: Generator> Orchestrator<G> {
    pub fn new(loom: Loom, generator: G, brief: Brief, config: SessionConfig) -> Self {
        Self {
            loom,
            generator,
            brief,
            config,
        }
    }

    pub fn loom(&self) -> &Loom {
        &self.loom
    }

    pub fn brief(&self) -> &Brief {
        &self.brief
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn into_loom(self) -> Loom {
        self.loom
    }

    /// Generate candidates from the current tip and return the new, unresolved decision.
    /// Generator failures propagate unchanged.
    pub async fn generate_step(&mut self) -> Result<&DecisionEvent, LoomError> {
        let tip = self.loom.tip().ok_or(LoomError::EmptyPath)?;
        let n = self.config.base_engine.branching_factor;
        let request = GenerationRequest {
            full_text: tip.full_text(),
            fewshot_examples: &self.brief.fewshot_examples,
            section_intent: &self.brief.section_intent,
            rough_draft: self.brief.rough_draft.as_deref(),
            n,
            max_tokens: self.config.base_engine.segment_tokens,
        };

        let raw = self.generator.generate_candidates(&request).await?;
        if raw.len() != n {
            return Err(LoomError::CandidateCountMismatch {
                expected: n,
                actual: raw.len(),
            });
        }

        let nodes: Vec<Node> = raw
            .into_iter()
            .map(|candidate| {
                Node::from_candidate(
                    tip,
                    candidate.text,
                    candidate.token_ids,
                    candidate.token_logprobs,
                    candidate.step_logprob,
                )
            })
            .collect();
        let tip_id = tip.id().to_string();

        tracing::debug!(
            session_id = self.loom.session_id(),
            tip = %tip_id,
            candidates = nodes.len(),
            "candidates generated"
        );
        self.loom.add_candidates(&tip_id, nodes)
    }

    /// Commit a human choice and extend the current path.
    pub fn commit_choice(
        &mut self,
        event_id: &str,
        node_id: &str,
        reason: &str,
    ) -> Result<(), LoomError> {
        self.loom
            .commit_choice(event_id, node_id, ChosenBy::Human, reason)
    }

    /// Commit a stop without extending the path.
    pub fn commit_stop(&mut self, event_id: &str, reason: &str) -> Result<(), LoomError> {
        self.loom.commit_stop(event_id, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::Orchestrator;
    use crate::brief::Brief;
    use crate::config::{BaseEngineConfig, SessionConfig};
    use crate::decision::Action;
    use crate::error::LoomError;
    use crate::generator::{
        FakeGenerator, GeneratedCandidate, GenerationRequest, Generator, GeneratorError,
    };
    use crate::graph::Loom;

    fn session_config(branching_factor: usize) -> SessionConfig {
        SessionConfig {
            base_engine: BaseEngineConfig {
                branching_factor,
                segment_tokens: 5,
                ..BaseEngineConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn brief() -> Brief {
        Brief {
            section_intent: "Intent".into(),
            ..Brief::default()
        }
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        async fn generate_candidates(
            &self,
            _request: &GenerationRequest<'_>,
        ) -> Result<Vec<GeneratedCandidate>, GeneratorError> {
            Err(GeneratorError::Api {
                status: 529,
                body: "overloaded".into(),
            })
        }
    }

    /// Ignores `n` and always returns one candidate.
    struct ShortGenerator;

    impl Generator for ShortGenerator {
        async fn generate_candidates(
            &self,
            _request: &GenerationRequest<'_>,
        ) -> Result<Vec<GeneratedCandidate>, GeneratorError> {
            Ok(vec![GeneratedCandidate::text_only("lonely")])
        }
    }

    #[tokio::test]
    async fn generate_step_creates_decision_and_nodes() {
        let loom = Loom::create("Seed ", "brief", None);
        let generator = FakeGenerator::new("opt_", None);
        let mut orch = Orchestrator::new(loom, generator, brief(), session_config(3));

        let event = orch.generate_step().await.unwrap().clone();
        let loom = orch.loom();
        assert!(loom.decision_events().contains_key(event.id()));
        assert_eq!(event.candidate_node_ids().len(), 3);
        assert_eq!(event.action(), Action::Pending);
        for node_id in event.candidate_node_ids() {
            let node = loom.node(node_id).unwrap();
            assert_eq!(node.parent_id(), loom.current_path().last().map(String::as_str));
            assert!(node.text().starts_with("opt_"));
            assert!(node.full_text().starts_with("Seed opt_"));
        }
    }

    #[tokio::test]
    async fn commit_choice_extends_path() {
        let loom = Loom::create("Seed ", "", None);
        let mut orch = Orchestrator::new(loom, FakeGenerator::new("c", None), brief(), session_config(2));

        let event = orch.generate_step().await.unwrap().clone();
        let chosen = &event.candidate_node_ids()[0];
        orch.commit_choice(event.id(), chosen, "pick").unwrap();

        let loom = orch.loom();
        assert_eq!(loom.current_path().last(), Some(chosen));
        assert!(loom.node(chosen).unwrap().was_chosen());
        assert_eq!(loom.current_text(), "Seed c0");
    }

    #[tokio::test]
    async fn commit_stop_does_not_extend_path() {
        let loom = Loom::create("Seed ", "", None);
        let root_id = loom.root_id().unwrap().to_string();
        let mut orch = Orchestrator::new(loom, FakeGenerator::new("c", None), brief(), session_config(1));

        let event_id = orch.generate_step().await.unwrap().id().to_string();
        orch.commit_stop(&event_id, "done").unwrap();

        let loom = orch.into_loom();
        assert_eq!(loom.current_path(), &[root_id]);
        assert_eq!(loom.event(&event_id).unwrap().action(), Action::Stop);
    }

    #[tokio::test]
    async fn logprobs_flow_into_divergence_analytics() {
        let loom = Loom::create("Seed ", "", None);
        let mut orch = Orchestrator::new(
            loom,
            FakeGenerator::new("c", Some(-0.7)),
            brief(),
            session_config(2),
        );
        let event = orch.generate_step().await.unwrap().clone();
        orch.commit_choice(event.id(), &event.candidate_node_ids()[1], "")
            .unwrap();

        let event = orch.loom().event(event.id()).unwrap();
        assert_eq!(event.logprob_gap(), Some(0.0));
        assert!(orch.loom().find_divergences(0.0).is_empty());
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let loom = Loom::create("Seed ", "", None);
        let mut orch = Orchestrator::new(loom, FailingGenerator, brief(), session_config(2));

        let err = orch.generate_step().await.unwrap_err();
        assert!(matches!(
            err,
            LoomError::Generator(GeneratorError::Api { status: 529, .. })
        ));
        assert!(orch.loom().decision_events().is_empty());
    }

    #[tokio::test]
    async fn wrong_candidate_count_is_rejected() {
        let loom = Loom::create("Seed ", "", None);
        let mut orch = Orchestrator::new(loom, ShortGenerator, brief(), session_config(3));

        let err = orch.generate_step().await.unwrap_err();
        assert!(matches!(
            err,
            LoomError::CandidateCountMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert_eq!(orch.loom().nodes().len(), 1);
    }

    #[tokio::test]
    async fn empty_loom_has_no_tip_to_extend() {
        let mut orch = Orchestrator::new(
            Loom::default(),
            FakeGenerator::default(),
            brief(),
            session_config(2),
        );
        assert!(matches!(
            orch.generate_step().await,
            Err(LoomError::EmptyPath)
        ));
    }
}

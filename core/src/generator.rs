use std::future::Future;

/// What a generator needs to propose the next segments.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Crafted text so far (the tip's full text)
    pub full_text: &'a str,
    pub fewshot_examples: &'a str,
    pub section_intent: &'a str,
    pub rough_draft: Option<&'a str>,
    /// Number of candidates to return
    pub n: usize,
    /// Max tokens per candidate
    pub max_tokens: u32,
}

/// Raw generator output. Ids are assigned when candidates become nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCandidate {
    pub text: String,
    pub token_ids: Vec<u32>,
    pub token_logprobs: Option<Vec<f64>>,
    pub step_logprob: Option<f64>,
}

impl GeneratedCandidate {
    /// Text-only candidate, as produced by generators without probability access.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_ids: Vec::new(),
            token_logprobs: None,
            step_logprob: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Http(String),

    #[error("generator API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected generator response: {0}")]
    UnexpectedResponse(String),
}

/// Source of candidate continuations. Injected into the orchestration step, never global.
pub trait Generator {
    fn generate_candidates(
        &self,
        request: &GenerationRequest<'_>,
    ) -> impl Future<Output = Result<Vec<GeneratedCandidate>, GeneratorError>> + Send;
}

/// Deterministic generator for tests and offline runs.
/// Returns `prefix0`, `prefix1`, ... with no tokens and an optional fixed step logprob.
#[derive(Debug, Clone)]
pub struct FakeGenerator {
    pub prefix: String,
    pub step_logprob: Option<f64>,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self::new("candidate_", None)
    }
}

impl FakeGenerator {
    pub fn new(prefix: impl Into<String>, step_logprob: Option<f64>) -> Self {
        Self {
            prefix: prefix.into(),
            step_logprob,
        }
    }
}

impl Generator for FakeGenerator {
    async fn generate_candidates(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Vec<GeneratedCandidate>, GeneratorError> {
        Ok((0..request.n)
            .map(|i| GeneratedCandidate {
                step_logprob: self.step_logprob,
                ..GeneratedCandidate::text_only(format!("{}{i}", self.prefix))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{FakeGenerator, GenerationRequest, Generator};

    fn request(n: usize) -> GenerationRequest<'static> {
        GenerationRequest {
            full_text: "Seed ",
            fewshot_examples: "",
            section_intent: "Intent",
            rough_draft: None,
            n,
            max_tokens: 6,
        }
    }

    #[tokio::test]
    async fn fake_generator_returns_deterministic_candidates() {
        let generator = FakeGenerator::new("opt_", None);
        let candidates = generator.generate_candidates(&request(3)).await.unwrap();

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["opt_0", "opt_1", "opt_2"]);
        for candidate in &candidates {
            assert!(candidate.token_ids.is_empty());
            assert_eq!(candidate.token_logprobs, None);
            assert_eq!(candidate.step_logprob, None);
        }
    }

    #[tokio::test]
    async fn fake_generator_applies_fixed_logprob() {
        let generator = FakeGenerator::new("c", Some(-0.25));
        let candidates = generator.generate_candidates(&request(2)).await.unwrap();
        assert!(candidates.iter().all(|c| c.step_logprob == Some(-0.25)));
    }
}

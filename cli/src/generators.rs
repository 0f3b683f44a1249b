use loom_core::config::{BaseEngineConfig, EngineType};
use loom_core::generator::{
    FakeGenerator, GeneratedCandidate, GenerationRequest, Generator, GeneratorError,
};
use loom_core::prompt::build_base_prompt;
use serde_json::json;

use crate::util::client;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLI_SIM_SYSTEM_PROMPT: &str =
    "You are in CLI simulation mode. Respond only with the output of the requested command.";

/// Candidates from the Messages API, with the model acting as a terminal that prints the draft.
///
/// One request per candidate. The API exposes no logprobs, so candidates carry text only.
pub struct ClaudeCliSimGenerator {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    top_p: f64,
}

impl ClaudeCliSimGenerator {
    pub fn new(api_url: &str, api_key: &str, cfg: &BaseEngineConfig) -> Self {
        Self {
            http: client(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: cfg.model_name.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<String, GeneratorError> {
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| GeneratorError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GeneratorError::UnexpectedResponse(e.to_string()))?;
        parse_response_text(&value)
    }
}

impl Generator for ClaudeCliSimGenerator {
    async fn generate_candidates(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Vec<GeneratedCandidate>, GeneratorError> {
        let prompt = build_base_prompt(request);
        let body = build_request_body(
            &self.model,
            &prompt,
            request.max_tokens,
            self.temperature,
            self.top_p,
        );

        let mut candidates = Vec::with_capacity(request.n);
        for _ in 0..request.n {
            let text = self.complete(&body).await?;
            candidates.push(GeneratedCandidate::text_only(text));
        }
        tracing::debug!(model = %self.model, n = candidates.len(), "cli-sim candidates received");
        Ok(candidates)
    }
}

pub fn build_request_body(
    model: &str,
    prompt: &str,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
) -> serde_json::Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": temperature,
        "top_p": top_p,
        "system": CLI_SIM_SYSTEM_PROMPT,
        "messages": [
            {
                "role": "user",
                "content": format!("<cmd>cat draft.txt</cmd>\n\n{prompt}")
            }
        ]
    })
}

/// Text of the first content block of a Messages API response.
pub fn parse_response_text(body: &serde_json::Value) -> Result<String, GeneratorError> {
    body.get("content")
        .and_then(|content| content.get(0))
        .and_then(|block| block.get("text"))
        .and_then(|text| text.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            GeneratorError::UnexpectedResponse(format!("no text content in response: {body}"))
        })
}

/// The generator backing a session, selected by engine type.
pub enum SessionGenerator {
    ClaudeCliSim(ClaudeCliSimGenerator),
    Fake(FakeGenerator),
}

impl Generator for SessionGenerator {
    async fn generate_candidates(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Vec<GeneratedCandidate>, GeneratorError> {
        match self {
            SessionGenerator::ClaudeCliSim(generator) => {
                generator.generate_candidates(request).await
            }
            SessionGenerator::Fake(generator) => generator.generate_candidates(request).await,
        }
    }
}

pub fn make_generator(
    cfg: &BaseEngineConfig,
    api_url: &str,
    api_key: Option<&str>,
) -> Result<SessionGenerator, String> {
    match cfg.engine_type {
        EngineType::ClaudeCliSim => {
            let key = api_key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| "ANTHROPIC_API_KEY is required for the claude_cli_sim engine".to_string())?;
            Ok(SessionGenerator::ClaudeCliSim(ClaudeCliSimGenerator::new(
                api_url, key, cfg,
            )))
        }
        EngineType::Fake => Ok(SessionGenerator::Fake(FakeGenerator::default())),
    }
}

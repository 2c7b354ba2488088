use std::time::Instant;

use {
    agentdesk_common::text::truncate_chars,
    agentdesk_config::LlmConfig,
    async_trait::async_trait,
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace, warn},
};

use crate::{
    profile::AgentProfile,
    runner::{AgentError, AgentRunner},
};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
/// HTTP status Anthropic returns when the service is overloaded.
const OVERLOADED: u16 = 529;
const TRACE_LIMIT: usize = 4000;

/// Messages API client answering one prompt per agent query.
pub struct AnthropicRunner {
    api_key: Secret<String>,
    default_model: String,
    base_url: String,
    client: reqwest::Client,
    trace_io: bool,
}

impl AnthropicRunner {
    pub fn new(api_key: Secret<String>, default_model: String, base_url: String) -> Self {
        Self {
            api_key,
            default_model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            trace_io: false,
        }
    }

    pub fn from_config(cfg: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = cfg.api_key.clone().ok_or(AgentError::MissingApiKey)?;
        Ok(Self::new(api_key, cfg.model.clone(), cfg.base_url.clone()).with_trace_io(cfg.trace_io))
    }

    /// Log prompts and answers at debug level.
    pub fn with_trace_io(mut self, trace_io: bool) -> Self {
        self.trace_io = trace_io;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

fn classify(status: StatusCode, body: String) -> AgentError {
    if status.as_u16() == OVERLOADED || body.contains("overloaded_error") {
        AgentError::Overloaded(body)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        AgentError::RateLimited(body)
    } else {
        AgentError::Provider {
            status: status.as_u16(),
            body,
        }
    }
}

fn extract_text(resp: &serde_json::Value) -> Option<String> {
    resp["content"]
        .as_array()?
        .iter()
        .filter(|b| b["type"].as_str() == Some("text"))
        .filter_map(|b| b["text"].as_str())
        .map(str::to_string)
        .reduce(|a, b| a + &b)
        .filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl AgentRunner for AnthropicRunner {
    async fn ask(&self, profile: &AgentProfile, prompt: &str) -> Result<String, AgentError> {
        let model = profile.model.as_deref().unwrap_or(&self.default_model);
        let body = serde_json::json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "system": profile.system_prompt,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(agent = %profile.name, model, prompt_chars = prompt.chars().count(), "agent query");
        if self.trace_io {
            debug!(
                agent = %profile.name,
                system = %truncate_chars(&profile.system_prompt, TRACE_LIMIT),
                prompt = %truncate_chars(prompt, TRACE_LIMIT),
                "llm input"
            );
        }

        let started = Instant::now();
        let http_resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(agent = %profile.name, status = %status, body = %body_text, "anthropic API error");
            return Err(classify(status, body_text));
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        trace!(response = %resp, "anthropic raw response");

        let text = extract_text(&resp).ok_or(AgentError::EmptyResponse)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            agent = %profile.name,
            elapsed_ms,
            input_tokens = resp["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens = resp["usage"]["output_tokens"].as_u64().unwrap_or(0),
            "agent answered"
        );
        if self.trace_io {
            debug!(agent = %profile.name, response = %truncate_chars(&text, TRACE_LIMIT), "llm output");
        }
        Ok(text)
    }
}

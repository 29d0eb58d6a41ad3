//! Chat completion client for documentation generation and Q&A.
//!
//! One-shot `POST /v1/chat/completions` against an OpenAI-compatible API.
//! No retry: completion calls are user-facing and callers surface the
//! failure instead of stalling on backoff.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::PipelineError;

pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl CompletionClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    /// Free-form completion: returns the assistant message content.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, PipelineError> {
        self.request(system, user, false).await
    }

    /// JSON-mode completion: asks the model for a single JSON object and
    /// parses it. Used for structured documentation sections.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<serde_json::Value, PipelineError> {
        let content = self.request(system, user, true).await?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::CompletionBackend(format!("completion returned invalid JSON: {e}"))
        })
    }

    async fn request(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String, PipelineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            "temperature": 0.7,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::CompletionBackend(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::CompletionBackend(format!(
                "completions API returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::CompletionBackend(format!("invalid response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::CompletionBackend("no completion choices".into()))
    }
}

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

/// Configuration for talking to an OpenAI-compatible chat-completion API.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Minimal chat-completion client.
///
/// One request per call, no streaming, no retries. The classifier asks for a
/// deterministic reply (temperature 0) because its output is parsed, not read
/// by a human.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid AI base URL: {}", config.base_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .context("AI API key contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.model,
        })
    }

    /// Single-turn chat call: system prompt + user prompt, first choice back.
    pub async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .context("Failed to build chat completions URL")?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: Some(0.0),
        };

        let response: ChatResponse = self
            .http
            .post(endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {endpoint} returned non-success status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| anyhow!("Chat response had no message content"))?;

        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

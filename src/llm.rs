//! The language-model capability: `Complete` and `CountTokens`, abstracted
//! behind a trait so the Planner never depends on a concrete wire protocol.
//! The HTTP-backed implementation here is the ambient-stack default, not a
//! core concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tokens::TokenAccountant;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The capability the Planner depends on. A cycle treats failure here as
/// fatal to itself, never to the pool.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[Message], system: Option<&str>) -> anyhow::Result<String>;

    /// Must be total-functional: any internal error yields 0, never a
    /// propagated error.
    fn count_tokens(&self, text: &str) -> u64;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    system: Option<&'a str>,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: Vec<ChatContentBlock>,
}

#[derive(Deserialize)]
struct ChatContentBlock {
    #[serde(default)]
    text: String,
}

/// A minimal JSON chat-completion client. Tokenization is local (never a
/// network round-trip) so `count_tokens` can stay total-functional.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    accountant: TokenAccountant,
}

impl HttpLanguageModel {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        accountant: TokenAccountant,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            accountant,
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, messages: &[Message], system: Option<&str>) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            system,
            messages,
            temperature: 0.7,
            max_tokens: 2_000,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        Ok(response
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    fn count_tokens(&self, text: &str) -> u64 {
        self.accountant.count_str(text)
    }
}

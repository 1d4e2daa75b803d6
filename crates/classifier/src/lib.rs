//! Deductibility classification: prompt construction, the language-model
//! seam, and the free-text verdict parser.

pub mod parser;
pub mod prompt;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use models::{DeductionVerdict, User};

pub use parser::{parse_verdict, VerdictParser};
pub use prompt::ExpenseFacts;

/// Seam over the chat-completion call so classification can be exercised
/// without a live model behind it.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[async_trait]
impl CompletionBackend for ai_client::ChatClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.chat(system_prompt, user_prompt).await
    }
}

/// Classifies one expense at a time: one completion call, one parsed verdict.
///
/// Errors from the backend are returned to the caller; it is the caller's
/// decision whether to surface them or downgrade to
/// [`DeductionVerdict::manual_review`] (the ingestion loop does the latter).
pub struct DeductionClassifier {
    backend: Arc<dyn CompletionBackend>,
    parser: VerdictParser,
}

impl DeductionClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            parser: VerdictParser::new(),
        }
    }

    pub async fn classify(
        &self,
        facts: &ExpenseFacts,
        profile: Option<&User>,
    ) -> Result<DeductionVerdict> {
        let user_prompt = prompt::build_user_prompt(facts, profile);
        let reply = self
            .backend
            .complete(prompt::SYSTEM_PROMPT, &user_prompt)
            .await?;
        Ok(self.parser.parse(&reply))
    }
}

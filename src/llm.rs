use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const NO_CONTEXT_ANSWER: &str = "No relevant passages were found for this question.";

const SYSTEM_MESSAGE: &str =
    "You are an analyst who answers questions strictly from the provided document excerpts.";

pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 600,
            temperature: 0.5,
        }
    }
}

impl From<&Config> for LlmConfig {
    fn from(config: &Config) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.analysis_model.clone(),
            max_tokens: config.max_tokens_output,
            ..LlmConfig::default()
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client that answers a question from budgeted context.
pub struct Llm {
    client: reqwest::Client,
    config: LlmConfig,
}

impl Llm {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("OPENAI_API_KEY not set"));
        }

        Ok(Llm {
            client: reqwest::Client::new(),
            config,
        })
    }

    pub async fn generate_response(&self, query: &str, context: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(anyhow!("Query cannot be empty"));
        }
        if context.trim().is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let prompt = construct_prompt(query, context);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_MESSAGE },
                ChatMessage { role: "user", content: &prompt },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat endpoint returned an error")?
            .json()
            .await
            .context("malformed chat completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion contained no answer"))
    }
}

fn construct_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer the following question: \"{query}\"\n\n\
         Use ONLY the document excerpts below. If they do not answer the question, say so.\n\n\
         Excerpts:\n{context}\n\n\
         Answer directly, cite page numbers for specific points, and keep a neutral tone."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm() -> Llm {
        Llm::new(LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_api_key() {
        assert!(Llm::new(LlmConfig::default()).is_err());
    }

    #[test]
    fn prompt_embeds_query_and_context() {
        let prompt = construct_prompt("What about housing?", "Document 1 (Page 4):\nHomes.");
        assert!(prompt.contains("\"What about housing?\""));
        assert!(prompt.contains("Document 1 (Page 4):\nHomes."));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        assert!(llm().generate_response("  ", "context").await.is_err());
    }

    #[tokio::test]
    async fn empty_context_short_circuits() -> Result<()> {
        let answer = llm().generate_response("housing?", "").await?;
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        Ok(())
    }

    #[test]
    fn config_follows_app_config() {
        let app = Config {
            api_base: "http://localhost:8080/v1/".to_string(),
            max_tokens_output: 300,
            ..Config::default()
        };
        let config = LlmConfig::from(&app);
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.model, "gpt-4o-mini");
    }
}

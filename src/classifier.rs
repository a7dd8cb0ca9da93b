//! The external text-generation capability behind categorization and
//! insight summaries.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use rocket::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ClassifierConfig;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("no API key configured for the classifier")]
    MissingApiKey,
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed classifier output: {0}")]
    Malformed(String),
}

/// JSON schema the response must follow.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub schema: Option<ResponseSchema>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: None,
            schema: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn schema(mut self, name: &'static str, schema: Value) -> Self {
        self.schema = Some(ResponseSchema { name, schema });
        self
    }
}

/// Given a prompt, return the model's text. One attempt per call.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ClassifierError>;
}

/// Classifier handle managed by Rocket.
pub type SharedClassifier = Arc<dyn Classifier>;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
        })
    }

    fn request_body(&self, prompt: &Prompt) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user",
                    content: prompt.user.clone(),
                },
            ],
            max_completion_tokens: prompt.max_tokens,
            response_format: prompt.schema.as_ref().map(|schema| {
                serde_json::json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                })
            }),
        }
    }
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageOut,
}

#[derive(Deserialize)]
struct MessageOut {
    content: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ClassifierError> {
        let key = self.api_key.as_deref().ok_or(ClassifierError::MissingApiKey)?;

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let out: ChatResponse = resp.json().await?;
        out.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ClassifierError::Malformed("response has no message content".into()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(api_key: Option<&str>) -> OpenAiClassifier {
        let config = ClassifierConfig {
            api_key: api_key.map(str::to_string),
            base_url: "http://127.0.0.1:9/".to_string(),
            ..ClassifierConfig::default()
        };
        OpenAiClassifier {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    #[test]
    fn schema_prompts_request_strict_json() {
        let prompt = Prompt::new("sys", "user")
            .schema("financial_insights", serde_json::json!({"type": "object"}));
        let body = serde_json::to_value(classifier(Some("k")).request_body(&prompt)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn token_cap_is_forwarded() {
        let prompt = Prompt::new("sys", "user").max_tokens(20);
        let body = serde_json::to_value(classifier(Some("k")).request_body(&prompt)).unwrap();
        assert_eq!(body["max_completion_tokens"], 20);
        assert!(body.get("response_format").is_none());
    }

    #[rocket::async_test]
    async fn missing_key_fails_without_a_request() {
        let err = classifier(None)
            .complete(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::MissingApiKey));
    }
}

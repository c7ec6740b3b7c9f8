//! Chat-completion client for the assistant pipelines.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint at temperature
//! zero. Structured replies come back as JSON, sometimes wrapped in markdown
//! code fences, so extraction tolerates both.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
        }
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Assistant(format!(
                "Chat API error {status}: {body}"
            )));
        }

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Assistant("Empty chat response".to_string()))
    }
}

/// Strip markdown code fences around a JSON reply.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_json_handles_fences() {
        assert_eq!(extract_json("[1, 2]"), "[1, 2]");
        assert_eq!(extract_json("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn completes_with_bearer_auth_and_zero_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "temperature": 0.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Almaty has 12 universities." } }]
            })))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "test-key".to_string(), "gpt-4o".to_string());
        let answer = client.complete("You are helpful.", "How many?").await.unwrap();

        assert_eq!(answer, "Almaty has 12 universities.");
    }

    #[tokio::test]
    async fn empty_choice_list_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri(), "k".to_string(), "m".to_string());
        assert!(matches!(
            client.complete("s", "u").await,
            Err(AppError::Assistant(_))
        ));
    }
}

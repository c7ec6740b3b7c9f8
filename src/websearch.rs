//! Web-search fallback for assistant questions the catalog cannot answer.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

pub struct SearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SearchClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>, AppError> {
        let url = format!("{}/search", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Assistant(format!(
                "Search API error {status}: {body}"
            )));
        }

        let result: SearchResponse = response.json().await?;
        Ok(result.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_hits_for_a_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tv-key",
                "query": "KBTU tuition 2025",
                "max_results": 3,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "title": "KBTU fees", "url": "https://kbtu.kz/fees", "content": "..." }
                ]
            })))
            .mount(&server)
            .await;

        let client = SearchClient::new(server.uri(), "tv-key".to_string());
        let hits = client.search("KBTU tuition 2025", 3).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://kbtu.kz/fees");
    }

    #[tokio::test]
    async fn missing_results_field_reads_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = SearchClient::new(server.uri(), "k".to_string());
        assert!(client.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SearchClient::new(server.uri(), "k".to_string());
        assert!(matches!(
            client.search("anything", 5).await,
            Err(AppError::Assistant(_))
        ));
    }
}

//! HTTP client for the search provider (Tavily-style JSON API).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use seoforge_shared::config::SearchConfig;
use seoforge_shared::{Result, SeoforgeError};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("seoforge/", env!("CARGO_PKG_VERSION"));

/// One organic result on the SERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganicResult {
    pub title: String,
    pub url: String,
    /// Snippet text (the provider calls this `content`).
    #[serde(rename = "content")]
    pub snippet: String,
    /// Provider relevance score in `[0, 1]`.
    #[serde(default)]
    pub score: f64,
}

/// Everything we harvest from one SERP fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerpPayload {
    #[serde(default)]
    pub results: Vec<OrganicResult>,
    /// People-Also-Ask questions, when the provider exposes them.
    #[serde(default)]
    pub paa_questions: Vec<String>,
    /// Whether the SERP carried an AI overview / answer box.
    #[serde(default)]
    pub has_ai_overview: bool,
}

/// JSON body of a search request.
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

/// Raw provider response shape.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<OrganicResult>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    related_questions: Vec<String>,
}

/// Search API client.
#[derive(Debug, Clone)]
pub struct SerpClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

impl SerpClient {
    /// Build a client from the search config, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            SeoforgeError::config(format!(
                "search API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Self::new(&config.endpoint, api_key, config.max_results, config.timeout_secs)
    }

    /// Build a client against an explicit endpoint (used by tests).
    pub fn new(
        endpoint: &str,
        api_key: String,
        max_results: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SeoforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            max_results,
        })
    }

    /// Maximum organic results requested per query.
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Fetch the SERP for one query.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str) -> Result<SerpPayload> {
        let request = SearchRequest {
            query,
            max_results: self.max_results,
            include_answer: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SeoforgeError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoforgeError::Network(format!(
                "search API returned HTTP {status}"
            )));
        }

        let raw: SearchResponse = response
            .json()
            .await
            .map_err(|e| SeoforgeError::Network(format!("invalid search response: {e}")))?;

        debug!(
            results = raw.results.len(),
            paa = raw.related_questions.len(),
            "SERP fetched"
        );

        Ok(SerpPayload {
            results: raw.results,
            paa_questions: raw.related_questions,
            has_ai_overview: raw.answer.is_some_and(|a| !a.is_empty()),
        })
    }
}

/// Stable hash of a query text, used as the signal cache key.
pub fn query_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn serp_body() -> serde_json::Value {
        serde_json::json!({
            "answer": "A micropipette measures small liquid volumes.",
            "results": [
                {"title": "Pipette Guide", "url": "https://a.example/guide",
                 "content": "How to use a micropipette", "score": 0.91},
                {"title": "Calibration", "url": "https://b.example/cal",
                 "content": "Calibration steps", "score": 0.84}
            ],
            "related_questions": ["How often should pipettes be calibrated?"]
        })
    }

    #[tokio::test]
    async fn search_parses_results_and_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(serde_json::json!({"query": "micropipette"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serp_body()))
            .mount(&server)
            .await;

        let client =
            SerpClient::new(&format!("{}/search", server.uri()), "key".into(), 10, 5).unwrap();
        let payload = client.search("micropipette").await.unwrap();

        assert_eq!(payload.results.len(), 2);
        assert_eq!(payload.results[0].snippet, "How to use a micropipette");
        assert_eq!(payload.paa_questions.len(), 1);
        assert!(payload.has_ai_overview);
    }

    #[tokio::test]
    async fn search_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let client = SerpClient::new(&server.uri(), "secret-key".into(), 5, 5).unwrap();
        let payload = client.search("anything").await.unwrap();
        assert!(payload.results.is_empty());
        assert!(!payload.has_ai_overview);
    }

    #[tokio::test]
    async fn search_propagates_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = SerpClient::new(&server.uri(), "key".into(), 5, 5).unwrap();
        let err = client.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn query_hash_is_stable() {
        assert_eq!(query_hash("a"), query_hash("a"));
        assert_ne!(query_hash("a"), query_hash("b"));
    }
}

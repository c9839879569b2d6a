//! Query resolver adapter
//!
//! Forwards the utterance and the caller's user id to the contextual query
//! engine and returns the answer with its classification metadata. Unknown
//! intent strings degrade to `QueryIntent::Unknown` rather than failing the
//! turn.

use async_trait::async_trait;
use serde::Deserialize;

use voice_gateway_core::{
    AdapterError, QueryIntent, QueryMetadata, QueryResolver, ResolvedAnswer,
};

/// Resolver client configuration
#[derive(Debug, Clone)]
pub struct ResolverClientConfig {
    /// Base URL of the query resolver
    pub url: String,
    /// Transport-level timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ResolverClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8093".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    answer: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: f64,
}

/// HTTP query resolver adapter
pub struct HttpQueryResolver {
    config: ResolverClientConfig,
    client: reqwest::Client,
}

impl HttpQueryResolver {
    pub fn new(config: ResolverClientConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn new_with_url(url: impl Into<String>) -> Result<Self, AdapterError> {
        Self::new(ResolverClientConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    fn parse_intent(raw: Option<&str>) -> QueryIntent {
        match raw {
            Some("WEATHER_QUERY") => QueryIntent::WeatherQuery,
            Some("TIME_QUERY") => QueryIntent::TimeQuery,
            Some("ACCOUNT_QUERY") => QueryIntent::AccountQuery,
            Some("HELP_REQUEST") => QueryIntent::HelpRequest,
            Some(other) => {
                tracing::debug!(intent = other, "Unrecognised intent from resolver");
                QueryIntent::Unknown
            },
            None => QueryIntent::Unknown,
        }
    }
}

#[async_trait]
impl QueryResolver for HttpQueryResolver {
    async fn resolve(&self, user_id: &str, query: &str) -> Result<ResolvedAnswer, AdapterError> {
        if query.trim().is_empty() {
            return Err(AdapterError::InvalidInput("empty query".to_string()));
        }

        let url = format!("{}/resolve", self.config.url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "userId": user_id,
                "query": query,
            }))
            .send()
            .await
            .map_err(|e| AdapterError::Request(format!("Resolver request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let result: ResolveResponse = response.json().await.map_err(|e| {
            AdapterError::Decode(format!("Failed to parse resolver response: {}", e))
        })?;

        Ok(ResolvedAnswer {
            text: result.answer,
            metadata: QueryMetadata {
                intent: Self::parse_intent(result.intent.as_deref()),
                confidence: result.confidence.clamp(0.0, 1.0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent() {
        assert_eq!(
            HttpQueryResolver::parse_intent(Some("TIME_QUERY")),
            QueryIntent::TimeQuery
        );
        assert_eq!(
            HttpQueryResolver::parse_intent(Some("something_else")),
            QueryIntent::Unknown
        );
        assert_eq!(HttpQueryResolver::parse_intent(None), QueryIntent::Unknown);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_network() {
        let resolver = HttpQueryResolver::new(ResolverClientConfig::default()).unwrap();
        let err = resolver.resolve("u1", "   ").await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidInput(_)));
    }
}

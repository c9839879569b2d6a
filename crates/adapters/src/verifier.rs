//! Token verifier adapter
//!
//! Calls the identity provider's verification endpoint. A non-2xx response
//! or an explicit rejection in the body maps to `VerifyError::Invalid`;
//! transport failures map to `VerifyError::Unavailable` so the caller can
//! distinguish a bad token from a down provider.

use async_trait::async_trait;
use serde::Deserialize;

use voice_gateway_core::{Identity, Role, TokenVerifier, VerifyError};

/// Token verifier client configuration
#[derive(Debug, Clone)]
pub struct VerifierClientConfig {
    /// Base URL of the identity provider
    pub url: String,
    /// Transport-level timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for VerifierClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8089".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(default)]
    role: Role,
}

/// HTTP token verifier
pub struct HttpTokenVerifier {
    config: VerifierClientConfig,
    client: reqwest::Client,
}

impl HttpTokenVerifier {
    pub fn new(config: VerifierClientConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| VerifyError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn new_with_url(url: impl Into<String>) -> Result<Self, VerifyError> {
        Self::new(VerifierClientConfig {
            url: url.into(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        if token.is_empty() {
            return Err(VerifyError::Invalid("empty token".to_string()));
        }

        let url = format!("{}/verify", self.config.url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    VerifyError::Unavailable(e.to_string())
                } else {
                    VerifyError::Invalid(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Invalid(format!("rejected: {}", body)));
        }
        if !status.is_success() {
            return Err(VerifyError::Unavailable(format!(
                "identity provider returned {}",
                status
            )));
        }

        let verified: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::Invalid(format!("malformed verification response: {}", e)))?;

        tracing::debug!(user_id = %verified.user_id, role = verified.role.as_str(), "Token verified");
        Ok(Identity::new(verified.user_id, verified.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = VerifierClientConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8089");
        assert_eq!(config.timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_empty_token_rejected_without_network() {
        let verifier = HttpTokenVerifier::new(VerifierClientConfig::default()).unwrap();
        match verifier.verify("").await {
            Err(VerifyError::Invalid(_)) => {},
            other => panic!("expected Invalid, got {:?}", other.map(|_| ())),
        }
    }
}

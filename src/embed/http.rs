//! HTTP client for an external embedding service.
//!
//! The service receives a base64-encoded image and answers with one
//! embedding per detected face:
//!
//! ```json
//! { "embeddings": [[0.12, -0.44, ...], ...] }
//! ```
//!
//! Payloads are decoded locally first so corrupt frames fail fast as
//! [`EmbedError::Decode`] instead of burning a round trip.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::time::Duration;

use super::{decode_image, EmbedError, EmbeddingProvider};

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct HttpEmbeddingProvider {
    endpoint: String,
    timeout: Duration,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn extract(&self, image: &[u8]) -> Result<Vec<Vec<f32>>, EmbedError> {
        decode_image(image)?;

        let body = serde_json::json!({
            "image": BASE64.encode(image),
        });

        let response = ureq::post(&self.endpoint)
            .timeout(self.timeout)
            .send_json(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    EmbedError::Backend(format!("embedding service returned HTTP {}", code))
                }
                other => EmbedError::Backend(other.to_string()),
            })?;

        let parsed: EmbedResponse = response
            .into_json()
            .map_err(|e| EmbedError::Backend(format!("malformed embedding response: {}", e)))?;

        Ok(parsed.embeddings)
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

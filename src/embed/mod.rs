//! Embedding provider boundary.
//!
//! The actual face detection and embedding model is an external capability;
//! the rest of the crate only depends on the [`EmbeddingProvider`] trait.
//! Implementations are expected to produce vectors of a fixed, consistent
//! dimensionality across calls.

pub mod http;

pub use http::HttpEmbeddingProvider;

use thiserror::Error;

/// Failure modes at the embedding boundary.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The image decoded fine but contained no usable face.
    #[error("no face found in image")]
    NoFace,

    /// The bytes could not be decoded as an image.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// The embedding backend itself failed.
    #[error("embedding backend error: {0}")]
    Backend(String),
}

/// Computes facial embeddings for raw image bytes.
///
/// `extract` returns one embedding per face found in the image, in a stable
/// detector-defined order. An image with no faces yields an empty vector,
/// not an error; errors are reserved for undecodable input and backend
/// failures.
pub trait EmbeddingProvider: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Backend name for logging.
    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}

/// Decode helper for providers that want to reject corrupt payloads before
/// handing them to a model backend.
pub fn decode_image(bytes: &[u8]) -> Result<image::DynamicImage, EmbedError> {
    image::load_from_memory(bytes).map_err(|e| EmbedError::Decode(e.to_string()))
}

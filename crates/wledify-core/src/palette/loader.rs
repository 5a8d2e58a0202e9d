//! Album artwork loading

use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

use crate::error::PaletteUnavailable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server answered {0}")]
    Status(u16),

    #[error("could not decode image: {0}")]
    Decode(String),
}

impl From<LoadError> for PaletteUnavailable {
    fn from(err: LoadError) -> Self {
        PaletteUnavailable::LoadFailed(err.to_string())
    }
}

/// Fetches and decodes an image by URL
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<DynamicImage, LoadError>;
}

/// Loads artwork over HTTP
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<DynamicImage, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Request(e.to_string()))?;
        tracing::debug!(url = %url, size = bytes.len(), "Artwork downloaded");

        tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| LoadError::Decode(e.to_string()))?
            .map_err(|e| LoadError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_bytes, MockServer};

    #[tokio::test]
    async fn test_loads_png() {
        let server = MockServer::start();
        server.enqueue_bytes(200, "image/png", png_bytes(4, 2, |_, _| [1, 2, 3]));

        let loader = HttpImageLoader::new(reqwest::Client::new());
        let image = loader.load(&server.url("/art.png")).await.unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start();
        server.enqueue_text(403, "forbidden");

        let loader = HttpImageLoader::new(reqwest::Client::new());
        let err = loader.load(&server.url("/art.png")).await.unwrap_err();
        assert_eq!(err, LoadError::Status(403));
    }

    #[tokio::test]
    async fn test_garbage_is_a_decode_error() {
        let server = MockServer::start();
        server.enqueue_bytes(200, "image/jpeg", b"not an image".to_vec());

        let loader = HttpImageLoader::new(reqwest::Client::new());
        let err = loader.load(&server.url("/art.jpg")).await.unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)));
    }
}

//! Image dimension lookup
//!
//! Dimensions are read from the image header only. The HTTP body is streamed
//! and decoding is attempted after each chunk, so for the common formats the
//! inspector stops after the first few kilobytes.

use crate::PreviewError;
use async_trait::async_trait;
use image::ImageError;
use std::io::Cursor;
use tracing::debug;

/// Below this many bytes an unrecognised format may still be a truncated
/// signature, so reading continues.
const SIGNATURE_PROBE_BYTES: usize = 64;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageInspector: Send + Sync {
    /// Return `(width, height)` of the image at `url`.
    async fn inspect(&self, url: &str) -> Result<(u32, u32), PreviewError>;
}

#[derive(Debug, Clone)]
pub struct HttpImageInspector {
    client: reqwest::Client,
    probe_limit: usize,
}

impl HttpImageInspector {
    pub fn new(user_agent: &str, probe_limit: usize) -> Result<Self, PreviewError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client, probe_limit))
    }

    pub fn with_client(client: reqwest::Client, probe_limit: usize) -> Self {
        Self { client, probe_limit }
    }
}

#[async_trait]
impl ImageInspector for HttpImageInspector {
    async fn inspect(&self, url: &str) -> Result<(u32, u32), PreviewError> {
        // The response owns the connection; every return below drops it.
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut last_error = PreviewError::ImageDecode("empty body".to_string());

        while let Some(chunk) = response.chunk().await? {
            let remaining = self.probe_limit.saturating_sub(buffer.len());
            buffer.extend_from_slice(&chunk[..chunk.len().min(remaining)]);

            match decode_dimensions(&buffer) {
                Ok(dimensions) => {
                    debug!("Decoded {}x{} from first {} bytes of {}", dimensions.0, dimensions.1, buffer.len(), url);
                    return Ok(dimensions);
                }
                Err(ImageError::Unsupported(e)) if buffer.len() >= SIGNATURE_PROBE_BYTES => {
                    return Err(PreviewError::ImageDecode(e.to_string()));
                }
                Err(e) => last_error = e.into(),
            }

            if buffer.len() >= self.probe_limit {
                return Err(PreviewError::ImageDecode(format!(
                    "no decodable header within {} bytes",
                    self.probe_limit
                )));
            }
        }

        Err(last_error)
    }
}

/// Decode just enough of `bytes` to learn the image dimensions.
pub fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

//! Remote byte fetching
//!
//! The viewer does not own a network protocol: it asks a `ByteFetcher` for the
//! bytes behind a URL and treats anything else as the host's business.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;

use super::error::FetchError;

/// Generic "fetch bytes from URL" capability
pub trait ByteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>>;
}

/// Fetcher for offline hosts; every request fails immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl ByteFetcher for OfflineFetcher {
    fn fetch(&self, _url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        Box::pin(async { Err(FetchError::Unsupported) })
    }
}

/// HTTP(S) fetcher over `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// `request_timeout` is a hard limit on the whole request; the resolver's
    /// soft deadline is separate and much shorter.
    pub fn new(request_timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client, max_bytes })
    }
}

impl ByteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        let client = self.client.clone();
        let max_bytes = self.max_bytes;
        let url = url.to_string();

        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            if let Some(length) = response.content_length() {
                if length > max_bytes as u64 {
                    return Err(FetchError::TooLarge { limit: max_bytes });
                }
            }

            // Content-Length may be absent (chunked), so the cap is enforced while streaming
            let mut body = BytesMut::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| FetchError::Transport(e.to_string()))?;
                if body.len() + chunk.len() > max_bytes {
                    return Err(FetchError::TooLarge { limit: max_bytes });
                }
                body.extend_from_slice(&chunk);
            }
            let body = body.freeze();

            tracing::debug!(url = %url, bytes = body.len(), "remote fetch complete");
            Ok(body)
        })
    }
}

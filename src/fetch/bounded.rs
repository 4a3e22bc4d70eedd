use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FetchConfig;

use super::Transport;

/// Why a single url produced no usable page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

/// Outcome for one submitted url.
#[derive(Debug)]
pub struct Fetched {
    pub url: String,
    pub result: Result<String, FetchError>,
}

/// Issues GETs with at most `max_concurrent` requests in flight.
///
/// Results come back through a stream, either in submission order
/// ([`fetch_ordered`](Self::fetch_ordered)) or as they complete
/// ([`fetch_unordered`](Self::fetch_unordered)). Failed urls are logged and
/// reported, never retried.
pub struct BoundedFetcher<T> {
    transport: T,
    max_concurrent: usize,
    expected_status: u16,
}

impl<T: Transport> BoundedFetcher<T> {
    pub fn new(transport: T, config: &FetchConfig) -> Self {
        Self {
            transport,
            max_concurrent: config.max_concurrent.max(1),
            expected_status: config.expected_status,
        }
    }

    pub fn fetch_ordered(&self, urls: Vec<String>) -> impl Stream<Item = Fetched> + '_ {
        stream::iter(urls)
            .map(move |url| self.fetch_one(url))
            .buffered(self.max_concurrent)
    }

    pub fn fetch_unordered(&self, urls: Vec<String>) -> impl Stream<Item = Fetched> + '_ {
        stream::iter(urls)
            .map(move |url| self.fetch_one(url))
            .buffer_unordered(self.max_concurrent)
    }

    async fn fetch_one(&self, url: String) -> Fetched {
        let result = match self.transport.get(&url).await {
            Ok(response) if response.status == self.expected_status => {
                debug!(%url, bytes = response.body.len(), "Fetched page");
                Ok(response.body)
            }
            Ok(response) => {
                warn!(%url, status = response.status, "Request failed with unexpected status");
                Err(FetchError::Status(response.status))
            }
            Err(e) => {
                warn!(%url, error = %e, "Request failed");
                Err(FetchError::Request(e.to_string()))
            }
        };
        Fetched { url, result }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

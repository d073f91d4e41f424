//! Transport collaborator boundary
//!
//! The controller never moves bytes itself. A `Transport` pulls the primary
//! dataset into the replica and reports how much it transferred; everything
//! behind that call (snapshotting, consistency, access control) belongs to
//! the transport provider.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TransportConfig;

/// Summary of a completed pull
#[derive(Debug, Clone, Copy)]
pub struct PullReport {
    pub bytes_transferred: u64,
}

/// Errors surfaced by a transport provider
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("primary unreachable: {0}")]
    Unreachable(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("pull cancelled")]
    Cancelled,

    #[error("transport client error: {0}")]
    Client(String),
}

/// Data-pull collaborator invoked by the refresh executor
///
/// `pull` may run for a long time and must honor the cancellation token;
/// the executor additionally bounds it with a refresh timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn pull(
        &self,
        primary_ref: &str,
        cancel: CancellationToken,
    ) -> Result<PullReport, TransportError>;
}

/// HTTP-backed transport
///
/// Treats `primary_ref` as a URL, streams the response body, and counts the
/// bytes. Suitable for snapshot endpoints fronted by HTTP; any other mover
/// slots in behind the `Transport` trait.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn pull(
        &self,
        primary_ref: &str,
        cancel: CancellationToken,
    ) -> Result<PullReport, TransportError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = self.client.get(primary_ref).send() => {
                sent.map_err(|e| TransportError::Unreachable(e.to_string()))?
            }
        };

        let response = response
            .error_for_status()
            .map_err(|e| TransportError::Transfer(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut bytes_transferred = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => bytes_transferred += chunk.len() as u64,
                    Some(Err(e)) => return Err(TransportError::Transfer(e.to_string())),
                    None => break,
                }
            }
        }

        debug!(primary_ref = %primary_ref, bytes = bytes_transferred, "Pull complete");
        Ok(PullReport { bytes_transferred })
    }
}

// Inference Client - sends one request and decodes the reply

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::protocol::{PredictionRequest, PredictionResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot client for the newline-delimited protocol
#[derive(Debug, Clone)]
pub struct InferenceClient {
    address: String,
    timeout: Duration,
}

impl InferenceClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let line = request.encode().context("Failed to encode request")?;
        let reply = self.exchange(line.as_bytes()).await?;
        if reply.trim().is_empty() {
            anyhow::bail!("Server closed the connection without a response");
        }
        serde_json::from_str(reply.trim())
            .with_context(|| format!("Failed to decode response: {}", reply.trim()))
    }

    /// Send raw bytes and return whatever the server wrote before closing
    pub async fn exchange(&self, payload: &[u8]) -> Result<String> {
        tokio::time::timeout(self.timeout, async {
            let mut stream = TcpStream::connect(&self.address)
                .await
                .with_context(|| format!("Could not connect to inference server at {}", self.address))?;
            stream
                .write_all(payload)
                .await
                .context("Failed to send request")?;
            stream.shutdown().await.context("Failed to finish request")?;

            let mut reply = String::new();
            stream
                .read_to_string(&mut reply)
                .await
                .context("Failed to read response")?;
            Ok::<_, anyhow::Error>(reply)
        })
        .await
        .with_context(|| format!("Timed out talking to {}", self.address))?
    }
}

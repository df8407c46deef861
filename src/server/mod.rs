// Inference Server - TCP front end for the Predictor
//
// One request line in, one response line out, then the connection closes.
// Every accepted connection gets its own task; the accept loop waits with a
// short timeout so cancellation is noticed between connections.

pub mod client;
pub mod protocol;
pub mod stats;

pub use client::InferenceClient;
pub use protocol::{PredictionRequest, PredictionResponse};
pub use stats::{LatencySummary, ServerStats};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::inference::{Prediction, Predictor};

/// Bound listener plus everything a connection handler needs
pub struct InferenceServer {
    listener: TcpListener,
    predictor: Arc<Predictor>,
    stats: Arc<ServerStats>,
    accept_poll: Duration,
    read_timeout: Duration,
    max_request_bytes: usize,
}

impl InferenceServer {
    /// Bind the configured address. Failure here is a setup error.
    pub async fn bind(config: &ServerConfig, predictor: Predictor) -> Result<Self> {
        let addr = config.bind_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind inference server to {}", addr))?;

        Ok(Self {
            listener,
            predictor: Arc::new(predictor),
            stats: Arc::new(ServerStats::new()),
            accept_poll: config.accept_poll(),
            read_timeout: config.read_timeout(),
            max_request_bytes: config.max_request_bytes,
        })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept until `cancel` fires, then close the listener and report.
    /// In-flight handlers are left to finish on their own.
    pub async fn run(self, cancel: CancellationToken) -> Result<LatencySummary> {
        let addr = self.local_addr()?;
        info!(
            address = %addr,
            model_loaded = self.predictor.is_loaded(),
            features = ?self.predictor.input_dim(),
            "Inference server listening"
        );

        while !cancel.is_cancelled() {
            let accepted = match tokio::time::timeout(self.accept_poll, self.listener.accept()).await {
                Ok(accepted) => accepted,
                // Poll timeout: loop around and re-check cancellation
                Err(_) => continue,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let predictor = Arc::clone(&self.predictor);
                    let stats = Arc::clone(&self.stats);
                    let limits = RequestLimits {
                        read_timeout: self.read_timeout,
                        max_bytes: self.max_request_bytes,
                    };
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &predictor, &stats, limits).await {
                            error!(peer = %peer, error = %format!("{:#}", e), "Client error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }

        drop(self.listener);

        let summary = self.stats.summary();
        info!(
            total_requests = summary.total_requests,
            window = summary.window,
            avg_ms = format!("{:.2}", summary.avg_ms),
            min_ms = format!("{:.2}", summary.min_ms),
            max_ms = format!("{:.2}", summary.max_ms),
            "Inference server stopped"
        );
        Ok(summary)
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestLimits {
    read_timeout: Duration,
    max_bytes: usize,
}

/// Serve exactly one request on `stream`
async fn handle_connection(
    stream: TcpStream,
    predictor: &Predictor,
    stats: &ServerStats,
    limits: RequestLimits,
) -> Result<()> {
    let max_request_bytes = limits.max_bytes;
    let (reader, mut writer) = stream.into_split();

    // One byte past the limit distinguishes "exactly at limit" from "too long".
    let limit = u64::try_from(max_request_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut reader = BufReader::new(reader).take(limit);
    let mut buf = Vec::new();
    match tokio::time::timeout(limits.read_timeout, reader.read_until(b'\n', &mut buf)).await {
        Ok(read) => {
            read.context("Failed to read request")?;
        }
        Err(_) => {
            warn!(
                timeout_ms = limits.read_timeout.as_millis() as u64,
                "Client sent no complete request in time, closing connection"
            );
            return Ok(());
        }
    }

    let response = if buf.len() > max_request_bytes {
        warn!(bytes = buf.len(), "Request exceeds size limit");
        PredictionResponse::malformed(format!(
            "request exceeds {} bytes",
            max_request_bytes
        ))
    } else {
        let text = String::from_utf8_lossy(&buf);
        let text = text.trim();
        if text.is_empty() {
            debug!("Empty request, closing connection");
            return Ok(());
        }

        match serde_json::from_str::<PredictionRequest>(text) {
            Ok(request) => respond(&request, predictor, stats),
            Err(e) => {
                warn!(error = %e, "Malformed request");
                PredictionResponse::malformed(e)
            }
        }
    };

    let line = response.encode().context("Failed to encode response")?;
    writer
        .write_all(line.as_bytes())
        .await
        .context("Failed to write response")?;
    writer.shutdown().await.ok();
    Ok(())
}

fn respond(request: &PredictionRequest, predictor: &Predictor, stats: &ServerStats) -> PredictionResponse {
    let started = Instant::now();
    let prediction = predictor.predict(&request.features());
    let elapsed = started.elapsed();

    let request_id = stats.record(elapsed.as_secs_f64() * 1000.0);
    let response = PredictionResponse::from_prediction(&prediction, request_id, elapsed);

    match &prediction {
        Prediction::Available {
            prediction,
            confidence,
            ..
        } => {
            let label = if *prediction == 1 {
                "PRODUCTIVE"
            } else {
                "NOT_PRODUCTIVE"
            };
            info!(
                request_id = request_id,
                result = label,
                confidence = format!("{:.1}%", confidence * 100.0),
                latency_ms = response.prediction_time_ms,
                "Prediction"
            );
        }
        Prediction::Unavailable { reason } => {
            debug!(request_id = request_id, reason = %reason, "Prediction unavailable");
        }
    }

    response
}

// Request statistics - total count plus a rolling latency window
//
// Single serialization point: the id a request receives and its slot in the
// window are decided under the same lock.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::constants::LATENCY_WINDOW;

/// Shutdown report over the retained window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub total_requests: u64,
    /// Number of latencies the averages below cover
    pub window: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug)]
struct StatsInner {
    total_requests: u64,
    latencies_ms: VecDeque<f64>,
}

/// Thread-safe request tracker shared by every connection handler
#[derive(Debug)]
pub struct ServerStats {
    inner: Mutex<StatsInner>,
    capacity: usize,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::with_capacity(LATENCY_WINDOW)
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                total_requests: 0,
                latencies_ms: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Record one completed prediction and return its request id (1-based)
    pub fn record(&self, latency_ms: f64) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_requests += 1;
        if self.capacity > 0 {
            if inner.latencies_ms.len() == self.capacity {
                inner.latencies_ms.pop_front();
            }
            inner.latencies_ms.push_back(latency_ms);
        }
        inner.total_requests
    }

    pub fn total_requests(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_requests
    }

    pub fn summary(&self) -> LatencySummary {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = inner.latencies_ms.len();
        if window == 0 {
            return LatencySummary {
                total_requests: inner.total_requests,
                ..Default::default()
            };
        }

        let sum: f64 = inner.latencies_ms.iter().sum();
        let min_ms = inner.latencies_ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = inner.latencies_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        LatencySummary {
            total_requests: inner.total_requests,
            window,
            avg_ms: sum / window as f64,
            min_ms,
            max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_increase_from_one() {
        let stats = ServerStats::new();
        assert_eq!(stats.record(1.0), 1);
        assert_eq!(stats.record(2.0), 2);
        assert_eq!(stats.total_requests(), 2);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let stats = ServerStats::with_capacity(3);
        for ms in [10.0, 1.0, 2.0, 3.0] {
            stats.record(ms);
        }
        let summary = stats.summary();
        assert_eq!(summary.total_requests, 4);
        assert_eq!(summary.window, 3);
        assert_eq!(summary.min_ms, 1.0);
        assert_eq!(summary.max_ms, 3.0);
        assert_eq!(summary.avg_ms, 2.0);
    }

    #[test]
    fn test_default_window_is_bounded() {
        let stats = ServerStats::new();
        for i in 0..250 {
            stats.record(i as f64);
        }
        let summary = stats.summary();
        assert_eq!(summary.window, 100);
        assert_eq!(summary.min_ms, 150.0);
        assert_eq!(summary.total_requests, 250);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ServerStats::new().summary();
        assert_eq!(summary, LatencySummary::default());
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let stats = Arc::new(ServerStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || (0..50).map(|_| stats.record(0.1)).collect::<Vec<_>>())
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&400));
    }
}

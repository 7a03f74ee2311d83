//! In-process serving metrics and the periodic summary reporter

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the scoring service
pub struct PipelineMetrics {
    /// Total request batches served successfully
    pub requests_processed: AtomicU64,
    /// Total rows scored across all batches
    pub rows_scored: AtomicU64,
    /// Total failed requests
    pub requests_failed: AtomicU64,
    /// Verdict counts per model ("model_a/High Risk" style keys)
    verdicts: RwLock<HashMap<String, u64>>,
    /// End-to-end request times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for throughput calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_processed: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            verdicts: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a served batch
    pub fn record_request(&self, processing_time: Duration, rows: u64) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the recent window for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one model verdict
    pub fn record_verdict(&self, model_id: &str, label: &str) {
        if let Ok(mut verdicts) = self.verdicts.write() {
            *verdicts
                .entry(format!("{model_id}/{label}"))
                .or_insert(0) += 1;
        }
    }

    /// Get request time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap();
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get verdict counts per model
    pub fn get_verdicts(&self) -> HashMap<String, u64> {
        self.verdicts.read().unwrap().clone()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_processed.load(Ordering::Relaxed);
        let rows = self.rows_scored.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();

        info!(
            requests = requests,
            rows = rows,
            failed = failed,
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Scoring service metrics"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            "Request latency (μs)"
        );

        let verdicts = self.get_verdicts();
        if !verdicts.is_empty() {
            let mut keys: Vec<_> = verdicts.keys().collect();
            keys.sort();
            for key in keys {
                info!(verdict = %key, count = verdicts[key], "Verdict count");
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic reporter that logs a metrics summary
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

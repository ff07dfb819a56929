//! Metrics collection and reporting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// Snapshot of gateway counters
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    /// Total requests processed
    pub total_requests: u64,

    /// Requests that passed the gate
    pub gate_allowed: u64,

    /// Requests stopped by the gate
    pub gate_denied: u64,

    /// Error responses of any kind
    pub total_errors: u64,

    /// Average response time (ms)
    pub avg_response_time_ms: f64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Latency histogram buckets (in milliseconds)
const LATENCY_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0];

/// Histogram for tracking latency distribution
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<(f64, Arc<AtomicU64>)>,
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        let bucket_counters = buckets
            .iter()
            .map(|&b| (b, Arc::new(AtomicU64::new(0))))
            .collect();

        Self {
            buckets: bucket_counters,
            sum: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn observe(&self, value: f64) {
        self.sum.fetch_add(value as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Cumulative: every bucket >= value
        for (bucket, counter) in &self.buckets {
            if value <= *bucket {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn export_prometheus(&self, name: &str, help: &str) -> String {
        let mut output = String::new();

        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} histogram\n", name));

        for (bucket, counter) in &self.buckets {
            let count = counter.load(Ordering::Relaxed);
            output.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", name, bucket, count));
        }

        let total_count = self.count.load(Ordering::Relaxed);
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, total_count));

        let sum = self.sum.load(Ordering::Relaxed) as f64;
        output.push_str(&format!("{}_sum {:.3}\n", name, sum));
        output.push_str(&format!("{}_count {}\n", name, total_count));

        output
    }
}

/// Metrics collector
pub struct MetricsCollector {
    start_time: Instant,
    total_requests: AtomicU64,
    total_response_time_ms: AtomicU64,
    gate_allowed: AtomicU64,
    // Both indexed like ErrorKind::ALL
    gate_denied_by_kind: [AtomicU64; 7],
    errors_by_kind: [AtomicU64; 7],
    request_latency: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_response_time_ms: AtomicU64::new(0),
            gate_allowed: AtomicU64::new(0),
            gate_denied_by_kind: Default::default(),
            errors_by_kind: Default::default(),
            request_latency: Histogram::new(LATENCY_BUCKETS),
        }
    }

    fn kind_index(kind: ErrorKind) -> usize {
        ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(ErrorKind::ALL.len() - 1)
    }

    /// Record a finished request
    pub fn record_request(&self, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let ms = response_time.as_millis() as u64;
        self.total_response_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.request_latency.observe(ms as f64);
    }

    /// Record a request admitted by the gate
    pub fn record_allowed(&self) {
        self.gate_allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request the gate stopped
    pub fn record_denied(&self, kind: ErrorKind) {
        self.gate_denied_by_kind[Self::kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    /// Gate denials recorded for one kind
    pub fn denied_of(&self, kind: ErrorKind) -> u64 {
        self.gate_denied_by_kind[Self::kind_index(kind)].load(Ordering::Relaxed)
    }

    /// Record an error response of the given kind
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors_by_kind[Self::kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    /// Errors recorded for one kind
    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind[Self::kind_index(kind)].load(Ordering::Relaxed)
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> GatewayMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time_ms.load(Ordering::Relaxed);

        let avg_response_time_ms = if total_requests > 0 {
            total_response_time as f64 / total_requests as f64
        } else {
            0.0
        };

        let gate_denied = self
            .gate_denied_by_kind
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum();

        let total_errors = self
            .errors_by_kind
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum();

        GatewayMetrics {
            total_requests,
            gate_allowed: self.gate_allowed.load(Ordering::Relaxed),
            gate_denied,
            total_errors,
            avg_response_time_ms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn denied_lines(&self) -> String {
        ErrorKind::ALL
            .into_iter()
            .filter(|kind| self.denied_of(*kind) > 0)
            .map(|kind| {
                format!(
                    "landing_gateway_gate_denied_total{{code=\"{}\"}} {}\n",
                    kind.code(),
                    self.denied_of(kind)
                )
            })
            .collect()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics();

        let mut output = format!(
            "# HELP landing_gateway_requests_total Total number of requests\n\
             # TYPE landing_gateway_requests_total counter\n\
             landing_gateway_requests_total {}\n\
             \n\
             # HELP landing_gateway_gate_allowed_total Requests admitted by the gate\n\
             # TYPE landing_gateway_gate_allowed_total counter\n\
             landing_gateway_gate_allowed_total {}\n\
             \n\
             # HELP landing_gateway_gate_denied_total Requests stopped by the gate, by code\n\
             # TYPE landing_gateway_gate_denied_total counter\n\
             {}\
             \n\
             # HELP landing_gateway_avg_response_time_ms Average response time in milliseconds\n\
             # TYPE landing_gateway_avg_response_time_ms gauge\n\
             landing_gateway_avg_response_time_ms {:.2}\n\
             \n\
             # HELP landing_gateway_uptime_seconds Uptime in seconds\n\
             # TYPE landing_gateway_uptime_seconds counter\n\
             landing_gateway_uptime_seconds {}\n\
             \n\
             # HELP landing_gateway_errors_total Error responses by code\n\
             # TYPE landing_gateway_errors_total counter\n",
            metrics.total_requests,
            metrics.gate_allowed,
            self.denied_lines(),
            metrics.avg_response_time_ms,
            metrics.uptime_secs,
        );

        for kind in ErrorKind::ALL {
            output.push_str(&format!(
                "landing_gateway_errors_total{{code=\"{}\"}} {}\n",
                kind.code(),
                self.errors_of(kind)
            ));
        }
        output.push('\n');

        output.push_str(&self.request_latency.export_prometheus(
            "landing_gateway_request_duration_ms",
            "Request duration in milliseconds",
        ));

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

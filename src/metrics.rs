use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-local counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub records_created: Arc<AtomicU64>,
    pub records_updated: Arc<AtomicU64>,
    pub records_deleted: Arc<AtomicU64>,
    pub broadcasts: Arc<AtomicU64>,
    pub events_delivered: Arc<AtomicU64>,
    pub handles_pruned: Arc<AtomicU64>,
    pub handles_swept: Arc<AtomicU64>,
    pub requests_rate_limited: Arc<AtomicU64>,
    pub sse_connections: Arc<AtomicI64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            records_created: Arc::new(AtomicU64::new(0)),
            records_updated: Arc::new(AtomicU64::new(0)),
            records_deleted: Arc::new(AtomicU64::new(0)),
            broadcasts: Arc::new(AtomicU64::new(0)),
            events_delivered: Arc::new(AtomicU64::new(0)),
            handles_pruned: Arc::new(AtomicU64::new(0)),
            handles_swept: Arc::new(AtomicU64::new(0)),
            requests_rate_limited: Arc::new(AtomicU64::new(0)),
            sse_connections: Arc::new(AtomicI64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_records_created(&self) {
        self.records_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_updated(&self) {
        self.records_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_deleted(&self) {
        self.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_broadcasts(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_events_delivered(&self, count: u64) {
        self.events_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_handles_pruned(&self, count: u64) {
        self.handles_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_handles_swept(&self, count: u64) {
        self.handles_swept.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sse_connected(&self) {
        self.sse_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sse_disconnected(&self) {
        self.sse_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_created: self.records_created.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            handles_pruned: self.handles_pruned.load(Ordering::Relaxed),
            handles_swept: self.handles_swept.load(Ordering::Relaxed),
            requests_rate_limited: self.requests_rate_limited.load(Ordering::Relaxed),
            sse_connections: self.sse_connections.load(Ordering::Relaxed).max(0),
            uptime_seconds: self.uptime_seconds(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub records_created: u64,
    pub records_updated: u64,
    pub records_deleted: u64,
    pub broadcasts: u64,
    pub events_delivered: u64,
    pub handles_pruned: u64,
    pub handles_swept: u64,
    pub requests_rate_limited: u64,
    pub sse_connections: i64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 8] = [
            ("records_created", "Records created", self.records_created),
            ("records_updated", "Records updated", self.records_updated),
            ("records_deleted", "Records deleted", self.records_deleted),
            ("broadcasts", "Broadcasts performed", self.broadcasts),
            ("events_delivered", "SSE events delivered to subscribers", self.events_delivered),
            ("handles_pruned", "Dead SSE handles pruned during broadcast", self.handles_pruned),
            ("handles_swept", "Dead SSE handles removed by the periodic sweep", self.handles_swept),
            ("requests_rate_limited", "Requests rejected by the rate limiter", self.requests_rate_limited),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP ignitor_{name} {help}\n# TYPE ignitor_{name} counter\nignitor_{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP ignitor_sse_connections Open SSE connections\n# TYPE ignitor_sse_connections gauge\nignitor_sse_connections {}\n",
            self.sse_connections
        ));
        out.push_str(&format!(
            "# HELP ignitor_uptime_seconds Uptime seconds\n# TYPE ignitor_uptime_seconds gauge\nignitor_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        out
    }
}

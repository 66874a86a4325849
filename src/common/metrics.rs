//! Provider metrics
//!
//! Counters and a refresh-duration histogram owned by each cluster-state
//! provider, rendered in Prometheus text format on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds of the refresh-duration buckets, in milliseconds
const REFRESH_BUCKETS: [f64; 9] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

/// Refresh-duration histogram over [`REFRESH_BUCKETS`] plus `+Inf`
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; REFRESH_BUCKETS.len() + 1],
    /// Microseconds
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one duration in milliseconds
    pub fn observe(&self, millis: f64) {
        let idx = REFRESH_BUCKETS
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(REFRESH_BUCKETS.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add((millis * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative counts per upper bound, ending with `+Inf`
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let bounds = REFRESH_BUCKETS.iter().copied().chain([f64::INFINITY]);
        bounds
            .zip(&self.buckets)
            .scan(0u64, |total, (bound, bucket)| {
                *total += bucket.load(Ordering::Relaxed);
                Some((bound, *total))
            })
            .collect()
    }

    /// Total in milliseconds
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-written value
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, v: u64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Metrics for one cluster-state provider
#[derive(Debug, Default)]
pub struct ProviderMetrics {
    /// Completed refreshes (snapshot published)
    pub refreshes: Counter,
    /// Refreshes that failed before publishing
    pub refresh_failures: Counter,
    /// Sessions opened, including the first one
    pub reconnects: Counter,
    /// Documents or children that degraded to an empty contribution
    pub fetch_failures: Counter,
    /// Errors swallowed inside the notification handler
    pub notification_failures: Counter,
    /// Notifications received
    pub notifications: Counter,
    /// Successful shard URL selections
    pub selections: Counter,
    /// Leader requests served by a non-leader replica
    pub leader_fallbacks: Counter,
    /// Forced resynchronizations triggered by an empty selection
    pub forced_refreshes: Counter,
    /// Collections in the current snapshot
    pub collections: Gauge,
    /// Refresh duration
    pub refresh_duration: Histogram,
}

impl ProviderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished refresh
    pub fn record_refresh(&self, duration: Duration, success: bool) {
        self.refresh_duration
            .observe(duration.as_secs_f64() * 1000.0);
        if success {
            self.refreshes.inc();
        } else {
            self.refresh_failures.inc();
        }
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters = [
            ("refreshes_total", "Published cluster-state snapshots", &self.refreshes),
            ("refresh_failures_total", "Refreshes that failed before publishing", &self.refresh_failures),
            ("reconnects_total", "Coordination sessions opened", &self.reconnects),
            ("fetch_failures_total", "Fetches degraded to an empty contribution", &self.fetch_failures),
            ("notification_failures_total", "Errors swallowed by the notification handler", &self.notification_failures),
            ("notifications_total", "Coordination notifications received", &self.notifications),
            ("selections_total", "Shard URLs handed out", &self.selections),
            ("leader_fallbacks_total", "Leader requests served by a non-leader replica", &self.leader_fallbacks),
            ("forced_refreshes_total", "Forced resynchronizations after an empty selection", &self.forced_refreshes),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP shardlocate_{} {}", name, help);
            let _ = writeln!(out, "# TYPE shardlocate_{} counter", name);
            let _ = writeln!(out, "shardlocate_{} {}", name, counter.get());
        }

        out.push_str("# HELP shardlocate_collections Collections in the current snapshot\n");
        out.push_str("# TYPE shardlocate_collections gauge\n");
        let _ = writeln!(out, "shardlocate_collections {}", self.collections.get());

        out.push_str("# HELP shardlocate_refresh_duration_ms Refresh duration in milliseconds\n");
        out.push_str("# TYPE shardlocate_refresh_duration_ms histogram\n");
        for (le, count) in self.refresh_duration.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(
                    out,
                    "shardlocate_refresh_duration_ms_bucket{{le=\"+Inf\"}} {}",
                    count
                );
            } else {
                let _ = writeln!(
                    out,
                    "shardlocate_refresh_duration_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                );
            }
        }
        let _ = writeln!(
            out,
            "shardlocate_refresh_duration_ms_sum {}",
            self.refresh_duration.sum()
        );
        let _ = writeln!(
            out,
            "shardlocate_refresh_duration_ms_count {}",
            self.refresh_duration.count()
        );

        out
    }
}

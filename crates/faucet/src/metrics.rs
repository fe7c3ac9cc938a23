//! Prometheus metrics for the faucet

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Funding counters and chain latency, registered on a private registry.
#[derive(Clone)]
pub struct FaucetMetrics {
    registry: Registry,
    attempts: IntCounterVec,
    store_failures: IntCounter,
    chain_latency: Histogram,
}

impl FaucetMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let attempts = IntCounterVec::new(
            Opts::new("faucet_funding_attempts_total", "Funding requests by outcome"),
            &["outcome"], // funded | rate_limited | chain_error
        )?;
        let store_failures = IntCounter::new(
            "faucet_store_failures_total",
            "Funding attempts that could not be recorded",
        )?;
        let chain_latency = Histogram::with_opts(
            HistogramOpts::new(
                "faucet_chain_submission_duration_seconds",
                "Nonce lookup plus sign-and-send duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(store_failures.clone()))?;
        registry.register(Box::new(chain_latency.clone()))?;

        Ok(Self {
            registry,
            attempts,
            store_failures,
            chain_latency,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.attempts.with_label_values(&[outcome]).inc();
    }

    pub fn record_store_failure(&self) {
        self.store_failures.inc();
    }

    pub fn observe_chain_latency(&self, seconds: f64) {
        self.chain_latency.observe(seconds);
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.attempts.with_label_values(&[outcome]).get()
    }

    pub fn store_failure_count(&self) -> u64 {
        self.store_failures.get()
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

//! Prometheus engine metrics

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use volley_core::{Result, RoundSummary, VolleyError};

const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
];

/// Counters and latency histogram fed by the driver after each round
pub struct EngineMetrics {
    registry: Registry,
    invocations: IntCounterVec,
    latency_ms: Histogram,
    rounds: IntCounter,
    abandoned: IntCounter,
}

fn metrics_err(e: prometheus::Error) -> VolleyError {
    VolleyError::Metrics(e.to_string())
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let invocations = IntCounterVec::new(
            Opts::new("volley_invocations_total", "Invocations by outcome"),
            &["outcome"],
        )
        .map_err(metrics_err)?;
        let latency_ms = Histogram::with_opts(
            HistogramOpts::new("volley_invocation_latency_ms", "Worker-measured invocation latency")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
        )
        .map_err(metrics_err)?;
        let rounds = IntCounter::new("volley_rounds_total", "Concurrency rounds executed").map_err(metrics_err)?;
        let abandoned = IntCounter::new(
            "volley_abandoned_total",
            "Invocations abandoned at a collection deadline",
        )
        .map_err(metrics_err)?;

        registry.register(Box::new(invocations.clone())).map_err(metrics_err)?;
        registry.register(Box::new(latency_ms.clone())).map_err(metrics_err)?;
        registry.register(Box::new(rounds.clone())).map_err(metrics_err)?;
        registry.register(Box::new(abandoned.clone())).map_err(metrics_err)?;

        Ok(Self {
            registry,
            invocations,
            latency_ms,
            rounds,
            abandoned,
        })
    }

    pub fn observe_invocation(&self, success: bool, elapsed_ms: Option<u64>) {
        let label = if success { "success" } else { "failure" };
        self.invocations.with_label_values(&[label]).inc();
        if let Some(ms) = elapsed_ms {
            self.latency_ms.observe(ms as f64);
        }
    }

    pub fn observe_round(&self, summary: &RoundSummary) {
        self.rounds.inc();
        self.observe_abandoned(summary.unaccounted());
    }

    /// Invocations dropped at a collection deadline or drain grace
    pub fn observe_abandoned(&self, count: usize) {
        self.abandoned.inc_by(count as u64);
    }

    /// Count of invocations recorded under `outcome` ("success" or "failure")
    pub fn invocation_count(&self, outcome: &str) -> u64 {
        self.invocations.with_label_values(&[outcome]).get()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.get()
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned.get()
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_err)?;
        String::from_utf8(buffer).map_err(|e| VolleyError::Metrics(e.to_string()))
    }
}

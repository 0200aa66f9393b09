// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order lifecycle operations (creates, reprocessing requests)
// - Queue message consumption (processed, discarded by reason)
// - Processing latency
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the pipeline.
pub struct Metrics {
    registry: Registry,

    // Lifecycle service metrics
    pub orders_created: IntCounter,
    pub orders_requeued: IntCounter,
    pub enqueue_failures: IntCounter,

    // Worker metrics
    pub messages_processed: IntCounter,
    pub messages_discarded: IntCounterVec,
    pub processing_duration: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new(
            "orders_created_total",
            "Orders persisted with status NEW",
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_requeued = IntCounter::new(
            "orders_requeued_total",
            "Reprocessing requests (status reset to NEW)",
        )?;
        registry.register(Box::new(orders_requeued.clone()))?;

        let enqueue_failures = IntCounter::new(
            "enqueue_failures_total",
            "Publish failures after a committed store write",
        )?;
        registry.register(Box::new(enqueue_failures.clone()))?;

        let messages_processed = IntCounter::new(
            "messages_processed_total",
            "Queue messages that completed the NEW to PROCESSED transition",
        )?;
        registry.register(Box::new(messages_processed.clone()))?;

        let messages_discarded = IntCounterVec::new(
            Opts::new(
                "messages_discarded_total",
                "Queue messages consumed without mutating an order",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(messages_discarded.clone()))?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "processing_duration_seconds",
                "Wall-clock duration of the processing transition",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_requeued,
            enqueue_failures,
            messages_processed,
            messages_discarded,
            processing_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a consumed message that did not process an order.
    pub fn record_discard(&self, reason: &str) {
        self.messages_discarded.with_label_values(&[reason]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

use std::time::Instant;

/// Metrics for the auction client.
#[derive(Debug, Clone, prometheus_metric_storage::MetricStorage)]
pub struct Metrics {
    /// Refresh cycles that failed, per data family.
    #[metric(labels("family"))]
    pub poll_failures: prometheus::IntCounterVec,
    /// Snapshots that contradicted a previously read one.
    pub stale_reads: prometheus::IntCounter,
    /// Results of user actions.
    #[metric(labels("action", "result"))]
    pub actions: prometheus::IntCounterVec,
    /// Time spent in user actions, confirmation waits included.
    #[metric(
        labels("action"),
        buckets(0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0)
    )]
    pub action_duration: prometheus::HistogramVec,
}

impl Metrics {
    /// Returns a guard that records the action's duration when dropped.
    #[must_use]
    pub fn on_action_start<'a>(&'a self, action: &'a str) -> impl Drop + use<'a> {
        let start = Instant::now();
        scopeguard::guard(start, move |start| {
            self.action_duration
                .with_label_values(&[action])
                .observe(start.elapsed().as_secs_f64());
        })
    }
}

/// Setup the metrics registry.
pub fn init() {
    if let Err(err) = observe::metrics::setup_registry(Some("auction_client".to_owned())) {
        tracing::warn!(?err, "invalid metrics registry configuration");
    }
}

/// Get the metrics instance.
pub fn get() -> &'static Metrics {
    Metrics::instance(observe::metrics::get_storage_registry())
        .expect("unexpected error getting metrics instance")
}

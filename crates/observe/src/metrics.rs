use {
    prometheus::Encoder,
    std::{net::SocketAddr, sync::OnceLock},
    tokio::task::JoinHandle,
};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configure global metrics registry with a common prefix for all metric
/// names.
///
/// Must be called before any call to [`get_registry`], ideally at the very
/// beginning of `main`. Later calls, or calls after the registry was lazily
/// initialized, are ignored with a warning.
pub fn setup_registry(prefix: Option<String>) -> Result<(), prometheus::Error> {
    let registry = prometheus::Registry::new_custom(prefix, None)?;
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    if REGISTRY.set(storage_registry).is_err() {
        tracing::warn!("metrics registry already initialized");
    }
    Ok(())
}

/// Get the global instance of the metrics registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global instance of the metric storage registry.
///
/// Falls back to an unprefixed registry if [`setup_registry`] was never
/// called so unit tests don't need any setup.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::warn!(?err, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// `/metrics` route exposing encoded prometheus data to monitoring systems.
pub fn handle_metrics() -> axum::Router {
    async fn metrics_handler() -> String {
        encode(get_registry())
    }

    axum::Router::new().route("/metrics", axum::routing::get(metrics_handler))
}

/// Serves [`handle_metrics`] on `address` until the task is aborted.
pub fn serve_metrics(address: SocketAddr) -> JoinHandle<()> {
    tracing::info!(%address, "serving metrics");
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(?err, %address, "failed to bind metrics server");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, handle_metrics()).await {
            tracing::error!(?err, "metrics server stopped");
        }
    })
}

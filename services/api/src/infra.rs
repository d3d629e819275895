use credit_policy::analysis::{HttpBureauClient, RateTable};
use credit_policy::config::{BureauConfig, RateModelConfig};
use credit_policy::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Load the configured rate model, falling back to the table shipped with the crate.
pub(crate) fn load_rate_table(config: &RateModelConfig) -> Result<RateTable, AppError> {
    let table = match &config.path {
        Some(path) => {
            info!(path = %path.display(), "loading rate model");
            RateTable::from_path(path)?
        }
        None => RateTable::bundled()?,
    };
    Ok(table)
}

/// The blocking bureau client spins up its own runtime, so it is built off the async workers.
pub(crate) async fn build_bureau_client(
    config: BureauConfig,
) -> Result<HttpBureauClient, AppError> {
    let client = tokio::task::spawn_blocking(move || HttpBureauClient::new(&config))
        .await
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))??;
    info!(base_url = client.base_url(), "bureau client configured");
    Ok(client)
}

use crate::cli::ServeArgs;
use crate::infra::{build_bureau_client, load_rate_table, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use credit_policy::analysis::{InMemoryLoanRepository, LoanAnalysisService, StakeholderRegistry};
use credit_policy::config::AppConfig;
use credit_policy::error::AppError;
use credit_policy::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let rates = Arc::new(load_rate_table(&config.rates)?);
    let bureau = Arc::new(build_bureau_client(config.bureau.clone()).await?);
    let repository = Arc::new(InMemoryLoanRepository::default());
    let registry = StakeholderRegistry::standard(rates);
    info!(?registry, "stakeholder policies registered");
    let analysis_service = Arc::new(LoanAnalysisService::new(repository, bureau, registry));

    let app = with_operational_routes(analysis_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan analysis service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

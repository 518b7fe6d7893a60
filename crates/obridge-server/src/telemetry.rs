use crate::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Install the Prometheus recorder and serve `/metrics` and `/health` until
/// `token` is cancelled.
pub async fn serve(config: &MetricsConfig, token: CancellationToken) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || async move { handle.render() }),
        )
        .route("/health", axum::routing::get(|| async { "ok" }));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("metrics listening on {}", config.listen_addr);
    tokio::spawn(async move {
        let shutdown = async move { token.cancelled().await };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("metrics server error: {err}");
        }
    });
    Ok(())
}

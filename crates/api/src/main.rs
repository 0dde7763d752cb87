use anyhow::Context;

use ledgerdesk_api::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledgerdesk_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let addr = config.bind_addr()?;

    let (app, services) = ledgerdesk_api::app::build_app(&config)
        .await
        .context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    services.shutdown();
    Ok(())
}

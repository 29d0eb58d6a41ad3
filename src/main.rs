use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use repodocs::api;
use repodocs::config::Config;
use repodocs::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "repodocs listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

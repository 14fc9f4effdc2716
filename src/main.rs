use hushline::{config::Config, logging, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init_tracing();

    let state = AppState::from_config(&config).await.map_err(|e| e.error)?;
    let app = router(state, &config).map_err(|e| e.error)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, policy = ?config.admin_flag_policy, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

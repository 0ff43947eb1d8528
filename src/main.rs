use tracing_subscriber::EnvFilter;

use nsdk_migrator::api;
use nsdk_migrator::config::Config;
use nsdk_migrator::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());

    let state = AppState::new(config.clone())?;
    match state.active_configuration()? {
        Some(active) => tracing::info!(
            "Active configuration: {} (llm {}, vector store {})",
            active.name,
            active.llm.provider,
            active.vector_store.kind.as_str()
        ),
        None => tracing::info!("No active configuration yet"),
    }

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

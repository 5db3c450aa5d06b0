use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use proxpi::config::Config;
use proxpi::state::AppState;
use proxpi::routes;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let config = Config::from_env()?;

    let default_filter = config
        .logging_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .from_env()?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let bind = config.bind;
    let state = Arc::new(AppState::new(&config));
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // `config` is dropped here, removing `owned_cache_dir` (if any) now that
    // the server has stopped accepting new requests.
    drop(config);
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

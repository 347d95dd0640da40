use anyhow::Context;
use cachefront::AppState;
use cachefront_core::Config;
use cachefront_local::engine::CacheEngine;
use cachefront_local::meta::MySqlMetadataStore;
use cachefront_local::ssrf::SsrfGuard;
use cachefront_local::store::ObjectStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cachefront")]
#[command(about = "Caching forward-proxy for static web assets", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Directory cached objects are stored in.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// Port to listen on.
    #[arg(long, default_value_t = 8089)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachefront=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let store = MySqlMetadataStore::connect(&config.db)
        .await
        .context("connecting metadata database")?;
    store
        .ensure_schema()
        .await
        .context("ensuring metadata schema")?;

    let objects = ObjectStore::new(&cli.data_dir)?;
    let engine = CacheEngine::new(Arc::new(store), objects, Arc::new(SsrfGuard::new()))?;
    let app = cachefront::router(Arc::new(AppState { engine }));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, data_dir = %cli.data_dir.display(), "cachefront listening");
    axum::serve(listener, app).await?;
    Ok(())
}

//! rkradar-svc - Riigikogu Radar service binary

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rkradar_common::config::Settings;
use rkradar_common::db;
use rkradar_svc::AppState;

#[derive(Debug, Parser)]
#[command(name = "rkradar-svc", version, about = "Riigikogu vote prediction service")]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "RKRADAR_CONFIG")]
    config: Option<String>,

    /// Listen port, overrides the config value
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path, overrides the config value
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(database) = args.database {
        settings.database_path = database;
    }

    info!("Starting rkradar-svc v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", settings.database_path);

    let pool = db::init_database_pool(Path::new(&settings.database_path)).await?;
    db::init_tables(&pool).await?;
    info!("Database ready");

    let port = settings.port;
    let state = AppState::new(pool, settings);
    let app = rkradar_svc::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

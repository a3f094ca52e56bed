use hoard::bulk::BulkCache;
use hoard::config::Config;
use hoard::routes;
use hoard::state::AppState;
use hoard_db::Database;
use hoard_storage::BlobHandle;
use hoard_storage::backend::S3Backend;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let database = Database::connect(&config.db).await?;
    let blobs: BlobHandle = Arc::new(S3Backend::new(
        "s3",
        &config.s3.bucket,
        &config.s3.region_name,
        Some(&config.s3.endpoint),
        &config.s3.public_key,
        &config.s3.private_key,
        config.server.virtual_addressing(),
    ));

    let state = AppState {
        db: database,
        blobs,
        admin_token: config.server.admin_token.clone(),
        bulk: Arc::new(BulkCache::default()),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "coordinator listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    // Ignore failure to install the handler; it only means no graceful stop.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

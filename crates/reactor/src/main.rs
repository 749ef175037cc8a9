use std::sync::Arc;

use anyhow::{bail, Result};
use exporter::driver::MySqlDriver;
use exporter::notify::{LogNotifier, Notifier, SmtpNotifier};
use exporter::pool::{ProgressSink, WorkerPool, WorkerPoolConfig};
use exporter::storage::{ObjectStoreProvider, S3Config, StorageProvider};
use tracing::info;

mod app;
mod config;
mod error;
mod hub;
mod logging;
mod routes;
mod services;

use app::AppState;
use hub::Hub;
use services::keys::KeyService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;
    logging::init_logging(&config);

    info!(env = %config.app_env, "starting FluxQuery reactor");

    if config.mysql_dsn.is_empty() {
        bail!("MYSQL_DSN is required");
    }

    let pool = persistence::db::create_pool(&persistence::db::DatabaseConfig {
        dsn: config.mysql_dsn.clone(),
        ..Default::default()
    })
    .await?;

    info!("running database migrations");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;

    let hub = Arc::new(Hub::new());

    let storage: Arc<dyn StorageProvider> = match config.storage_type.as_str() {
        "local" => Arc::new(ObjectStoreProvider::local(&config.local_storage_path)?),
        _ => Arc::new(ObjectStoreProvider::s3(&S3Config {
            region: config.aws_region.clone(),
            bucket: config.s3_bucket.clone(),
            endpoint: config.s3_endpoint.clone(),
            path_style: config.s3_path_style,
        })?),
    };

    let notifier: Arc<dyn Notifier> = if config.smtp_host.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(SmtpNotifier::new(
            &config.smtp_host,
            config.smtp_port,
            &config.smtp_user,
            &config.smtp_pass,
            &config.smtp_from,
        )?)
    };

    let driver = Arc::new(MySqlDriver::new(&config.mysql_dsn)?);
    let workers = Arc::new(WorkerPool::start(
        WorkerPoolConfig {
            workers: config.worker_count,
            queue_capacity: 100,
            max_db_concurrency: config.max_db_concurrency,
            use_gzip: config.compression,
            attach_file: config.email_attach_file,
        },
        driver,
        Arc::clone(&storage),
        notifier,
        Some(Arc::clone(&hub) as Arc<dyn ProgressSink>),
    ));

    let port = config.server_port;
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        hub,
        workers: Arc::clone(&workers),
        keys: KeyService::new(pool),
    };
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "reactor listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

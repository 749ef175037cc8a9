use std::sync::Arc;

use anyhow::{bail, Result};
use exporter::driver::{Driver, MongoDriver, MySqlDriver, PostgresDriver};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod runtime;

use config::AgentConfig;
use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AgentConfig::load()?;
    if let Err(message) = config.validate() {
        bail!("{}", message);
    }

    info!(reactor = %config.reactor_url, "starting FluxQuery agent");

    let driver: Arc<dyn Driver> = if !config.mongo_uri.is_empty() {
        info!("using MongoDB driver");
        Arc::new(MongoDriver::new(&config.mongo_uri))
    } else if !config.postgres_dsn.is_empty() {
        info!("using PostgreSQL driver");
        Arc::new(PostgresDriver::new(&config.postgres_dsn)?)
    } else {
        info!("using MySQL driver");
        Arc::new(MySqlDriver::new(&config.mysql_dsn)?)
    };

    if let Err(e) = driver.ping().await {
        bail!("failed to connect to database: {}", e);
    }
    info!("connected to database");

    let agent = Agent::new(config, Arc::clone(&driver));
    tokio::select! {
        _ = agent.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("agent shutting down");
        }
    }

    driver.close().await;
    Ok(())
}

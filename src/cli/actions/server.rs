use crate::{
    api::{self, ApiConfig},
    factor::{
        FactorConfig, MusicFactor,
        catalog::DeezerCatalog,
        store::{MemoryStore, PgStore, Store},
    },
};
use anyhow::{Context, Result, anyhow};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_origin: Option<String>,
    pub catalog_url: String,
    pub catalog_timeout_seconds: u64,
    pub preview_host: String,
    pub store_timeout_seconds: u64,
    pub factor: FactorConfig,
}

async fn store(dsn: Option<&str>, timeout: Duration) -> Result<Arc<dyn Store>> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, accounts and sessions are kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(timeout)
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgStore::new(pool, timeout);
    store
        .ensure_schema()
        .await
        .map_err(|err| anyhow!(err))
        .context("Failed to create store schema")?;

    info!("Using Postgres store");
    Ok(Arc::new(store))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store or catalog cannot be set up, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = store(
        args.dsn.as_deref(),
        Duration::from_secs(args.store_timeout_seconds),
    )
    .await?;

    let catalog = Arc::new(DeezerCatalog::new(
        &args.catalog_url,
        Duration::from_secs(args.catalog_timeout_seconds),
    )?);

    let factor = MusicFactor::new(store, catalog, &args.factor);

    let config = ApiConfig::new(args.preview_host)
        .with_frontend_origin(args.frontend_origin)
        .with_preview_timeout(Duration::from_secs(args.catalog_timeout_seconds));

    api::new(args.port, factor, config).await
}

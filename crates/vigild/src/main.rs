use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod render;
mod service;
mod web;

use config::AdminConfig;
use service::AdminService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = vigil_core::Config::from_env()?;
    tracing::info!(
        db = %config.db_path.display(),
        bind = %config.admin_bind,
        dashboard = %config.dashboard_path.display(),
        "vigild starting"
    );

    let conn = vigil_store::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    vigil_store::migrate(&conn)?;
    drop(conn);

    if config.admin_secret.is_none() {
        tracing::warn!("VIGIL_ADMIN_SECRET not set; cleanup requests will be rejected");
    }

    let mut service = AdminService::new(Arc::new(AdminConfig::from_config(&config)));
    let addr = service.start().await?;
    tracing::info!(%addr, "vigild ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("vigild shutting down");
    service.stop().await?;

    Ok(())
}

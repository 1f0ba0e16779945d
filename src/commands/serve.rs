//! `burnshare serve`: run the HTTP API.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::daemon::http;
use crate::lifecycle::LifecycleManager;
use crate::utils::format_bytes;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;

    if let Some(addr) = &config.metrics_addr {
        crate::metrics::install_exporter(addr)?;
    }

    let manager = LifecycleManager::from_config(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = %config.store_path.display(),
        database = %config.database.path.display(),
        max_upload = %format_bytes(config.max_upload_bytes() as u64),
        "Starting burnshare"
    );

    http::serve(&config, manager).await
}

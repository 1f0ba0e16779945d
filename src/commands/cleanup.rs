//! `burnshare cleanup`: one expiry sweep, then exit.

use anyhow::Result;
use std::path::Path;
use tracing::error;

use crate::constants::MAX_EXIT_CODE;
use crate::lifecycle::{ExpirySweeper, LifecycleManager};

/// Run one sweep. Returns the process exit code: the number of failures,
/// capped at 255.
pub async fn execute(config_path: &Path) -> Result<u8> {
    let config = super::load_config(config_path)?;
    let manager = LifecycleManager::from_config(&config)?;

    let errors = ExpirySweeper::new(manager).sweep().await;
    for e in &errors {
        error!(error = %format!("{e:#}"), "Cleanup error");
    }
    Ok(exit_code(errors.len()))
}

fn exit_code(errors: usize) -> u8 {
    u8::try_from(errors.min(MAX_EXIT_CODE)).unwrap_or(u8::MAX)
}

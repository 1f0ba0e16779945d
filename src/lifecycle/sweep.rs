//! Batch removal of expired files.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::LifecycleManager;
use crate::audit::{AuditEvent, log_audit_event};
use crate::metrics;
use crate::model::FileState;

/// Removes every file whose expiry date has passed.
///
/// Runs standalone (the `cleanup` subcommand) and shares the manager's
/// delete primitive. A failure on one file never stops the pass.
#[derive(Clone)]
pub struct ExpirySweeper {
    manager: LifecycleManager,
}

impl ExpirySweeper {
    pub fn new(manager: LifecycleManager) -> Self {
        Self { manager }
    }

    /// Sweep against the current time.
    pub async fn sweep(&self) -> Vec<anyhow::Error> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`. Returns every failure.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<anyhow::Error> {
        let files = match self.manager.all_files().await {
            Ok(files) => files,
            Err(e) => return vec![e.context("Failed to list files")],
        };

        let mut errors = Vec::new();
        let mut removed = 0u64;
        for file in files.iter().filter(|f| f.is_expired_at(now)) {
            let failures = self.manager.remove_file(file).await;
            if failures.is_empty() {
                removed += 1;
                log_audit_event(AuditEvent::FileDeleted {
                    file_id: &file.file_id,
                    initiator: "expiry",
                });
            } else {
                for e in &failures {
                    error!(
                        file_id = %file.file_id,
                        uncommitted = file.state == FileState::Creating,
                        error = %format!("{e:#}"),
                        "Failed to remove expired file"
                    );
                }
                errors.extend(failures);
            }
        }

        metrics::record_sweep_deleted(removed);
        info!(
            scanned = files.len(),
            removed,
            errors = errors.len(),
            "Expiry sweep finished"
        );
        errors
    }
}
